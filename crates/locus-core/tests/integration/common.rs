//! Test utilities and mock implementations for integration tests.
//!
//! Provides in-memory implementations of [`HarvestStore`], [`InsightsApi`]
//! and [`TriggerScheduler`] for exercising the driver and pipeline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use locus_core::models::{
    ApiErrorBody, LocationMetrics, MetricValue, TotalValue,
};
use locus_core::schema::Metric;
use locus_core::{
    Account, AccountConfig, AppError, ArmedTrigger, Cadence, DriverConfig, FetchConfig,
    HarvestStore, InsightRecord, InsightsApi, InsightsPage, Location, LocationFilter, LogEntry,
    Marker, NewAccountConfig, NewLocation, StoreStats, Trigger, TriggerScheduler, Window,
};

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Driver configuration with no backoff sleeps.
pub fn fast_config() -> DriverConfig {
    DriverConfig::default().with_fetch(FetchConfig::default().with_base_delay(Duration::ZERO))
}

pub fn new_location(account: &str, id: i64) -> NewLocation {
    NewLocation {
        account: account.to_string(),
        name: format!("locations/{}", id),
        title: format!("Bakery {}", id),
        store_code: format!("B{:03}", id),
        status: "OPEN".to_string(),
        region: "IT".to_string(),
        category: "Bakery".to_string(),
    }
}

pub fn account(id: u32, display: &str) -> Account {
    Account {
        name: format!("accounts/{}", id),
        account_name: display.to_string(),
        account_type: Some("LOCATION_GROUP".to_string()),
        role: Some("OWNER".to_string()),
        permission_level: None,
    }
}

// =============================================================================
// MockStore
// =============================================================================

#[derive(Default)]
struct StoreState {
    accounts: Vec<Account>,
    configs: Vec<AccountConfig>,
    retention_weeks: Option<i64>,
    locations: Vec<Location>,
    next_location_id: i64,
    insights: Vec<InsightRecord>,
    logs: Vec<LogEntry>,
    next_log_id: i64,
    commits_before_failure: Option<usize>,
}

impl StoreState {
    /// Counts down to the scheduled commit failure; it fires once.
    fn commit_fails(&mut self) -> bool {
        match self.commits_before_failure {
            Some(0) => {
                self.commits_before_failure = None;
                true
            }
            Some(n) => {
                self.commits_before_failure = Some(n - 1);
                false
            }
            None => false,
        }
    }
}

/// In-memory harvest store.
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<StoreState>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with one configured account whose listing finished on
    /// `boundary`, `retention` weeks of history, and `count` locations.
    pub fn seeded(boundary: NaiveDate, retention: i64, count: i64) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock().unwrap();
            state.configs.push(AccountConfig {
                position: 1,
                account_name: "Bakeries".to_string(),
                account_group: "accounts/1".to_string(),
                status_filter: None,
                region_filter: None,
                listing_marker: Marker::Caught(boundary),
            });
            state.retention_weeks = Some(retention);
        }
        store.push_locations((1..=count).map(|i| new_location("accounts/1", i)));
        store
    }

    pub fn push_locations(&self, locations: impl IntoIterator<Item = NewLocation>) {
        let mut state = self.state.lock().unwrap();
        for l in locations {
            state.next_location_id += 1;
            let id = state.next_location_id;
            state.locations.push(Location {
                id,
                account: l.account,
                name: l.name,
                title: l.title,
                store_code: l.store_code,
                status: l.status,
                region: l.region,
                category: l.category,
                marker: Marker::Empty,
            });
        }
    }

    pub fn set_marker(&self, id: i64, marker: Marker) {
        let mut state = self.state.lock().unwrap();
        if let Some(l) = state.locations.iter_mut().find(|l| l.id == id) {
            l.marker = marker;
        }
    }

    /// Lets `successes` batch or listing commits through, then fails the
    /// next one without writing anything, as a process killed before its
    /// transaction commits would.
    pub fn fail_commit_after(&self, successes: usize) {
        self.state.lock().unwrap().commits_before_failure = Some(successes);
    }

    pub fn set_retention(&self, weeks: Option<i64>) {
        self.state.lock().unwrap().retention_weeks = weeks;
    }

    pub fn markers(&self) -> Vec<Marker> {
        let state = self.state.lock().unwrap();
        state.locations.iter().map(|l| l.marker).collect()
    }

    pub fn stored_markers(&self) -> Vec<Option<String>> {
        self.markers().iter().map(Marker::to_stored).collect()
    }

    pub fn insights(&self) -> Vec<InsightRecord> {
        self.state.lock().unwrap().insights.clone()
    }

    pub fn configs(&self) -> Vec<AccountConfig> {
        self.state.lock().unwrap().configs.clone()
    }

    pub fn location_count(&self) -> usize {
        self.state.lock().unwrap().locations.len()
    }

    pub fn log_messages(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.logs.iter().map(|e| e.message.clone()).collect()
    }

    #[allow(dead_code)]
    pub fn retention(&self) -> Option<i64> {
        self.state.lock().unwrap().retention_weeks
    }
}

impl HarvestStore for MockStore {
    async fn replace_accounts(&self, accounts: &[Account]) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        state.accounts = accounts.to_vec();
        Ok(accounts.len() as u64)
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        Ok(self.state.lock().unwrap().accounts.clone())
    }

    async fn list_account_configs(&self) -> Result<Vec<AccountConfig>, AppError> {
        Ok(self.state.lock().unwrap().configs.clone())
    }

    async fn replace_account_configs(&self, configs: &[NewAccountConfig]) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        state.configs = configs
            .iter()
            .enumerate()
            .map(|(i, c)| AccountConfig {
                position: i as i64 + 1,
                account_name: c.account_name.clone(),
                account_group: c.account_group.clone(),
                status_filter: c.status_filter.clone(),
                region_filter: c.region_filter.clone(),
                listing_marker: Marker::Empty,
            })
            .collect();
        Ok(configs.len() as u64)
    }

    async fn clear_listing_markers(&self) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        for c in state.configs.iter_mut() {
            c.listing_marker = Marker::Empty;
        }
        Ok(state.configs.len() as u64)
    }

    async fn retention_weeks(&self) -> Result<Option<i64>, AppError> {
        Ok(self.state.lock().unwrap().retention_weeks)
    }

    async fn set_retention_weeks(&self, weeks: i64) -> Result<(), AppError> {
        self.state.lock().unwrap().retention_weeks = Some(weeks);
        Ok(())
    }

    async fn list_locations(&self) -> Result<Vec<Location>, AppError> {
        Ok(self.state.lock().unwrap().locations.clone())
    }

    async fn commit_listing(
        &self,
        position: i64,
        locations: &[NewLocation],
        marker: &Marker,
    ) -> Result<u64, AppError> {
        {
            let mut state = self.state.lock().unwrap();
            if state.commit_fails() {
                return Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut));
            }
            if let Some(c) = state.configs.iter_mut().find(|c| c.position == position) {
                c.listing_marker = *marker;
            }
        }
        self.push_locations(locations.iter().cloned());
        Ok(locations.len() as u64)
    }

    async fn clear_locations(&self) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        let count = state.locations.len() as u64;
        state.locations.clear();
        Ok(count)
    }

    async fn set_location_markers(&self, ids: &[i64], marker: &Marker) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        let mut count = 0;
        for l in state.locations.iter_mut().filter(|l| ids.contains(&l.id)) {
            l.marker = *marker;
            count += 1;
        }
        Ok(count)
    }

    async fn clear_location_markers(&self) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        for l in state.locations.iter_mut() {
            l.marker = Marker::Empty;
        }
        Ok(state.locations.len() as u64)
    }

    async fn commit_batch(
        &self,
        records: &[InsightRecord],
        ids: &[i64],
        marker: &Marker,
    ) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.commit_fails() {
            return Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut));
        }
        state.insights.extend_from_slice(records);
        for l in state.locations.iter_mut().filter(|l| ids.contains(&l.id)) {
            l.marker = *marker;
        }
        Ok(records.len() as u64)
    }

    async fn clear_insights(&self) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        let count = state.insights.len() as u64;
        state.insights.clear();
        Ok(count)
    }

    async fn oldest_insight_week(&self) -> Result<Option<NaiveDate>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state.insights.iter().map(|r| r.start_week).min())
    }

    async fn delete_insights_for_week(&self, start_week: NaiveDate) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        let before = state.insights.len();
        state.insights.retain(|r| r.start_week != start_week);
        Ok((before - state.insights.len()) as u64)
    }

    async fn append_log(&self, message: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.next_log_id += 1;
        let id = state.next_log_id;
        state.logs.push(LogEntry {
            id,
            logged_at: Utc::now(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn trim_log(&self, max_rows: usize) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        let excess = state.logs.len().saturating_sub(max_rows);
        state.logs.drain(..excess);
        Ok(excess as u64)
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<LogEntry>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state.logs.iter().rev().take(limit).cloned().collect())
    }

    async fn stats(&self) -> Result<StoreStats, AppError> {
        let state = self.state.lock().unwrap();
        Ok(StoreStats {
            accounts: state.accounts.len() as i64,
            account_configs: state.configs.len() as i64,
            locations: state.locations.len() as i64,
            caught_locations: state
                .locations
                .iter()
                .filter(|l| l.marker.is_terminal())
                .count() as i64,
            insights: state.insights.len() as i64,
            log_entries: state.logs.len() as i64,
        })
    }
}

// =============================================================================
// MockApi
// =============================================================================

/// How the mock answers `reportInsights`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Every call succeeds with one metrics entry per requested location.
    Succeed,
    /// Every call returns an error page.
    AlwaysError,
    /// Calls including this location name return an error page.
    ErrorWhenContains(String),
    /// Every call fails at the transport level.
    Transport,
}

/// One recorded `reportInsights` call.
#[derive(Debug, Clone)]
pub struct InsightsCall {
    pub account: String,
    pub names: Vec<String>,
    #[allow(dead_code)]
    pub window: Window,
}

/// Scripted remote API.
#[derive(Clone)]
pub struct MockApi {
    accounts: Vec<Account>,
    locations: HashMap<String, Vec<NewLocation>>,
    behavior: Arc<Mutex<Behavior>>,
    listing_fails: Arc<Mutex<bool>>,
    pub calls: Arc<Mutex<Vec<InsightsCall>>>,
    pub listing_filters: Arc<Mutex<Vec<(String, LocationFilter)>>>,
}

impl MockApi {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            accounts: Vec::new(),
            locations: HashMap::new(),
            behavior: Arc::new(Mutex::new(behavior)),
            listing_fails: Arc::new(Mutex::new(false)),
            calls: Arc::new(Mutex::new(Vec::new())),
            listing_filters: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_account(mut self, account: Account, locations: i64) -> Self {
        let listed = (1..=locations)
            .map(|i| new_location(&account.name, i))
            .collect();
        self.locations.insert(account.name.clone(), listed);
        self.accounts.push(account);
        self
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn set_listing_fails(&self, fails: bool) {
        *self.listing_fails.lock().unwrap() = fails;
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_sizes(&self) -> Vec<usize> {
        self.calls.lock().unwrap().iter().map(|c| c.names.len()).collect()
    }

    fn success_page(account: &str, names: &[String]) -> InsightsPage {
        let location_metrics = names
            .iter()
            .map(|name| LocationMetrics {
                location_name: format!("{}/{}", account, name),
                time_zone: Some("Europe/Rome".to_string()),
                metric_values: Metric::ALL
                    .iter()
                    .map(|m| MetricValue {
                        metric: Some(m.api_name().to_string()),
                        total_value: Some(TotalValue {
                            value: Some((m.index() + 1).to_string()),
                        }),
                    })
                    .collect(),
            })
            .collect();
        InsightsPage {
            location_metrics,
            next_page_token: None,
            error: None,
        }
    }

    fn error_page() -> InsightsPage {
        InsightsPage {
            location_metrics: Vec::new(),
            next_page_token: None,
            error: Some(ApiErrorBody {
                code: Some(400),
                message: "Request contains an invalid argument.".to_string(),
                status: Some("INVALID_ARGUMENT".to_string()),
            }),
        }
    }
}

impl InsightsApi for MockApi {
    async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        Ok(self.accounts.clone())
    }

    async fn list_locations(
        &self,
        account_group: &str,
        filter: &LocationFilter,
    ) -> Result<Vec<NewLocation>, AppError> {
        if *self.listing_fails.lock().unwrap() {
            return Err(AppError::NetworkError("connection reset".to_string()));
        }
        self.listing_filters
            .lock()
            .unwrap()
            .push((account_group.to_string(), filter.clone()));
        Ok(self.locations.get(account_group).cloned().unwrap_or_default())
    }

    async fn report_insights(
        &self,
        account_group: &str,
        location_names: &[String],
        window: &Window,
    ) -> Result<Vec<InsightsPage>, AppError> {
        let behavior = self.behavior.lock().unwrap().clone();
        if behavior == Behavior::Transport {
            return Err(AppError::NetworkError("connection reset".to_string()));
        }
        self.calls.lock().unwrap().push(InsightsCall {
            account: account_group.to_string(),
            names: location_names.to_vec(),
            window: *window,
        });
        let page = match behavior {
            Behavior::AlwaysError => Self::error_page(),
            Behavior::ErrorWhenContains(name) if location_names.contains(&name) => {
                Self::error_page()
            }
            _ => Self::success_page(account_group, location_names),
        };
        Ok(vec![page])
    }
}

// =============================================================================
// MockScheduler
// =============================================================================

/// In-memory trigger table.
#[derive(Clone, Default)]
pub struct MockScheduler {
    armed: Arc<Mutex<HashMap<Trigger, ArmedTrigger>>>,
}

impl MockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Armed trigger names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .armed
            .lock()
            .unwrap()
            .keys()
            .map(|t| t.as_str())
            .collect();
        names.sort();
        names
    }

    pub fn get(&self, trigger: Trigger) -> Option<ArmedTrigger> {
        self.armed.lock().unwrap().get(&trigger).cloned()
    }
}

impl TriggerScheduler for MockScheduler {
    async fn arm(
        &self,
        trigger: Trigger,
        cadence: Cadence,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.armed.lock().unwrap().insert(
            trigger,
            ArmedTrigger {
                trigger,
                cadence,
                next_run_at,
                armed_at: Utc::now(),
                last_run_at: None,
            },
        );
        Ok(())
    }

    async fn disarm(&self, trigger: Trigger) -> Result<bool, AppError> {
        Ok(self.armed.lock().unwrap().remove(&trigger).is_some())
    }

    async fn disarm_all(&self) -> Result<u64, AppError> {
        let mut armed = self.armed.lock().unwrap();
        let count = armed.len() as u64;
        armed.clear();
        Ok(count)
    }

    async fn armed(&self) -> Result<Vec<ArmedTrigger>, AppError> {
        let mut all: Vec<_> = self.armed.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|a| a.next_run_at);
        Ok(all)
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Option<ArmedTrigger>, AppError> {
        let mut armed = self.armed.lock().unwrap();
        let Some(due) = armed
            .values()
            .filter(|a| a.is_due(now))
            .min_by_key(|a| a.next_run_at)
            .cloned()
        else {
            return Ok(None);
        };
        if let Some(row) = armed.get_mut(&due.trigger) {
            row.next_run_at = row.cadence.next_after(now);
            row.last_run_at = Some(now);
        }
        Ok(Some(due))
    }
}
