//! Five-trigger harvest pipeline.
//!
//! Operator commands and trigger handlers share one state machine:
//!
//! ```text
//! start ─► yearly-locations-retry ─► yearly-insights-retry ─► steady-state-weekly
//!                                                                   │ (weekly)
//!                      weekly-insights-retry ◄─ weekly-locations-retry ◄┘
//! ```
//!
//! A retry trigger is armed hourly before its handler first runs, so a slice
//! that stops short is simply re-run an hour later. Each handler disarms its
//! own trigger once its step completes and immediately runs the next step.

use chrono::{DateTime, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{DriverConfig, LocusConfig};
use crate::driver::ResumeDriver;
use crate::error::AppError;
use crate::models::{NewAccountConfig, PassKind};
use crate::progress::{HarvestEvent, ProgressReporter};
use crate::scheduler::TriggerScheduler;
use crate::stats::CoverResult;
use crate::traits::{HarvestStore, InsightsApi};
use crate::trigger::{Cadence, Trigger};

fn locations_trigger(pass: PassKind) -> Trigger {
    match pass {
        PassKind::Yearly => Trigger::YearlyLocationsRetry,
        PassKind::Weekly => Trigger::WeeklyLocationsRetry,
    }
}

fn insights_trigger(pass: PassKind) -> Trigger {
    match pass {
        PassKind::Yearly => Trigger::YearlyInsightsRetry,
        PassKind::Weekly => Trigger::WeeklyInsightsRetry,
    }
}

/// Harvest pipeline over a store, the remote API and a trigger scheduler.
///
/// Handlers return `Ok(None)` when a listing step is still incomplete, and
/// `Ok(Some(result))` once a covering slice ran.
pub struct Pipeline<S, A, T>
where
    S: HarvestStore,
    A: InsightsApi,
    T: TriggerScheduler,
{
    driver: ResumeDriver<S, A>,
    scheduler: T,
}

impl<S, A, T> Clone for Pipeline<S, A, T>
where
    S: HarvestStore,
    A: InsightsApi,
    T: TriggerScheduler,
{
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<S, A, T> Pipeline<S, A, T>
where
    S: HarvestStore,
    A: InsightsApi,
    T: TriggerScheduler,
{
    pub fn new(store: S, api: A, scheduler: T) -> Self {
        Self::with_config(store, api, scheduler, DriverConfig::default())
    }

    pub fn with_config(store: S, api: A, scheduler: T, config: DriverConfig) -> Self {
        Self {
            driver: ResumeDriver::with_config(store, api, config),
            scheduler,
        }
    }

    pub fn driver(&self) -> &ResumeDriver<S, A> {
        &self.driver
    }

    pub fn store(&self) -> &S {
        self.driver.store()
    }

    pub fn scheduler(&self) -> &T {
        &self.scheduler
    }

    // =========================================================================
    // Operator commands
    // =========================================================================

    /// Replaces the stored accounts listing with what the token can see now.
    pub async fn refresh_accounts(&self) -> Result<usize, AppError> {
        let accounts = self.driver.api().list_accounts().await?;
        self.store().replace_accounts(&accounts).await?;
        self.driver
            .audit(&format!("accounts refreshed: {} visible", accounts.len()))
            .await?;
        self.store()
            .trim_log(self.driver.config().log_max_rows)
            .await?;
        info!(count = accounts.len(), "Accounts refreshed");
        Ok(accounts.len())
    }

    /// Applies operator configuration to the store.
    ///
    /// Account entries are resolved by display name, case-insensitively,
    /// against the stored accounts listing. Nothing is written unless every
    /// entry resolves.
    pub async fn configure(&self, config: &LocusConfig) -> Result<u64, AppError> {
        config.validate()?;

        let accounts = self.store().list_accounts().await?;
        let mut rows = Vec::with_capacity(config.accounts.len());
        for entry in &config.accounts {
            let name = entry.name.trim();
            let account = accounts
                .iter()
                .find(|a| a.account_name.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    AppError::ConfigError(format!(
                        "account '{}' is not in the accounts listing; run `locus accounts` first",
                        name
                    ))
                })?;
            rows.push(NewAccountConfig {
                account_name: account.account_name.clone(),
                account_group: account.name.clone(),
                status_filter: entry.status_filter.clone(),
                region_filter: entry.region_filter.clone(),
            });
        }

        let written = self.store().replace_account_configs(&rows).await?;
        self.store()
            .set_retention_weeks(config.retention_weeks)
            .await?;
        self.driver
            .audit(&format!(
                "configured {} accounts, retention {} weeks",
                written, config.retention_weeks
            ))
            .await?;
        Ok(written)
    }

    /// Starts the yearly download from scratch.
    ///
    /// Every trigger is disarmed and all harvested state except the location
    /// listing is cleared before the yearly listing begins.
    pub async fn start<R: ProgressReporter>(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<Option<CoverResult>, AppError> {
        self.scheduler.disarm_all().await?;
        self.store().clear_insights().await?;
        self.store().clear_listing_markers().await?;
        self.store().clear_location_markers().await?;
        self.driver.audit("yearly download started").await?;

        self.begin_listing(PassKind::Yearly, now, cancel, reporter)
            .await
    }

    /// Clears insights and locations, then starts over.
    pub async fn reset_and_restart<R: ProgressReporter>(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<Option<CoverResult>, AppError> {
        self.store().clear_insights().await?;
        self.store().clear_locations().await?;
        self.driver.audit("reset: insights and locations cleared").await?;
        self.start(now, cancel, reporter).await
    }

    /// Writes a failed handler run to the audit log.
    pub async fn record_failure(&self, trigger: Trigger, error: &AppError) -> Result<(), AppError> {
        self.driver
            .audit(&format!("{} failed: {}", trigger, error))
            .await
    }

    // =========================================================================
    // Trigger handlers
    // =========================================================================

    /// Runs the handler of `trigger` once.
    pub async fn run_trigger<R: ProgressReporter>(
        &self,
        trigger: Trigger,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<Option<CoverResult>, AppError> {
        match trigger {
            Trigger::YearlyLocationsRetry | Trigger::WeeklyLocationsRetry => {
                self.locations_step(trigger.pass(), now, cancel, reporter)
                    .await
            }
            Trigger::YearlyInsightsRetry | Trigger::WeeklyInsightsRetry => {
                self.insights_step(trigger.pass(), now, cancel, reporter)
                    .await
            }
            Trigger::SteadyStateWeekly => {
                self.store()
                    .trim_log(self.driver.config().log_max_rows)
                    .await?;
                self.begin_listing(PassKind::Weekly, now, cancel, reporter)
                    .await
            }
        }
    }

    async fn begin_listing<R: ProgressReporter>(
        &self,
        pass: PassKind,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<Option<CoverResult>, AppError> {
        self.store().clear_locations().await?;
        self.store().clear_listing_markers().await?;
        self.arm(locations_trigger(pass), Cadence::Hourly, now, reporter)
            .await?;

        self.locations_step(pass, now, cancel, reporter).await
    }

    async fn locations_step<R: ProgressReporter>(
        &self,
        pass: PassKind,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<Option<CoverResult>, AppError> {
        let listed = self
            .driver
            .refresh_listings(pass, now.date_naive(), cancel, reporter)
            .await?;
        if !listed {
            return Ok(None);
        }

        self.disarm(locations_trigger(pass), reporter).await?;
        self.arm(insights_trigger(pass), Cadence::Hourly, now, reporter)
            .await?;

        self.insights_step(pass, now, cancel, reporter).await
    }

    async fn insights_step<R: ProgressReporter>(
        &self,
        pass: PassKind,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<Option<CoverResult>, AppError> {
        let result = self.driver.cover(pass, cancel, reporter).await?;
        if !result.is_done() {
            return Ok(Some(result));
        }

        match pass {
            PassKind::Yearly => {
                let Some(boundary) = self.driver.boundary().await? else {
                    warn!("Yearly pass finished without a boundary");
                    return Ok(Some(result));
                };
                self.scheduler.disarm_all().await?;
                let cadence = Cadence::steady_state(boundary, now);
                self.arm(Trigger::SteadyStateWeekly, cadence, now, reporter)
                    .await?;
                self.driver
                    .audit(&format!(
                        "yearly download complete through {}, weekly updates {}",
                        boundary,
                        cadence.describe()
                    ))
                    .await?;
            }
            PassKind::Weekly => {
                self.driver.trim_oldest_week(reporter).await?;
                self.disarm(Trigger::WeeklyInsightsRetry, reporter).await?;
            }
        }

        Ok(Some(result))
    }

    async fn arm<R: ProgressReporter>(
        &self,
        trigger: Trigger,
        cadence: Cadence,
        now: DateTime<Utc>,
        reporter: &R,
    ) -> Result<(), AppError> {
        self.scheduler
            .arm(trigger, cadence, cadence.next_after(now))
            .await?;
        reporter.report(HarvestEvent::TriggerArmed {
            trigger,
            cadence: &cadence.describe(),
        });
        Ok(())
    }

    async fn disarm<R: ProgressReporter>(&self, trigger: Trigger, reporter: &R) -> Result<(), AppError> {
        if self.scheduler.disarm(trigger).await? {
            reporter.report(HarvestEvent::TriggerDisarmed { trigger });
        }
        Ok(())
    }

    /// The current pass boundary, if a listing has completed.
    pub async fn boundary(&self) -> Result<Option<NaiveDate>, AppError> {
        self.driver.boundary().await
    }
}
