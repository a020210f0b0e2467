//! Resume driver: listing refresh and window covering.
//!
//! A pass runs as a sequence of slices. Each slice does as much work as its
//! budget allows and commits progress after every batch, so the next slice
//! (another trigger firing) picks up exactly where this one stopped.
//!
//! # Covering
//!
//! ```text
//! boundary  = first config row's listing marker
//! weeks     = retention (yearly) or 1 (weekly)
//! for window in catch_up_start ..= boundary:
//!     for batch in same-account runs of locations resuming at window:
//!         check slice budget and cancellation
//!         fetch (shrinking on errors)
//!         append records and advance covered markers in one commit
//! Done iff every location carries a terminal marker
//! ```

use chrono::{Duration, NaiveDate};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch::{catch_up_start, next_batch, resume_date};
use crate::config::DriverConfig;
use crate::error::AppError;
use crate::fetch::{FetchEngine, target_marker};
use crate::marker::{Marker, all_terminal};
use crate::models::{Location, PassKind};
use crate::progress::{HarvestEvent, ProgressReporter};
use crate::stats::{BatchOutcome, CoverResult, CoverStats, PassStatus, SuspendReason};
use crate::traits::{HarvestStore, InsightsApi};
use crate::window::{RetentionWeeks, Window, windows_from};

/// Drives listing refresh and covering for one pass at a time.
///
/// # Type Parameters
///
/// * `S` - Store implementation (e.g., `HarvestRepository`)
/// * `A` - Remote API implementation (e.g., `BusinessProfileClient`)
pub struct ResumeDriver<S, A>
where
    S: HarvestStore,
    A: InsightsApi,
{
    store: S,
    api: A,
    engine: FetchEngine<A>,
    config: DriverConfig,
}

impl<S, A> Clone for ResumeDriver<S, A>
where
    S: HarvestStore,
    A: InsightsApi,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            api: self.api.clone(),
            engine: self.engine.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S, A> ResumeDriver<S, A>
where
    S: HarvestStore,
    A: InsightsApi,
{
    /// Creates a driver with default configuration.
    pub fn new(store: S, api: A) -> Self {
        Self::with_config(store, api, DriverConfig::default())
    }

    pub fn with_config(store: S, api: A, config: DriverConfig) -> Self {
        let engine = FetchEngine::new(api.clone(), config.fetch.clone());
        Self {
            store,
            api,
            engine,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Appends a line to the durable audit log.
    pub async fn audit(&self, message: &str) -> Result<(), AppError> {
        debug!(message, "Audit");
        self.store.append_log(message).await
    }

    /// The pass boundary: the first config row's terminal listing marker.
    pub async fn boundary(&self) -> Result<Option<NaiveDate>, AppError> {
        let configs = self.store.list_account_configs().await?;
        Ok(configs
            .first()
            .map(|c| c.listing_marker)
            .filter(Marker::is_terminal)
            .and_then(|m| m.date()))
    }

    // =========================================================================
    // Listing refresh
    // =========================================================================

    /// Lists locations for every config row still missing its listing.
    ///
    /// Each listed account is committed on its own: its locations and the
    /// row's listing marker (`today - data_lag`) land in one store write. Returns
    /// true once every row carries a terminal marker.
    pub async fn refresh_listings<R: ProgressReporter>(
        &self,
        pass: PassKind,
        today: NaiveDate,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<bool, AppError> {
        let configs = self.store.list_account_configs().await?;
        if configs.is_empty() {
            warn!(%pass, "No accounts configured");
            self.audit("No accounts configured; run `locus configure` first")
                .await?;
            return Ok(false);
        }

        let pending: Vec<_> = configs
            .iter()
            .filter(|c| !c.listing_marker.is_terminal())
            .collect();
        reporter.report(HarvestEvent::ListingStarted {
            pass,
            pending: pending.len(),
        });

        let listed_on = Marker::Caught(today - Duration::days(self.config.data_lag_days));
        for config in pending {
            if cancel.is_cancelled() {
                info!(%pass, "Listing refresh cancelled");
                return Ok(false);
            }

            let locations = self
                .api
                .list_locations(&config.account_group, &config.filter())
                .await?;
            self.store
                .commit_listing(config.position, &locations, &listed_on)
                .await?;

            reporter.report(HarvestEvent::AccountListed {
                account: &config.account_name,
                locations: locations.len(),
            });
            self.audit(&format!(
                "{} pass: listed {} locations for {}",
                pass,
                locations.len(),
                config.account_name
            ))
            .await?;
        }

        Ok(true)
    }

    // =========================================================================
    // Covering
    // =========================================================================

    /// Runs one covering slice for `pass`.
    ///
    /// Retention is validated before anything is written; a bad value fails
    /// the slice with [`AppError::ConfigError`].
    pub async fn cover<R: ProgressReporter>(
        &self,
        pass: PassKind,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<CoverResult, AppError> {
        let started = Instant::now();

        let Some(boundary) = self.boundary().await? else {
            warn!(%pass, "No listing boundary yet, nothing to cover");
            return Ok(CoverResult::suspended(
                SuspendReason::NothingToDo,
                CoverStats::new(),
            ));
        };
        let retention = RetentionWeeks::from_stored(self.store.retention_weeks().await?)?;

        let mut locations = self.store.list_locations().await?;
        if locations.is_empty() {
            return Ok(CoverResult::suspended(
                SuspendReason::NothingToDo,
                CoverStats::new(),
            ));
        }

        let weeks = match pass {
            PassKind::Yearly => retention,
            PassKind::Weekly => {
                let behind = locations
                    .iter()
                    .filter(|l| matches!(l.marker, Marker::Pending(_)))
                    .count();
                if behind > 0 {
                    warn!(behind, %retention, "Weekly pass found partial progress, catching up");
                    self.audit(&format!(
                        "weekly pass: {} locations with partial progress, catching up over {} weeks",
                        behind, retention
                    ))
                    .await?;
                    retention
                } else {
                    RetentionWeeks::ONE
                }
            }
        };
        let global_start = Window::first(boundary, weeks).first_day;

        self.settle_out_of_range(&mut locations, global_start, boundary)
            .await?;

        let mut stats = CoverStats::new();
        let Some(start) = catch_up_start(&locations, global_start) else {
            return self.finish(pass, PassStatus::Done, stats, reporter).await;
        };

        reporter.report(HarvestEvent::CoverStarted {
            pass,
            boundary,
            weeks: weeks.get(),
            locations: locations.len(),
        });

        let batch_size = self.config.fetch.batch_size;
        for window in windows_from(start, boundary) {
            let eligible =
                |l: &Location| resume_date(&l.marker, global_start) == Some(window.first_day);
            let count = locations.iter().filter(|l| eligible(*l)).count();
            if count == 0 {
                continue;
            }
            stats.windows += 1;
            reporter.report(HarvestEvent::WindowStarted {
                window: &window,
                eligible: count,
            });

            let mut cursor = 0;
            while let Some(batch) = next_batch(&locations, cursor, batch_size, eligible) {
                if let Some(reason) = self.should_suspend(started, cancel) {
                    return self.finish(pass, PassStatus::Suspended(reason), stats, reporter).await;
                }
                cursor = batch.next_index;
                let account = batch.account.clone();

                let outcome = self.engine.fetch(&window, batch).await?;
                if outcome.abandoned {
                    reporter.report(HarvestEvent::BatchAbandoned {
                        window: &window,
                        account: &account,
                        dropped: outcome.dropped.len(),
                        attempts: outcome.attempts,
                    });
                    stats.record(BatchOutcome::Abandoned {
                        dropped: outcome.dropped.len(),
                    });
                    continue;
                }

                let marker = target_marker(&window, boundary, self.config.data_lag_days);
                let ids: Vec<i64> = outcome.covered.iter().map(|l| l.id).collect();
                self.store
                    .commit_batch(&outcome.records, &ids, &marker)
                    .await?;
                for location in locations.iter_mut().filter(|l| ids.contains(&l.id)) {
                    location.marker = marker;
                }

                reporter.report(HarvestEvent::BatchCommitted {
                    window: &window,
                    account: &account,
                    records: outcome.records.len(),
                    marked: ids.len(),
                    dropped: outcome.dropped.len(),
                });
                stats.record(BatchOutcome::Committed {
                    records: outcome.records.len(),
                    marked: ids.len(),
                    dropped: outcome.dropped.len(),
                });
            }
        }

        let status = if all_terminal(&locations) {
            PassStatus::Done
        } else {
            PassStatus::Suspended(SuspendReason::WindowsExhausted)
        };
        self.finish(pass, status, stats, reporter).await
    }

    /// Marks caught-up every location whose next window would end past the
    /// boundary.
    async fn settle_out_of_range(
        &self,
        locations: &mut [Location],
        global_start: NaiveDate,
        boundary: NaiveDate,
    ) -> Result<(), AppError> {
        let ids: Vec<i64> = locations
            .iter()
            .filter(|l| {
                resume_date(&l.marker, global_start)
                    .is_some_and(|d| !Window::starting(d).within(boundary))
            })
            .map(|l| l.id)
            .collect();
        if ids.is_empty() {
            return Ok(());
        }

        let caught = Marker::Caught(boundary);
        self.store.set_location_markers(&ids, &caught).await?;
        for location in locations.iter_mut().filter(|l| ids.contains(&l.id)) {
            location.marker = caught;
        }
        debug!(count = ids.len(), %boundary, "Settled locations already at the boundary");
        Ok(())
    }

    fn should_suspend(&self, started: Instant, cancel: &CancellationToken) -> Option<SuspendReason> {
        if cancel.is_cancelled() {
            Some(SuspendReason::Cancelled)
        } else if started.elapsed() >= self.config.slice_budget {
            Some(SuspendReason::SliceBudget)
        } else {
            None
        }
    }

    async fn finish<R: ProgressReporter>(
        &self,
        pass: PassKind,
        status: PassStatus,
        stats: CoverStats,
        reporter: &R,
    ) -> Result<CoverResult, AppError> {
        reporter.report(HarvestEvent::CoverFinished {
            pass,
            status,
            stats: &stats,
        });

        let summary = match status {
            PassStatus::Done => "done".to_string(),
            PassStatus::Suspended(reason) => format!("suspended ({})", reason),
        };
        self.audit(&format!(
            "{} pass {}: {} batches, {} records, {} dropped, {} abandoned",
            pass, summary, stats.batches, stats.records, stats.dropped, stats.abandoned
        ))
        .await?;

        Ok(CoverResult { status, stats })
    }

    // =========================================================================
    // Retention
    // =========================================================================

    /// Deletes the oldest stored week of insights.
    ///
    /// Returns the removed week and row count, or `None` when the table is
    /// empty.
    pub async fn trim_oldest_week<R: ProgressReporter>(
        &self,
        reporter: &R,
    ) -> Result<Option<(NaiveDate, u64)>, AppError> {
        let Some(week) = self.store.oldest_insight_week().await? else {
            return Ok(None);
        };
        let rows = self.store.delete_insights_for_week(week).await?;
        reporter.report(HarvestEvent::RetentionTrimmed { week, rows });
        self.audit(&format!("retention: removed {} rows for week {}", rows, week))
            .await?;
        Ok(Some((week, rows)))
    }
}
