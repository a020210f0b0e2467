//! Progress reporting for harvest passes.
//!
//! The driver and pipeline emit [`HarvestEvent`]s through a [`ProgressReporter`],
//! keeping console output separate from the harvest logic. The durable audit
//! log in the store is written independently of the reporter.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::models::PassKind;
use crate::stats::{CoverStats, PassStatus};
use crate::trigger::Trigger;
use crate::window::Window;

/// Events emitted while a pass runs.
#[derive(Debug, Clone)]
pub enum HarvestEvent<'a> {
    /// Listing refresh started for the accounts still missing a listing.
    ListingStarted { pass: PassKind, pending: usize },
    /// One account's locations were listed and stored.
    AccountListed { account: &'a str, locations: usize },
    /// Covering started.
    CoverStarted {
        pass: PassKind,
        boundary: NaiveDate,
        weeks: i64,
        locations: usize,
    },
    /// A window has locations to fetch.
    WindowStarted { window: &'a Window, eligible: usize },
    /// A batch was fetched and committed.
    BatchCommitted {
        window: &'a Window,
        account: &'a str,
        records: usize,
        marked: usize,
        dropped: usize,
    },
    /// A batch gave up without writing anything.
    BatchAbandoned {
        window: &'a Window,
        account: &'a str,
        dropped: usize,
        attempts: u32,
    },
    /// Covering stopped.
    CoverFinished {
        pass: PassKind,
        status: PassStatus,
        stats: &'a CoverStats,
    },
    /// A trigger was armed.
    TriggerArmed { trigger: Trigger, cadence: &'a str },
    /// A trigger was removed.
    TriggerDisarmed { trigger: Trigger },
    /// Oldest week of insights removed.
    RetentionTrimmed { week: NaiveDate, rows: u64 },
}

/// Trait for reporting harvest progress.
pub trait ProgressReporter: Send + Sync {
    /// Called when a harvest event occurs.
    ///
    /// The default implementation does nothing (silent mode).
    fn report(&self, event: HarvestEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Tracing-based reporter for CLI and worker logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: HarvestEvent<'_>) {
        match event {
            HarvestEvent::ListingStarted { pass, pending } => {
                info!(%pass, pending, "Refreshing location listings");
            }
            HarvestEvent::AccountListed { account, locations } => {
                info!(account, locations, "Account listed");
            }
            HarvestEvent::CoverStarted {
                pass,
                boundary,
                weeks,
                locations,
            } => {
                info!(%pass, %boundary, weeks, locations, "Covering insight windows");
            }
            HarvestEvent::WindowStarted { window, eligible } => {
                info!(%window, eligible, "Window");
            }
            HarvestEvent::BatchCommitted {
                window,
                account,
                records,
                marked,
                dropped,
            } => {
                if dropped > 0 {
                    warn!(%window, account, records, marked, dropped, "Batch committed after shrinking");
                } else {
                    tracing::debug!(%window, account, records, marked, "Batch committed");
                }
            }
            HarvestEvent::BatchAbandoned {
                window,
                account,
                dropped,
                attempts,
            } => {
                warn!(%window, account, dropped, attempts, "Batch abandoned for this pass");
            }
            HarvestEvent::CoverFinished {
                pass,
                status,
                stats,
            } => {
                info!(
                    %pass,
                    ?status,
                    batches = stats.batches,
                    records = stats.records,
                    dropped = stats.dropped,
                    "Covering finished"
                );
            }
            HarvestEvent::TriggerArmed { trigger, cadence } => {
                info!(%trigger, cadence, "Trigger armed");
            }
            HarvestEvent::TriggerDisarmed { trigger } => {
                info!(%trigger, "Trigger disarmed");
            }
            HarvestEvent::RetentionTrimmed { week, rows } => {
                info!(%week, rows, "Oldest insight week removed");
            }
        }
    }
}
