//! Trigger scheduler trait for abstracting trigger persistence.
//!
//! The harvest core registers and removes named recurring invocations but does
//! not implement a clock. The worker loop polls [`TriggerScheduler::claim_due`]
//! and dispatches whatever has come due.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::trigger::{ArmedTrigger, Cadence, Trigger};

/// Trait for trigger persistence operations.
///
/// # Implementation Notes
///
/// Implementations should ensure:
/// - At most one armed row per trigger name; arming again replaces it
/// - Claiming is atomic, so a due trigger is handed to exactly one caller
pub trait TriggerScheduler: Send + Sync + Clone {
    /// Registers `trigger` to first fire at `next_run_at`, then at `cadence`.
    fn arm(
        &self,
        trigger: Trigger,
        cadence: Cadence,
        next_run_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Removes a trigger. Returns whether it was armed.
    fn disarm(&self, trigger: Trigger) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Removes every trigger. Returns how many were armed.
    fn disarm_all(&self) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Every armed trigger, soonest first.
    fn armed(&self) -> impl Future<Output = Result<Vec<ArmedTrigger>, AppError>> + Send;

    /// Claims the most overdue trigger with `next_run_at <= now`.
    ///
    /// The claimed row is advanced to its next firing time after `now` and its
    /// `last_run_at` is set, before the handler runs. Returns the row as it was
    /// before the advance.
    fn claim_due(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<ArmedTrigger>, AppError>> + Send;
}
