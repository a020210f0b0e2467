//! Worker service that fires armed triggers as they come due.
//!
//! # Architecture
//!
//! The worker follows a poll-based model:
//! ```text
//! loop {
//!     1. Check for cancellation
//!     2. Claim the most overdue trigger (advances its next run)
//!     3. Run its handler through the Pipeline
//!     4. On failure, log and audit; the trigger stays armed
//!     5. If nothing is due, sleep for poll_interval
//! }
//! ```
//!
//! Claiming advances `next_run_at` before the handler runs, so a slice that
//! outlives the poll interval is never picked up twice.
//!
//! # Example
//!
//! ```ignore
//! use locus_core::worker::{WorkerService, TracingWorkerReporter};
//! use locus_core::progress::TracingReporter;
//! use tokio_util::sync::CancellationToken;
//!
//! let worker = WorkerService::new(pipeline, WorkerConfig::default());
//! worker.run(CancellationToken::new(), &TracingWorkerReporter, &TracingReporter).await?;
//! ```

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::pipeline::Pipeline;
use crate::progress::ProgressReporter;
use crate::scheduler::TriggerScheduler;
use crate::stats::CoverResult;
use crate::traits::{HarvestStore, InsightsApi};
use crate::trigger::{ArmedTrigger, Trigger, WorkerConfig};

// =============================================================================
// Worker Events
// =============================================================================

/// Events emitted by the worker during operation.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    /// Worker started and is ready to fire triggers.
    Started { worker_id: &'a str },
    /// Worker is polling for due triggers.
    Polling,
    /// Worker claimed a due trigger.
    TriggerClaimed { armed: &'a ArmedTrigger },
    /// Handler returned normally.
    TriggerCompleted {
        trigger: Trigger,
        result: Option<&'a CoverResult>,
    },
    /// Handler failed; the trigger stays armed.
    TriggerFailed {
        trigger: Trigger,
        error: &'a str,
        transient: bool,
    },
    /// Worker stopped.
    Stopped { worker_id: &'a str },
}

// =============================================================================
// Worker Reporter Trait
// =============================================================================

/// Trait for reporting worker events.
///
/// Similar to [`ProgressReporter`] but for worker-level events.
pub trait WorkerReporter: Send + Sync {
    /// Called when a worker event occurs.
    ///
    /// The default implementation does nothing (silent mode).
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Silent worker reporter that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentWorkerReporter;

impl WorkerReporter for SilentWorkerReporter {}

/// Tracing-based worker reporter for CLI logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                info!(worker_id, "Worker started");
            }
            WorkerEvent::Polling => {
                tracing::debug!("Polling for due triggers...");
            }
            WorkerEvent::TriggerClaimed { armed } => {
                info!(
                    trigger = %armed.trigger,
                    due = %armed.next_run_at,
                    "Trigger claimed"
                );
            }
            WorkerEvent::TriggerCompleted { trigger, result } => match result {
                Some(result) => info!(
                    %trigger,
                    status = ?result.status,
                    records = result.stats.records,
                    "Trigger completed"
                ),
                None => info!(%trigger, "Trigger completed, listing still in progress"),
            },
            WorkerEvent::TriggerFailed {
                trigger,
                error,
                transient,
            } => {
                if transient {
                    warn!(%trigger, %error, "Trigger failed, will retry on its next run");
                } else {
                    error!(%trigger, %error, "Trigger failed");
                }
            }
            WorkerEvent::Stopped { worker_id } => {
                info!(worker_id, "Worker stopped");
            }
        }
    }
}

// =============================================================================
// Worker Service
// =============================================================================

/// Worker service that runs due triggers through a [`Pipeline`].
pub struct WorkerService<S, A, T>
where
    S: HarvestStore,
    A: InsightsApi,
    T: TriggerScheduler,
{
    pipeline: Pipeline<S, A, T>,
    config: WorkerConfig,
}

impl<S, A, T> WorkerService<S, A, T>
where
    S: HarvestStore,
    A: InsightsApi,
    T: TriggerScheduler,
{
    pub fn new(pipeline: Pipeline<S, A, T>, config: WorkerConfig) -> Self {
        Self { pipeline, config }
    }

    /// Run the worker until cancelled.
    pub async fn run<WR, HR>(
        &self,
        cancel_token: CancellationToken,
        worker_reporter: &WR,
        harvest_reporter: &HR,
    ) -> Result<(), AppError>
    where
        WR: WorkerReporter,
        HR: ProgressReporter,
    {
        worker_reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            worker_reporter.report(WorkerEvent::Polling);

            match self
                .run_next_due(&cancel_token, worker_reporter, harvest_reporter)
                .await
            {
                Ok(Some(_)) => continue,
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = cancel_token.cancelled() => break,
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to claim trigger");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval * 2) => {}
                        _ = cancel_token.cancelled() => break,
                    }
                }
            }
        }

        worker_reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });

        Ok(())
    }

    /// Claims and runs at most one due trigger.
    ///
    /// Returns the trigger that ran. Handler failures are reported and
    /// audited, not returned; `Err` means the scheduler itself failed.
    pub async fn run_next_due<WR, HR>(
        &self,
        cancel_token: &CancellationToken,
        worker_reporter: &WR,
        harvest_reporter: &HR,
    ) -> Result<Option<Trigger>, AppError>
    where
        WR: WorkerReporter,
        HR: ProgressReporter,
    {
        let Some(armed) = self.pipeline.scheduler().claim_due(Utc::now()).await? else {
            return Ok(None);
        };
        worker_reporter.report(WorkerEvent::TriggerClaimed { armed: &armed });

        let trigger = armed.trigger;
        let slice_cancel = cancel_token.child_token();
        match self
            .pipeline
            .run_trigger(trigger, Utc::now(), &slice_cancel, harvest_reporter)
            .await
        {
            Ok(result) => {
                worker_reporter.report(WorkerEvent::TriggerCompleted {
                    trigger,
                    result: result.as_ref(),
                });
            }
            Err(e) => {
                let message = e.to_string();
                worker_reporter.report(WorkerEvent::TriggerFailed {
                    trigger,
                    error: &message,
                    transient: e.is_retryable(),
                });
                if let Err(log_err) = self.pipeline.record_failure(trigger, &e).await {
                    error!(%trigger, error = %log_err, "Failed to write audit entry");
                }
            }
        }

        Ok(Some(trigger))
    }
}
