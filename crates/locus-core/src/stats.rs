//! Pass outcome types and statistics.
//!
//! Pure bookkeeping for the resume driver, decoupled from I/O.

use std::fmt;

/// Outcome of one batch × window unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Records written and markers advanced for the surviving locations.
    Committed {
        records: usize,
        marked: usize,
        dropped: usize,
    },
    /// Retries exhausted or batch emptied; nothing written or marked.
    Abandoned { dropped: usize },
}

/// Statistics for one covering slice.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CoverStats {
    pub windows: usize,
    pub batches: usize,
    pub records: usize,
    pub marked: usize,
    pub dropped: usize,
    pub abandoned: usize,
}

impl CoverStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome, incrementing the appropriate counters.
    pub fn record(&mut self, outcome: BatchOutcome) {
        self.batches += 1;
        match outcome {
            BatchOutcome::Committed {
                records,
                marked,
                dropped,
            } => {
                self.records += records;
                self.marked += marked;
                self.dropped += dropped;
            }
            BatchOutcome::Abandoned { dropped } => {
                self.abandoned += 1;
                self.dropped += dropped;
            }
        }
    }
}

/// Why a slice stopped short of completing its pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    /// The window loop reached the boundary with locations still behind.
    WindowsExhausted,
    /// The slice ran out of wall-clock budget.
    SliceBudget,
    /// Shutdown was requested.
    Cancelled,
    /// No boundary or no locations yet; nothing to cover.
    NothingToDo,
}

impl fmt::Display for SuspendReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SuspendReason::WindowsExhausted => "locations still pending after the last window",
            SuspendReason::SliceBudget => "slice budget exhausted",
            SuspendReason::Cancelled => "cancelled",
            SuspendReason::NothingToDo => "nothing to cover",
        };
        f.write_str(text)
    }
}

/// Terminal state of one covering slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStatus {
    /// Every location carries a terminal marker.
    Done,
    /// Progress is checkpointed; a later slice resumes.
    Suspended(SuspendReason),
}

impl PassStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, PassStatus::Done)
    }
}

/// Result of one covering slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverResult {
    pub status: PassStatus,
    pub stats: CoverStats,
}

impl CoverResult {
    pub fn done(stats: CoverStats) -> Self {
        Self {
            status: PassStatus::Done,
            stats,
        }
    }

    pub fn suspended(reason: SuspendReason, stats: CoverStats) -> Self {
        Self {
            status: PassStatus::Suspended(reason),
            stats,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status.is_done()
    }
}
