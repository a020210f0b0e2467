//! Trigger types for the harvest schedule.
//!
//! A harvest advances through five named triggers. Each one, when it fires,
//! runs one bounded slice of work and either re-fires at its cadence or hands
//! over to the next trigger:
//!
//! ```text
//! yearly-locations-retry ─► yearly-insights-retry ─► steady-state-weekly
//!                                                        │ (every week)
//!                                                        ▼
//!                        weekly-insights-retry ◄─ weekly-locations-retry
//! ```
//!
//! Catch-up triggers fire hourly; `steady-state-weekly` fires once a week.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::PassKind;

// =============================================================================
// Trigger
// =============================================================================

/// The five named triggers. Their names form the job-id namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    YearlyLocationsRetry,
    YearlyInsightsRetry,
    WeeklyLocationsRetry,
    WeeklyInsightsRetry,
    SteadyStateWeekly,
}

impl Trigger {
    pub const ALL: [Trigger; 5] = [
        Trigger::YearlyLocationsRetry,
        Trigger::YearlyInsightsRetry,
        Trigger::WeeklyLocationsRetry,
        Trigger::WeeklyInsightsRetry,
        Trigger::SteadyStateWeekly,
    ];

    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::YearlyLocationsRetry => "yearly-locations-retry",
            Trigger::YearlyInsightsRetry => "yearly-insights-retry",
            Trigger::WeeklyLocationsRetry => "weekly-locations-retry",
            Trigger::WeeklyInsightsRetry => "weekly-insights-retry",
            Trigger::SteadyStateWeekly => "steady-state-weekly",
        }
    }

    /// The pass this trigger belongs to.
    pub fn pass(&self) -> PassKind {
        match self {
            Trigger::YearlyLocationsRetry | Trigger::YearlyInsightsRetry => PassKind::Yearly,
            _ => PassKind::Weekly,
        }
    }
}

/// Error type for parsing Trigger from string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTriggerError(String);

impl std::fmt::Display for ParseTriggerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid trigger name: {}", self.0)
    }
}

impl std::error::Error for ParseTriggerError {}

impl std::str::FromStr for Trigger {
    type Err = ParseTriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Trigger::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseTriggerError(s.to_string()))
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Cadence
// =============================================================================

/// How often an armed trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "every", rename_all = "lowercase")]
pub enum Cadence {
    Hourly,
    /// Once a week on `weekday` at `hour:00` UTC.
    Weekly { weekday: Weekday, hour: u32 },
}

impl Cadence {
    /// Weekly cadence for the steady-state tick.
    ///
    /// The tick runs on the weekday preceding the pass boundary, one hour
    /// before the current hour when that hour is later than 1 AM.
    ///
    /// ```
    /// use chrono::{NaiveDate, TimeZone, Utc, Weekday};
    /// use locus_core::trigger::Cadence;
    ///
    /// let boundary = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(); // a Friday
    /// let now = Utc.with_ymd_and_hms(2024, 3, 15, 14, 20, 0).unwrap();
    /// assert_eq!(
    ///     Cadence::steady_state(boundary, now),
    ///     Cadence::Weekly { weekday: Weekday::Thu, hour: 13 }
    /// );
    /// ```
    pub fn steady_state(boundary: NaiveDate, now: DateTime<Utc>) -> Self {
        let weekday = (boundary - Duration::days(1)).weekday();
        let hour = if now.hour() > 1 { now.hour() - 1 } else { now.hour() };
        Cadence::Weekly { weekday, hour }
    }

    /// The first firing time strictly after `from`.
    pub fn next_after(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Cadence::Hourly => from + Duration::hours(1),
            Cadence::Weekly { weekday, hour } => {
                let today = from.weekday().num_days_from_monday() as i64;
                let target = weekday.num_days_from_monday() as i64;
                let day = from.date_naive() + Duration::days((target - today).rem_euclid(7));
                let candidate = match day.and_hms_opt(hour.min(23), 0, 0) {
                    Some(at) => at.and_utc(),
                    None => return from + Duration::weeks(1),
                };
                if candidate > from {
                    candidate
                } else {
                    candidate + Duration::weeks(1)
                }
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Cadence::Hourly => "hourly".to_string(),
            Cadence::Weekly { weekday, hour } => format!("weekly on {} at {:02}:00 UTC", weekday, hour),
        }
    }
}

// =============================================================================
// Armed Trigger
// =============================================================================

/// A trigger currently registered with the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedTrigger {
    pub trigger: Trigger,
    pub cadence: Cadence,
    pub next_run_at: DateTime<Utc>,
    pub armed_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl ArmedTrigger {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run_at <= now
    }
}

// =============================================================================
// Worker Configuration
// =============================================================================

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Unique worker identifier.
    pub worker_id: String,
    /// How often to poll for due triggers.
    pub poll_interval: std::time::Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            poll_interval: std::time::Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Set the worker ID.
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: std::time::Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
