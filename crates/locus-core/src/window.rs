//! Weekly window arithmetic.
//!
//! A [`Window`] is a half-open `[first_day, last_day)` range exactly seven days
//! wide. Windows are never stored: only their end dates are persisted through
//! location markers. Dates are [`NaiveDate`] values, so they carry no time of
//! day and compare exactly.

use std::fmt;

use chrono::{Duration, NaiveDate};

use crate::error::AppError;

/// Width of every window, in days.
pub const WINDOW_DAYS: i64 = 7;

/// A seven-day `[first_day, last_day)` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Window {
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
}

impl Window {
    /// Builds the window starting on `first_day`.
    pub fn starting(first_day: NaiveDate) -> Self {
        Self {
            first_day,
            last_day: first_day + Duration::days(WINDOW_DAYS),
        }
    }

    /// The first window of a pass reaching back `weeks_back` weeks from `boundary`.
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use locus_core::window::{RetentionWeeks, Window};
    ///
    /// let boundary = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
    /// let weeks = RetentionWeeks::try_from(2).unwrap();
    /// let window = Window::first(boundary, weeks);
    /// assert_eq!(window.first_day, NaiveDate::from_ymd_opt(2024, 2, 23).unwrap());
    /// assert_eq!(window.last_day, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    /// ```
    pub fn first(boundary: NaiveDate, weeks_back: RetentionWeeks) -> Self {
        Self::starting(boundary - Duration::days(WINDOW_DAYS * weeks_back.get()))
    }

    /// The next window, shifted forward by seven days.
    pub fn advance(self) -> Self {
        Self::starting(self.last_day)
    }

    /// True while the coverage loop should still process this window.
    pub fn within(&self, boundary: NaiveDate) -> bool {
        self.last_day <= boundary
    }

    /// Start and end timestamps in the form the insights API expects.
    pub fn time_range(&self) -> (String, String) {
        (api_timestamp(self.first_day), api_timestamp(self.last_day))
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.first_day, self.last_day)
    }
}

fn api_timestamp(day: NaiveDate) -> String {
    format!("{}T00:00:00.000Z", day.format("%Y-%m-%d"))
}

/// Iterator over consecutive windows from a start date up to a boundary.
#[derive(Debug, Clone)]
pub struct Windows {
    next: Window,
    boundary: NaiveDate,
}

impl Iterator for Windows {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if !self.next.within(self.boundary) {
            return None;
        }
        let current = self.next;
        self.next = current.advance();
        Some(current)
    }
}

/// Windows starting at `start` while `last_day <= boundary`.
pub fn windows_from(start: NaiveDate, boundary: NaiveDate) -> Windows {
    Windows {
        next: Window::starting(start),
        boundary,
    }
}

/// Every window of a pass reaching back `weeks_back` weeks from `boundary`.
pub fn windows(boundary: NaiveDate, weeks_back: RetentionWeeks) -> Windows {
    windows_from(Window::first(boundary, weeks_back).first_day, boundary)
}

/// Number of weeks a pass reaches back, between one and
/// [`RetentionWeeks::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWeeks(i64);

impl RetentionWeeks {
    /// The span of a steady-state weekly pass.
    pub const ONE: RetentionWeeks = RetentionWeeks(1);

    /// Ten years. Keeps every window of a pass inside the calendar range of
    /// [`NaiveDate`].
    pub const MAX: i64 = 520;

    pub fn get(self) -> i64 {
        self.0
    }

    /// Validates a stored retention value.
    ///
    /// A missing value is as fatal as a non-positive one.
    pub fn from_stored(value: Option<i64>) -> Result<Self, AppError> {
        match value {
            Some(weeks) => Self::try_from(weeks),
            None => Err(AppError::ConfigError(
                "retention_weeks is not set; run `locus configure`".to_string(),
            )),
        }
    }
}

impl TryFrom<i64> for RetentionWeeks {
    type Error = AppError;

    fn try_from(weeks: i64) -> Result<Self, Self::Error> {
        if weeks < 1 {
            return Err(AppError::ConfigError(format!(
                "retention_weeks must be a positive number of weeks, got {}",
                weeks
            )));
        }
        if weeks > Self::MAX {
            return Err(AppError::ConfigError(format!(
                "retention_weeks must be at most {} weeks, got {}",
                Self::MAX,
                weeks
            )));
        }
        Ok(Self(weeks))
    }
}

impl fmt::Display for RetentionWeeks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
