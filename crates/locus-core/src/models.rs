//! Domain models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::marker::Marker;
use crate::schema::{METRIC_COUNT, Metric, account_configs};

// =============================================================================
// Pass kind
// =============================================================================

/// The two categories of harvest pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassKind {
    /// Initial backfill over the full retention period.
    Yearly,
    /// Steady-state pass covering the most recent week.
    Weekly,
}

impl PassKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassKind::Yearly => "yearly",
            PassKind::Weekly => "weekly",
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PassKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yearly" => Ok(PassKind::Yearly),
            "weekly" => Ok(PassKind::Weekly),
            _ => Err(AppError::Generic(format!(
                "Unknown pass kind: '{}'. Valid options: yearly, weekly",
                s
            ))),
        }
    }
}

// =============================================================================
// Accounts and configuration
// =============================================================================

/// An account the access token can see, as listed by the account API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Resource name, `accounts/{id}`.
    pub name: String,
    /// Display name.
    pub account_name: String,
    pub account_type: Option<String>,
    pub role: Option<String>,
    pub permission_level: Option<String>,
}

/// A configured account whose locations are harvested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    /// Row position; the first row's listing marker is the pass boundary.
    pub position: i64,
    pub account_name: String,
    /// Resource name of the account, `accounts/{id}`.
    pub account_group: String,
    pub status_filter: Option<String>,
    pub region_filter: Option<String>,
    pub listing_marker: Marker,
}

impl AccountConfig {
    pub fn filter(&self) -> LocationFilter {
        LocationFilter::new(self.status_filter.as_deref(), self.region_filter.as_deref())
    }
}

/// A configuration row to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccountConfig {
    pub account_name: String,
    pub account_group: String,
    pub status_filter: Option<String>,
    pub region_filter: Option<String>,
}

/// Server-side filter for a location listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationFilter {
    pub status: Option<String>,
    pub region: Option<String>,
}

impl LocationFilter {
    /// Empty values and `-none-` mean "no filter".
    pub fn new(status: Option<&str>, region: Option<&str>) -> Self {
        fn keep(value: Option<&str>) -> Option<String> {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty() && *v != account_configs::NO_FILTER)
                .map(str::to_string)
        }
        Self {
            status: keep(status),
            region: keep(region),
        }
    }

    /// The `filter` query parameter, or `None` when unfiltered.
    ///
    /// ```
    /// use locus_core::models::LocationFilter;
    ///
    /// let filter = LocationFilter::new(Some("OPEN"), Some("IT"));
    /// assert_eq!(
    ///     filter.to_query().as_deref(),
    ///     Some(r#"openInfo.status="OPEN" AND storefrontAddress.regionCode="IT""#)
    /// );
    /// assert_eq!(LocationFilter::new(Some("-none-"), None).to_query(), None);
    /// ```
    pub fn to_query(&self) -> Option<String> {
        let mut clauses = Vec::new();
        if let Some(status) = &self.status {
            clauses.push(format!("openInfo.status=\"{}\"", status));
        }
        if let Some(region) = &self.region {
            clauses.push(format!("storefrontAddress.regionCode=\"{}\"", region));
        }
        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" AND "))
        }
    }
}

// =============================================================================
// Locations
// =============================================================================

/// A harvested location with its insights progress marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Store row id; also the row ordering.
    pub id: i64,
    /// Resource name of the owning account, `accounts/{id}`.
    pub account: String,
    /// Remote key, `locations/{id}`.
    pub name: String,
    pub title: String,
    pub store_code: String,
    pub status: String,
    pub region: String,
    pub category: String,
    pub marker: Marker,
}

/// A location as returned by a listing, before it has a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLocation {
    pub account: String,
    pub name: String,
    pub title: String,
    pub store_code: String,
    pub status: String,
    pub region: String,
    pub category: String,
}

// =============================================================================
// Insights
// =============================================================================

/// Metric values of one record, in [`Metric::ALL`] order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricValues(pub [Option<i64>; METRIC_COUNT]);

impl MetricValues {
    pub fn get(&self, metric: Metric) -> Option<i64> {
        self.0[metric.index()]
    }

    pub fn set(&mut self, metric: Metric, value: Option<i64>) {
        self.0[metric.index()] = value;
    }
}

/// One row per (location, window).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightRecord {
    pub account: String,
    pub location_title: String,
    pub store_code: String,
    pub region: String,
    pub status: String,
    pub category: String,
    pub time_zone: Option<String>,
    pub metrics: MetricValues,
    pub start_week: NaiveDate,
    pub end_week: NaiveDate,
}

// =============================================================================
// Remote report payloads
// =============================================================================

/// One page of a `reportInsights` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsPage {
    #[serde(default)]
    pub location_metrics: Vec<LocationMetrics>,
    pub next_page_token: Option<String>,
    /// Per-call error reported by the API instead of data.
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationMetrics {
    /// `accounts/{a}/locations/{l}`.
    pub location_name: String,
    pub time_zone: Option<String>,
    #[serde(default)]
    pub metric_values: Vec<MetricValue>,
}

impl LocationMetrics {
    /// The location key, `locations/{l}`, stripped of its account prefix.
    pub fn location_key(&self) -> &str {
        match self.location_name.find("locations/") {
            Some(at) => &self.location_name[at..],
            None => &self.location_name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    pub metric: Option<String>,
    pub total_value: Option<TotalValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TotalValue {
    /// Int64 values arrive as JSON strings.
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiErrorBody {
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    pub status: Option<String>,
}

impl fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, &self.status) {
            (Some(code), Some(status)) => write!(f, "{} {}: {}", code, status, self.message),
            (Some(code), None) => write!(f, "{}: {}", code, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

// =============================================================================
// Audit log and statistics
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: i64,
    pub logged_at: DateTime<Utc>,
    pub message: String,
}

/// Row counts shown by `locus status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub accounts: i64,
    pub account_configs: i64,
    pub locations: i64,
    pub caught_locations: i64,
    pub insights: i64,
    pub log_entries: i64,
}
