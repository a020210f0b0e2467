//! Fetch-retry engine.
//!
//! One unit of work is one batch × one window. When the API reports an error
//! for the call, the engine drops the lowest-ordered location and retries the
//! smaller batch after a linear backoff (`attempt * base_delay`). Locations
//! dropped along the way, and every member of a batch that exhausts its
//! attempts, are left untouched so the next pass picks them up again.

use chrono::{Duration, NaiveDate};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::batch::LocationBatch;
use crate::config::FetchConfig;
use crate::error::AppError;
use crate::marker::Marker;
use crate::models::{InsightRecord, InsightsPage, Location, MetricValues};
use crate::schema::{METRIC_COUNT, Metric};
use crate::traits::InsightsApi;
use crate::window::{WINDOW_DAYS, Window};

/// Result of fetching one batch for one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Mapped rows; locations absent from the response have none.
    pub records: Vec<InsightRecord>,
    /// Locations the successful call covered. Empty when abandoned.
    pub covered: Vec<Location>,
    /// Locations removed by shrinking, in removal order.
    pub dropped: Vec<Location>,
    /// Remote calls made.
    pub attempts: u32,
    /// True when the engine gave up without a successful call.
    pub abandoned: bool,
}

/// Executes batches against an [`InsightsApi`].
#[derive(Clone)]
pub struct FetchEngine<A: InsightsApi> {
    api: A,
    config: FetchConfig,
}

impl<A: InsightsApi> FetchEngine<A> {
    pub fn new(api: A, config: FetchConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetches `batch` for `window`, shrinking on reported errors.
    ///
    /// At most `min(batch.len(), max_attempts)` calls are made. Transport and
    /// parse failures are returned as `Err` and end the slice.
    pub async fn fetch(
        &self,
        window: &Window,
        mut batch: LocationBatch,
    ) -> Result<FetchOutcome, AppError> {
        let mut dropped = Vec::new();
        let mut attempt: u32 = 1;
        let mut calls: u32 = 0;

        loop {
            if batch.is_empty() {
                warn!(
                    %window,
                    account = %batch.account,
                    dropped = dropped.len(),
                    "Batch emptied by retries, no locations left"
                );
                return Ok(FetchOutcome {
                    records: Vec::new(),
                    covered: Vec::new(),
                    dropped,
                    attempts: calls,
                    abandoned: true,
                });
            }

            let pages = self
                .api
                .report_insights(&batch.account, &batch.names(), window)
                .await?;
            calls += 1;

            let Some(error) = pages.iter().find_map(|p| p.error.as_ref()) else {
                let records = map_records(&batch, &pages, window);
                debug!(%window, account = %batch.account, records = records.len(), "Batch fetched");
                return Ok(FetchOutcome {
                    records,
                    covered: batch.into_locations(),
                    dropped,
                    attempts: calls,
                    abandoned: false,
                });
            };

            warn!(
                %window,
                account = %batch.account,
                size = batch.len(),
                attempt,
                error = %error,
                "Insights call reported an error"
            );

            if attempt >= self.config.max_attempts {
                return Ok(FetchOutcome {
                    records: Vec::new(),
                    covered: Vec::new(),
                    dropped,
                    attempts: calls,
                    abandoned: true,
                });
            }

            if let Some(first) = batch.pop_front() {
                dropped.push(first);
            }
            attempt += 1;
            sleep(self.config.delay_for_attempt(attempt)).await;
        }
    }
}

/// Maps every page's metrics onto the batch, keyed by `locations/{id}`.
fn map_records(batch: &LocationBatch, pages: &[InsightsPage], window: &Window) -> Vec<InsightRecord> {
    pages
        .iter()
        .flat_map(|page| page.location_metrics.iter())
        .filter_map(|lm| {
            let location = batch.get(lm.location_key())?;
            let mut metrics = MetricValues::default();
            for (position, value) in lm.metric_values.iter().enumerate() {
                let metric = match value.metric.as_deref() {
                    Some(name) => Metric::from_api_name(name),
                    None if position < METRIC_COUNT => Some(Metric::ALL[position]),
                    None => None,
                };
                let Some(metric) = metric else { continue };
                let parsed = value
                    .total_value
                    .as_ref()
                    .and_then(|t| t.value.as_deref())
                    .and_then(|v| v.parse::<i64>().ok());
                metrics.set(metric, parsed);
            }
            Some(InsightRecord {
                account: location.account.clone(),
                location_title: location.title.clone(),
                store_code: location.store_code.clone(),
                region: location.region.clone(),
                status: location.status.clone(),
                category: location.category.clone(),
                time_zone: lm.time_zone.clone(),
                metrics,
                start_week: window.first_day,
                end_week: window.last_day,
            })
        })
        .collect()
}

/// The marker to store after a successful call for `window`.
///
/// The present trails the boundary by `data_lag_days`. If the window ends more
/// than a week before the present, more catch-up remains and the window end is
/// stored; otherwise the location is caught up to `boundary`.
///
/// ```
/// use chrono::NaiveDate;
/// use locus_core::fetch::target_marker;
/// use locus_core::marker::Marker;
/// use locus_core::window::Window;
///
/// let boundary = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
/// let first = Window::starting(NaiveDate::from_ymd_opt(2024, 2, 23).unwrap());
/// assert_eq!(target_marker(&first, boundary, 7), Marker::Pending(first.last_day));
/// assert_eq!(target_marker(&first.advance(), boundary, 7), Marker::Caught(boundary));
/// ```
pub fn target_marker(window: &Window, boundary: NaiveDate, data_lag_days: i64) -> Marker {
    let present = boundary + Duration::days(data_lag_days);
    if (present - window.last_day).num_days() > WINDOW_DAYS {
        Marker::Pending(window.last_day)
    } else {
        Marker::Caught(boundary)
    }
}
