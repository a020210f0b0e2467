//! Trait definitions for external collaborators.
//!
//! The harvest logic never touches PostgreSQL or HTTP directly. It talks to:
//!
//! - [`InsightsApi`]: the remote account, location and insights endpoints
//! - [`HarvestStore`]: the tabular store holding accounts, configuration,
//!   locations with their progress markers, insight rows and the audit log
//! - [`TriggerScheduler`](crate::scheduler::TriggerScheduler): the named
//!   recurring invocations
//!
//! Implementations are injected as generic parameters, so tests run the full
//! state machine against in-memory mocks.

use std::future::Future;

use chrono::NaiveDate;

use crate::AppError;
use crate::marker::Marker;
use crate::models::{
    Account, AccountConfig, InsightRecord, InsightsPage, Location, LocationFilter, LogEntry,
    NewAccountConfig, NewLocation, StoreStats,
};
use crate::window::Window;

/// Client for the remote Business Profile APIs.
pub trait InsightsApi: Send + Sync + Clone {
    /// Lists every account visible to the access token, following pagination.
    fn list_accounts(&self) -> impl Future<Output = Result<Vec<Account>, AppError>> + Send;

    /// Lists the locations of one account, following pagination.
    ///
    /// The filter is applied server-side.
    fn list_locations(
        &self,
        account_group: &str,
        filter: &LocationFilter,
    ) -> impl Future<Output = Result<Vec<NewLocation>, AppError>> + Send;

    /// Requests aggregated metrics for `location_names` over `window`.
    ///
    /// Returns every page. A page carrying `error` is a per-call failure and is
    /// returned as data; `Err` is reserved for transport and parse failures.
    fn report_insights(
        &self,
        account_group: &str,
        location_names: &[String],
        window: &Window,
    ) -> impl Future<Output = Result<Vec<InsightsPage>, AppError>> + Send;
}

/// Durable harvest state.
///
/// Rows are ordered by insertion; location ids double as row positions.
pub trait HarvestStore: Send + Sync + Clone {
    // ---- accounts -----------------------------------------------------------

    /// Replaces the accounts listing.
    fn replace_accounts(
        &self,
        accounts: &[Account],
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn list_accounts(&self) -> impl Future<Output = Result<Vec<Account>, AppError>> + Send;

    // ---- configuration ------------------------------------------------------

    /// Configuration rows ordered by position.
    fn list_account_configs(
        &self,
    ) -> impl Future<Output = Result<Vec<AccountConfig>, AppError>> + Send;

    /// Replaces every configuration row. New rows start with an empty marker.
    fn replace_account_configs(
        &self,
        configs: &[NewAccountConfig],
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn clear_listing_markers(&self) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// The stored retention length, unvalidated.
    fn retention_weeks(&self) -> impl Future<Output = Result<Option<i64>, AppError>> + Send;

    fn set_retention_weeks(&self, weeks: i64)
    -> impl Future<Output = Result<(), AppError>> + Send;

    // ---- locations ----------------------------------------------------------

    /// Locations ordered by row position.
    fn list_locations(&self) -> impl Future<Output = Result<Vec<Location>, AppError>> + Send;

    /// Appends one account's listing and sets its config row's listing
    /// marker in a single atomic write.
    ///
    /// Either both land or neither does; a listing is never stored without
    /// the marker that stops it from being listed again.
    fn commit_listing(
        &self,
        position: i64,
        locations: &[NewLocation],
        marker: &Marker,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn clear_locations(&self) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Writes one marker to several locations.
    fn set_location_markers(
        &self,
        ids: &[i64],
        marker: &Marker,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn clear_location_markers(&self) -> impl Future<Output = Result<u64, AppError>> + Send;

    // ---- insights -----------------------------------------------------------

    /// Appends a batch's insight rows and advances the markers of the
    /// covered locations in a single atomic write.
    ///
    /// Returns the number of rows appended.
    fn commit_batch(
        &self,
        records: &[InsightRecord],
        ids: &[i64],
        marker: &Marker,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn clear_insights(&self) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Start date of the oldest stored week, if any rows exist.
    fn oldest_insight_week(
        &self,
    ) -> impl Future<Output = Result<Option<NaiveDate>, AppError>> + Send;

    /// Deletes every row whose window starts on `start_week`.
    fn delete_insights_for_week(
        &self,
        start_week: NaiveDate,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    // ---- audit log ----------------------------------------------------------

    fn append_log(&self, message: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Keeps the newest `max_rows` entries.
    fn trim_log(&self, max_rows: usize) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Newest entries first.
    fn recent_logs(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<LogEntry>, AppError>> + Send;

    fn stats(&self) -> impl Future<Output = Result<StoreStats, AppError>> + Send;
}
