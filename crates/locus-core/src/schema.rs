//! Static table schema.
//!
//! Column names are compile-time constants shared by the repository layer and
//! the CLI. The insights table stores the fourteen report metrics in the fixed
//! order of [`Metric::ALL`].

pub const METRIC_COUNT: usize = 14;

/// A metric requested from `reportInsights` with `metric: ALL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    QueriesDirect,
    QueriesIndirect,
    QueriesChain,
    ViewsMaps,
    ViewsSearch,
    ActionsWebsite,
    ActionsPhone,
    ActionsDrivingDirections,
    PhotosViewsMerchant,
    PhotosViewsCustomers,
    PhotosCountMerchant,
    PhotosCountCustomers,
    LocalPostViewsSearch,
    LocalPostActionsCallToAction,
}

impl Metric {
    /// Column order of the insights table.
    pub const ALL: [Metric; METRIC_COUNT] = [
        Metric::QueriesDirect,
        Metric::QueriesIndirect,
        Metric::QueriesChain,
        Metric::ViewsMaps,
        Metric::ViewsSearch,
        Metric::ActionsWebsite,
        Metric::ActionsPhone,
        Metric::ActionsDrivingDirections,
        Metric::PhotosViewsMerchant,
        Metric::PhotosViewsCustomers,
        Metric::PhotosCountMerchant,
        Metric::PhotosCountCustomers,
        Metric::LocalPostViewsSearch,
        Metric::LocalPostActionsCallToAction,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Name used by the API in `metricValues[].metric`.
    pub fn api_name(self) -> &'static str {
        match self {
            Metric::QueriesDirect => "QUERIES_DIRECT",
            Metric::QueriesIndirect => "QUERIES_INDIRECT",
            Metric::QueriesChain => "QUERIES_CHAIN",
            Metric::ViewsMaps => "VIEWS_MAPS",
            Metric::ViewsSearch => "VIEWS_SEARCH",
            Metric::ActionsWebsite => "ACTIONS_WEBSITE",
            Metric::ActionsPhone => "ACTIONS_PHONE",
            Metric::ActionsDrivingDirections => "ACTIONS_DRIVING_DIRECTIONS",
            Metric::PhotosViewsMerchant => "PHOTOS_VIEWS_MERCHANT",
            Metric::PhotosViewsCustomers => "PHOTOS_VIEWS_CUSTOMERS",
            Metric::PhotosCountMerchant => "PHOTOS_COUNT_MERCHANT",
            Metric::PhotosCountCustomers => "PHOTOS_COUNT_CUSTOMERS",
            Metric::LocalPostViewsSearch => "LOCAL_POST_VIEWS_SEARCH",
            Metric::LocalPostActionsCallToAction => "LOCAL_POST_ACTIONS_CALL_TO_ACTION",
        }
    }

    /// Column name in the insights table.
    pub fn column(self) -> &'static str {
        match self {
            Metric::QueriesDirect => "queries_direct",
            Metric::QueriesIndirect => "queries_indirect",
            Metric::QueriesChain => "queries_chain",
            Metric::ViewsMaps => "views_maps",
            Metric::ViewsSearch => "views_search",
            Metric::ActionsWebsite => "actions_website",
            Metric::ActionsPhone => "actions_phone",
            Metric::ActionsDrivingDirections => "actions_driving_directions",
            Metric::PhotosViewsMerchant => "photos_views_merchant",
            Metric::PhotosViewsCustomers => "photos_views_customers",
            Metric::PhotosCountMerchant => "photos_count_merchant",
            Metric::PhotosCountCustomers => "photos_count_customers",
            Metric::LocalPostViewsSearch => "local_post_views_search",
            Metric::LocalPostActionsCallToAction => "local_post_actions_call_to_action",
        }
    }

    pub fn from_api_name(name: &str) -> Option<Metric> {
        Metric::ALL.into_iter().find(|m| m.api_name() == name)
    }
}

pub mod accounts {
    pub const TABLE: &str = "accounts";
    pub const NAME: &str = "name";
    pub const ACCOUNT_NAME: &str = "account_name";
    pub const ACCOUNT_TYPE: &str = "account_type";
    pub const ROLE: &str = "role";
    pub const PERMISSION_LEVEL: &str = "permission_level";

    /// Stored columns, in select and insert order.
    pub const COLUMNS: [&str; 5] = [NAME, ACCOUNT_NAME, ACCOUNT_TYPE, ROLE, PERMISSION_LEVEL];
}

pub mod account_configs {
    pub const TABLE: &str = "account_configs";
    pub const POSITION: &str = "position";
    pub const ACCOUNT_NAME: &str = "account_name";
    pub const ACCOUNT_GROUP: &str = "account_group";
    pub const STATUS_FILTER: &str = "status_filter";
    pub const REGION_FILTER: &str = "region_filter";
    pub const LISTING_MARKER: &str = "listing_marker";

    /// Columns written when a row is created; the marker starts empty.
    pub const INSERT_COLUMNS: [&str; 5] = [
        POSITION,
        ACCOUNT_NAME,
        ACCOUNT_GROUP,
        STATUS_FILTER,
        REGION_FILTER,
    ];

    pub const COLUMNS: [&str; 6] = [
        POSITION,
        ACCOUNT_NAME,
        ACCOUNT_GROUP,
        STATUS_FILTER,
        REGION_FILTER,
        LISTING_MARKER,
    ];

    /// Filter value meaning "no filter".
    pub const NO_FILTER: &str = "-none-";
}

pub mod locations {
    pub const TABLE: &str = "locations";
    pub const ID: &str = "id";
    pub const ACCOUNT: &str = "account";
    pub const NAME: &str = "name";
    pub const TITLE: &str = "title";
    pub const STORE_CODE: &str = "store_code";
    pub const STATUS: &str = "status";
    pub const REGION: &str = "region";
    pub const CATEGORY: &str = "category";
    pub const INSIGHTS_MARKER: &str = "insights_marker";

    /// Columns written on append; ids are assigned by the store and the
    /// marker starts empty.
    pub const INSERT_COLUMNS: [&str; 7] =
        [ACCOUNT, NAME, TITLE, STORE_CODE, STATUS, REGION, CATEGORY];

    pub const COLUMNS: [&str; 9] = [
        ID,
        ACCOUNT,
        NAME,
        TITLE,
        STORE_CODE,
        STATUS,
        REGION,
        CATEGORY,
        INSIGHTS_MARKER,
    ];

    /// Placeholder for a status or region the API did not return.
    pub const NOT_AVAILABLE: &str = "N/A";
}

pub mod insights {
    use super::{METRIC_COUNT, Metric};

    pub const TABLE: &str = "insights";
    pub const ACCOUNT: &str = "account";
    pub const LOCATION_TITLE: &str = "location_title";
    pub const STORE_CODE: &str = "store_code";
    pub const REGION: &str = "region";
    pub const STATUS: &str = "status";
    pub const CATEGORY: &str = "category";
    pub const TIME_ZONE: &str = "time_zone";
    pub const START_WEEK: &str = "start_week";
    pub const END_WEEK: &str = "end_week";

    /// Leading metadata columns, before the metrics.
    pub const METADATA_COLUMNS: [&str; 7] = [
        ACCOUNT,
        LOCATION_TITLE,
        STORE_CODE,
        REGION,
        STATUS,
        CATEGORY,
        TIME_ZONE,
    ];

    /// Full insert column list: metadata, metrics in order, then window dates.
    pub fn columns() -> Vec<&'static str> {
        let mut columns = Vec::with_capacity(METADATA_COLUMNS.len() + METRIC_COUNT + 2);
        columns.extend(METADATA_COLUMNS);
        columns.extend(Metric::ALL.iter().map(|m| m.column()));
        columns.push(START_WEEK);
        columns.push(END_WEEK);
        columns
    }
}

pub mod audit_log {
    pub const TABLE: &str = "audit_log";

    /// Rows kept after a trim.
    pub const MAX_ROWS: usize = 1500;
}
