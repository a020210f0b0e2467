//! Client for the Business Profile account, location and insights APIs.
//!
//! Three services are involved:
//!
//! - Account Management v1: `GET accounts`
//! - Business Information v1: `GET {account}/locations`
//! - My Business v4: `POST {account}/locations:reportInsights`
//!
//! All three paginate with `nextPageToken`; the client follows every page,
//! pausing `HttpConfig::page_delay` between requests.

use std::time::Duration;

use locus_core::error::AppError;
use locus_core::models::{Account, InsightsPage, LocationFilter, NewLocation};
use locus_core::schema::locations::NOT_AVAILABLE;
use locus_core::traits::InsightsApi;
use locus_core::window::Window;
use locus_core::HttpConfig;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::debug;

/// Fields requested from the location listing.
const LOCATION_READ_MASK: &str = "name,storeCode,title,categories,storefrontAddress,openInfo";

const ACCOUNTS_PAGE_SIZE: &str = "20";
const LOCATIONS_PAGE_SIZE: &str = "100";

// =============================================================================
// Wire types
// =============================================================================

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct AccountsPage {
    #[serde(default)]
    accounts: Vec<AccountDto>,
    next_page_token: Option<String>,
}

/// An account as returned by Account Management v1.
///
/// ```
/// use locus_client::business_profile::AccountDto;
///
/// let json = r#"{
///     "name": "accounts/1234",
///     "accountName": "Bakeries North",
///     "type": "LOCATION_GROUP",
///     "role": "OWNER",
///     "permissionLevel": "OWNER_LEVEL"
/// }"#;
/// let dto: AccountDto = serde_json::from_str(json).unwrap();
/// let account = dto.into_account();
/// assert_eq!(account.account_name, "Bakeries North");
/// assert_eq!(account.account_type.as_deref(), Some("LOCATION_GROUP"));
/// ```
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AccountDto {
    pub name: String,
    pub account_name: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub role: Option<String>,
    pub permission_level: Option<String>,
}

impl AccountDto {
    /// Converts into the core model; a missing display name falls back to the
    /// resource name.
    pub fn into_account(self) -> Account {
        Account {
            account_name: self.account_name.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            account_type: self.account_type,
            role: self.role,
            permission_level: self.permission_level,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct LocationsPage {
    #[serde(default)]
    locations: Vec<LocationDto>,
    next_page_token: Option<String>,
}

/// A location as returned by Business Information v1 with
/// [`LOCATION_READ_MASK`].
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LocationDto {
    /// `locations/{id}`.
    pub name: String,
    pub title: Option<String>,
    pub store_code: Option<String>,
    pub categories: Option<CategoriesDto>,
    pub storefront_address: Option<AddressDto>,
    pub open_info: Option<OpenInfoDto>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CategoriesDto {
    pub primary_category: Option<CategoryDto>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDto {
    pub display_name: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AddressDto {
    pub region_code: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct OpenInfoDto {
    pub status: Option<String>,
}

impl LocationDto {
    /// Converts into a listing row of `account_group`. Missing fields become
    /// `N/A`.
    pub fn into_new_location(self, account_group: &str) -> NewLocation {
        fn or_na(value: Option<String>) -> String {
            value
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        }

        NewLocation {
            account: account_group.to_string(),
            name: self.name,
            title: or_na(self.title),
            store_code: or_na(self.store_code),
            status: or_na(self.open_info.and_then(|o| o.status)),
            region: or_na(self.storefront_address.and_then(|a| a.region_code)),
            category: or_na(
                self.categories
                    .and_then(|c| c.primary_category)
                    .and_then(|c| c.display_name),
            ),
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ReportInsightsRequest {
    location_names: Vec<String>,
    basic_request: BasicMetricsRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct BasicMetricsRequest {
    metric_requests: Vec<MetricRequest>,
    time_range: TimeRange,
}

#[derive(Serialize, Debug)]
struct MetricRequest {
    metric: &'static str,
    options: Vec<&'static str>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TimeRange {
    start_time: String,
    end_time: String,
}

impl ReportInsightsRequest {
    fn new(account_group: &str, location_names: &[String], window: &Window) -> Self {
        let (start_time, end_time) = window.time_range();
        Self {
            location_names: location_names
                .iter()
                .map(|name| format!("{}/{}", account_group, name))
                .collect(),
            basic_request: BasicMetricsRequest {
                metric_requests: vec![MetricRequest {
                    metric: "ALL",
                    options: vec!["AGGREGATED_TOTAL"],
                }],
                time_range: TimeRange {
                    start_time,
                    end_time,
                },
            },
            page_token: None,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the Business Profile APIs.
///
/// # Examples
///
/// ```no_run
/// use locus_client::BusinessProfileClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// use locus_core::traits::InsightsApi;
///
/// let client = BusinessProfileClient::new("ya29.token")?;
/// let accounts = client.list_accounts().await?;
/// println!("{} accounts visible", accounts.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BusinessProfileClient {
    client: Client,
    access_token: String,
    account_api: Url,
    business_info_api: Url,
    insights_api: Url,
    page_delay: Duration,
    timeout: Duration,
}

impl BusinessProfileClient {
    /// Creates a client against the production endpoints.
    pub fn new(access_token: &str) -> Result<Self, AppError> {
        Self::with_config(access_token, HttpConfig::default())
    }

    /// Creates a client with explicit HTTP settings.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if a base URL does not parse.
    /// Returns `AppError::ClientError` if the HTTP client cannot be built.
    pub fn with_config(access_token: &str, config: HttpConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            access_token: access_token.to_string(),
            account_api: parse_base(&config.account_api_url)?,
            business_info_api: parse_base(&config.business_info_api_url)?,
            insights_api: parse_base(&config.insights_api_url)?,
            page_delay: config.page_delay,
            timeout: config.timeout,
        })
    }

    fn accounts_url(&self, page_token: Option<&str>) -> Result<Url, AppError> {
        let mut url = join(&self.account_api, "accounts")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("pageSize", ACCOUNTS_PAGE_SIZE);
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }

    fn locations_url(
        &self,
        account_group: &str,
        filter: &LocationFilter,
        page_token: Option<&str>,
    ) -> Result<Url, AppError> {
        let mut url = join(
            &self.business_info_api,
            &format!("{}/locations", account_group),
        )?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("readMask", LOCATION_READ_MASK);
            query.append_pair("pageSize", LOCATIONS_PAGE_SIZE);
            if let Some(expr) = filter.to_query() {
                query.append_pair("filter", &expr);
            }
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }

    fn report_url(&self, account_group: &str) -> Result<Url, AppError> {
        join(
            &self.insights_api,
            &format!("{}/locations:reportInsights", account_group),
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.access_token)
    }

    fn map_send_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout.as_secs())
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {}", e))
        } else {
            AppError::ClientError(e.to_string())
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, AppError> {
        let resp = self
            .authorized(self.client.get(url.clone()))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimitExceeded);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::ClientError(format!(
                "HTTP {} from {}: {}",
                status.as_u16(),
                url.path(),
                body.trim()
            )));
        }

        resp.json()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))
    }

    /// Posts one `reportInsights` page request.
    ///
    /// See [`failed_report`] for how a non-2xx response is classified.
    async fn post_report(
        &self,
        url: &Url,
        request: &ReportInsightsRequest,
    ) -> Result<InsightsPage, AppError> {
        let resp = self
            .authorized(self.client.post(url.clone()))
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }
        failed_report(status, url.path(), &body)
    }
}

/// Classifies a non-2xx `reportInsights` response.
///
/// A 429 is `RateLimitExceeded` whatever its body, so throttling ends the
/// slice instead of shrinking the batch. Any other status with an API error
/// object becomes an error page; everything else is a `ClientError`.
fn failed_report(status: StatusCode, path: &str, body: &str) -> Result<InsightsPage, AppError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AppError::RateLimitExceeded);
    }
    if let Some(page) = parse_error_page(body) {
        return Ok(page);
    }
    Err(AppError::ClientError(format!(
        "HTTP {} from {}: {}",
        status.as_u16(),
        path,
        body.trim()
    )))
}

fn parse_base(raw: &str) -> Result<Url, AppError> {
    Url::parse(raw).map_err(|_| AppError::InvalidUrl(raw.to_string()))
}

fn join(base: &Url, path: &str) -> Result<Url, AppError> {
    base.join(path)
        .map_err(|_| AppError::InvalidUrl(format!("{}{}", base, path)))
}

/// Parses a Google API error body into an error page.
fn parse_error_page(body: &str) -> Option<InsightsPage> {
    serde_json::from_str::<InsightsPage>(body)
        .ok()
        .filter(|page| page.error.is_some())
}

impl InsightsApi for BusinessProfileClient {
    async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        let mut accounts = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let url = self.accounts_url(page_token.as_deref())?;
            let page: AccountsPage = self.get_json(url).await?;
            accounts.extend(page.accounts.into_iter().map(AccountDto::into_account));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => {
                    page_token = Some(token);
                    sleep(self.page_delay).await;
                }
                None => break,
            }
        }

        debug!(count = accounts.len(), "Accounts listed");
        Ok(accounts)
    }

    async fn list_locations(
        &self,
        account_group: &str,
        filter: &LocationFilter,
    ) -> Result<Vec<NewLocation>, AppError> {
        let mut locations = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let url = self.locations_url(account_group, filter, page_token.as_deref())?;
            let page: LocationsPage = self.get_json(url).await?;
            locations.extend(
                page.locations
                    .into_iter()
                    .map(|dto| dto.into_new_location(account_group)),
            );

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => {
                    page_token = Some(token);
                    sleep(self.page_delay).await;
                }
                None => break,
            }
        }

        debug!(account_group, count = locations.len(), "Locations listed");
        Ok(locations)
    }

    async fn report_insights(
        &self,
        account_group: &str,
        location_names: &[String],
        window: &Window,
    ) -> Result<Vec<InsightsPage>, AppError> {
        let url = self.report_url(account_group)?;
        let mut request = ReportInsightsRequest::new(account_group, location_names, window);
        let mut pages = Vec::new();

        loop {
            let page = self.post_report(&url, &request).await?;
            let next = page.next_page_token.clone().filter(|t| !t.is_empty());
            let failed = page.error.is_some();
            pages.push(page);

            match next {
                Some(token) if !failed => {
                    request.page_token = Some(token);
                    sleep(self.page_delay).await;
                }
                _ => break,
            }
        }

        Ok(pages)
    }
}
