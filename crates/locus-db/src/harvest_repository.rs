//! Harvest state repository for PostgreSQL.
//!
//! Implements the [`HarvestStore`] trait over the tables created by
//! [`ensure_schema`](crate::ensure_schema). Table and column names come from
//! [`locus_core::schema`]. Replacements and commits run inside one
//! transaction each: a batch's insight rows land together with the markers
//! they advance, and a listing together with its config row's marker.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool, Pool, Postgres, QueryBuilder};

use locus_core::error::AppError;
use locus_core::marker::Marker;
use locus_core::models::{
    Account, AccountConfig, InsightRecord, Location, LogEntry, NewAccountConfig, NewLocation,
    StoreStats,
};
use locus_core::schema::{account_configs, accounts, insights, locations};
use locus_core::traits::HarvestStore;

/// Rows per multi-row INSERT. Keeps the bind count well under the
/// PostgreSQL limit of 65535 parameters.
const INSERT_CHUNK: usize = 1000;

fn column_list(columns: &[&str]) -> String {
    columns.join(", ")
}

/// Repository for harvest state in PostgreSQL.
///
/// # Examples
///
/// ```no_run
/// use sqlx::postgres::PgPoolOptions;
/// use locus_db::HarvestRepository;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgPoolOptions::new()
///     .max_connections(5)
///     .connect("postgresql://localhost/locus")
///     .await?;
///
/// locus_db::ensure_schema(&pool).await?;
/// let repo = HarvestRepository::new(pool);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HarvestRepository {
    pool: Pool<Postgres>,
}

impl HarvestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Checks that the database answers.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Appends locations on `conn`, chunked to stay under the bind limit.
async fn insert_locations(
    conn: &mut PgConnection,
    new_locations: &[NewLocation],
) -> Result<u64, AppError> {
    let columns = column_list(&locations::INSERT_COLUMNS);
    let mut inserted = 0;
    for chunk in new_locations.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            locations::TABLE,
            columns
        ));
        builder.push_values(chunk, |mut row, location| {
            row.push_bind(&location.account)
                .push_bind(&location.name)
                .push_bind(&location.title)
                .push_bind(&location.store_code)
                .push_bind(&location.status)
                .push_bind(&location.region)
                .push_bind(&location.category);
        });
        inserted += builder.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(inserted)
}

/// Appends insight rows on `conn`, chunked like [`insert_locations`].
async fn insert_insights(
    conn: &mut PgConnection,
    records: &[InsightRecord],
) -> Result<u64, AppError> {
    let columns = column_list(&insights::columns());
    let mut inserted = 0;
    for chunk in records.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} ({}) ", insights::TABLE, columns));
        builder.push_values(chunk, |mut row, record| {
            row.push_bind(&record.account)
                .push_bind(&record.location_title)
                .push_bind(&record.store_code)
                .push_bind(&record.region)
                .push_bind(&record.status)
                .push_bind(&record.category)
                .push_bind(&record.time_zone);
            for value in record.metrics.0 {
                row.push_bind(value);
            }
            row.push_bind(record.start_week).push_bind(record.end_week);
        });
        inserted += builder.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(inserted)
}

async fn update_location_markers(
    conn: &mut PgConnection,
    ids: &[i64],
    marker: &Marker,
) -> Result<u64, AppError> {
    if ids.is_empty() {
        return Ok(0);
    }

    let query = format!(
        "UPDATE {} SET {} = $1 WHERE {} = ANY($2)",
        locations::TABLE,
        locations::INSIGHTS_MARKER,
        locations::ID
    );
    let result = sqlx::query(&query)
        .bind(marker.to_stored())
        .bind(ids)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Helper Types for Database Mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct AccountRow {
    name: String,
    account_name: String,
    account_type: Option<String>,
    role: Option<String>,
    permission_level: Option<String>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Self {
            name: row.name,
            account_name: row.account_name,
            account_type: row.account_type,
            role: row.role,
            permission_level: row.permission_level,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AccountConfigRow {
    position: i64,
    account_name: String,
    account_group: String,
    status_filter: Option<String>,
    region_filter: Option<String>,
    listing_marker: Option<String>,
}

impl From<AccountConfigRow> for AccountConfig {
    fn from(row: AccountConfigRow) -> Self {
        Self {
            position: row.position,
            account_name: row.account_name,
            account_group: row.account_group,
            status_filter: row.status_filter,
            region_filter: row.region_filter,
            listing_marker: Marker::from_stored(row.listing_marker.as_deref()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct LocationRow {
    id: i64,
    account: String,
    name: String,
    title: String,
    store_code: String,
    status: String,
    region: String,
    category: String,
    insights_marker: Option<String>,
}

impl From<LocationRow> for Location {
    fn from(row: LocationRow) -> Self {
        Self {
            id: row.id,
            account: row.account,
            name: row.name,
            title: row.title,
            store_code: row.store_code,
            status: row.status,
            region: row.region,
            category: row.category,
            marker: Marker::from_stored(row.insights_marker.as_deref()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct LogRow {
    id: i64,
    logged_at: DateTime<Utc>,
    message: String,
}

impl From<LogRow> for LogEntry {
    fn from(row: LogRow) -> Self {
        Self {
            id: row.id,
            logged_at: row.logged_at,
            message: row.message,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    accounts: Option<i64>,
    account_configs: Option<i64>,
    locations: Option<i64>,
    caught_locations: Option<i64>,
    insights: Option<i64>,
    log_entries: Option<i64>,
}

// =============================================================================
// HarvestStore Trait Implementation
// =============================================================================

impl HarvestStore for HarvestRepository {
    async fn replace_accounts(&self, accounts: &[Account]) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM {}", accounts::TABLE))
            .execute(&mut *tx)
            .await?;

        let columns = column_list(&accounts::COLUMNS);
        let mut inserted = 0;
        for chunk in accounts.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} ({}) ",
                accounts::TABLE,
                columns
            ));
            builder.push_values(chunk, |mut row, account| {
                row.push_bind(&account.name)
                    .push_bind(&account.account_name)
                    .push_bind(&account.account_type)
                    .push_bind(&account.role)
                    .push_bind(&account.permission_level);
            });
            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        let query = format!(
            "SELECT {} FROM {} ORDER BY id",
            column_list(&accounts::COLUMNS),
            accounts::TABLE
        );
        let rows: Vec<AccountRow> = sqlx::query_as(&query).fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_account_configs(&self) -> Result<Vec<AccountConfig>, AppError> {
        let query = format!(
            "SELECT {} FROM {} ORDER BY {}",
            column_list(&account_configs::COLUMNS),
            account_configs::TABLE,
            account_configs::POSITION
        );
        let rows: Vec<AccountConfigRow> = sqlx::query_as(&query).fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn replace_account_configs(&self, configs: &[NewAccountConfig]) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM {}", account_configs::TABLE))
            .execute(&mut *tx)
            .await?;

        let insert = format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5)",
            account_configs::TABLE,
            column_list(&account_configs::INSERT_COLUMNS)
        );
        let mut inserted = 0;
        for (index, config) in configs.iter().enumerate() {
            inserted += sqlx::query(&insert)
            .bind(index as i64 + 1)
            .bind(&config.account_name)
            .bind(&config.account_group)
            .bind(&config.status_filter)
            .bind(&config.region_filter)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn clear_listing_markers(&self) -> Result<u64, AppError> {
        let query = format!(
            "UPDATE {table} SET {marker} = NULL WHERE {marker} IS NOT NULL",
            table = account_configs::TABLE,
            marker = account_configs::LISTING_MARKER
        );
        let result = sqlx::query(&query).execute(&self.pool).await?;

        Ok(result.rows_affected())
    }

    async fn retention_weeks(&self) -> Result<Option<i64>, AppError> {
        let weeks: Option<Option<i64>> =
            sqlx::query_scalar("SELECT retention_weeks FROM harvest_settings WHERE id")
                .fetch_optional(&self.pool)
                .await?;

        Ok(weeks.flatten())
    }

    async fn set_retention_weeks(&self, weeks: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO harvest_settings (id, retention_weeks)
            VALUES (TRUE, $1)
            ON CONFLICT (id) DO UPDATE SET retention_weeks = EXCLUDED.retention_weeks
            "#,
        )
        .bind(weeks)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_locations(&self) -> Result<Vec<Location>, AppError> {
        let query = format!(
            "SELECT {} FROM {} ORDER BY {}",
            column_list(&locations::COLUMNS),
            locations::TABLE,
            locations::ID
        );
        let rows: Vec<LocationRow> = sqlx::query_as(&query).fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn commit_listing(
        &self,
        position: i64,
        new_locations: &[NewLocation],
        marker: &Marker,
    ) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_locations(&mut *tx, new_locations).await?;

        let query = format!(
            "UPDATE {} SET {} = $2 WHERE {} = $1",
            account_configs::TABLE,
            account_configs::LISTING_MARKER,
            account_configs::POSITION
        );
        sqlx::query(&query)
            .bind(position)
            .bind(marker.to_stored())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(inserted)
    }

    async fn clear_locations(&self) -> Result<u64, AppError> {
        let result = sqlx::query(&format!("DELETE FROM {}", locations::TABLE))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn set_location_markers(&self, ids: &[i64], marker: &Marker) -> Result<u64, AppError> {
        let mut conn = self.pool.acquire().await?;
        update_location_markers(&mut *conn, ids, marker).await
    }

    async fn clear_location_markers(&self) -> Result<u64, AppError> {
        let query = format!(
            "UPDATE {table} SET {marker} = NULL WHERE {marker} IS NOT NULL",
            table = locations::TABLE,
            marker = locations::INSIGHTS_MARKER
        );
        let result = sqlx::query(&query).execute(&self.pool).await?;

        Ok(result.rows_affected())
    }

    async fn commit_batch(
        &self,
        records: &[InsightRecord],
        ids: &[i64],
        marker: &Marker,
    ) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_insights(&mut *tx, records).await?;
        update_location_markers(&mut *tx, ids, marker).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn clear_insights(&self) -> Result<u64, AppError> {
        let result = sqlx::query(&format!("DELETE FROM {}", insights::TABLE))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn oldest_insight_week(&self) -> Result<Option<NaiveDate>, AppError> {
        let oldest: Option<NaiveDate> = sqlx::query_scalar("SELECT MIN(start_week) FROM insights")
            .fetch_one(&self.pool)
            .await?;

        Ok(oldest)
    }

    async fn delete_insights_for_week(&self, start_week: NaiveDate) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM insights WHERE start_week = $1")
            .bind(start_week)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn append_log(&self, message: &str) -> Result<(), AppError> {
        sqlx::query("INSERT INTO audit_log (message) VALUES ($1)")
            .bind(message)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn trim_log(&self, max_rows: usize) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM audit_log
            WHERE id NOT IN (
                SELECT id FROM audit_log
                ORDER BY id DESC
                LIMIT $1
            )
            "#,
        )
        .bind(max_rows as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<LogEntry>, AppError> {
        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT id, logged_at, message FROM audit_log ORDER BY id DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn stats(&self) -> Result<StoreStats, AppError> {
        let row: StatsRow = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM accounts) AS accounts,
                (SELECT COUNT(*) FROM account_configs) AS account_configs,
                (SELECT COUNT(*) FROM locations) AS locations,
                (SELECT COUNT(*) FROM locations WHERE insights_marker LIKE 'd-%') AS caught_locations,
                (SELECT COUNT(*) FROM insights) AS insights,
                (SELECT COUNT(*) FROM audit_log) AS log_entries
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            accounts: row.accounts.unwrap_or(0),
            account_configs: row.account_configs.unwrap_or(0),
            locations: row.locations.unwrap_or(0),
            caught_locations: row.caught_locations.unwrap_or(0),
            insights: row.insights.unwrap_or(0),
            log_entries: row.log_entries.unwrap_or(0),
        })
    }
}
