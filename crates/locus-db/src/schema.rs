//! Table definitions and schema bootstrap.
//!
//! Column names mirror the constants in [`locus_core::schema`].

use sqlx::PgPool;
use tracing::debug;

use locus_core::error::AppError;

/// DDL statements, applied in order.
/// Each statement must be executed separately due to sqlx limitations.
pub const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS accounts (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        account_name TEXT NOT NULL,
        account_type TEXT,
        role TEXT,
        permission_level TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS account_configs (
        position BIGINT PRIMARY KEY,
        account_name TEXT NOT NULL,
        account_group TEXT NOT NULL,
        status_filter TEXT,
        region_filter TEXT,
        listing_marker TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS harvest_settings (
        id BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (id),
        retention_weeks BIGINT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS locations (
        id BIGSERIAL PRIMARY KEY,
        account TEXT NOT NULL,
        name TEXT NOT NULL,
        title TEXT NOT NULL,
        store_code TEXT NOT NULL,
        status TEXT NOT NULL,
        region TEXT NOT NULL,
        category TEXT NOT NULL,
        insights_marker TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS insights (
        id BIGSERIAL PRIMARY KEY,
        account TEXT NOT NULL,
        location_title TEXT NOT NULL,
        store_code TEXT NOT NULL,
        region TEXT NOT NULL,
        status TEXT NOT NULL,
        category TEXT NOT NULL,
        time_zone TEXT,
        queries_direct BIGINT,
        queries_indirect BIGINT,
        queries_chain BIGINT,
        views_maps BIGINT,
        views_search BIGINT,
        actions_website BIGINT,
        actions_phone BIGINT,
        actions_driving_directions BIGINT,
        photos_views_merchant BIGINT,
        photos_views_customers BIGINT,
        photos_count_merchant BIGINT,
        photos_count_customers BIGINT,
        local_post_views_search BIGINT,
        local_post_actions_call_to_action BIGINT,
        start_week DATE NOT NULL,
        end_week DATE NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_insights_start_week ON insights(start_week)",
    r#"CREATE TABLE IF NOT EXISTS audit_log (
        id BIGSERIAL PRIMARY KEY,
        logged_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        message TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS triggers (
        name TEXT PRIMARY KEY,
        cadence JSONB NOT NULL,
        next_run_at TIMESTAMPTZ NOT NULL,
        armed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        last_run_at TIMESTAMPTZ
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_triggers_next_run ON triggers(next_run_at)",
];

/// Creates any missing tables. Safe to run on every startup.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), AppError> {
    for statement in MIGRATIONS {
        sqlx::query(statement).execute(pool).await?;
    }
    debug!(statements = MIGRATIONS.len(), "Schema ensured");
    Ok(())
}
