//! Trigger repository for PostgreSQL with SELECT FOR UPDATE SKIP LOCKED.
//!
//! Implements the [`TriggerScheduler`] trait. Each trigger name owns at most
//! one row; claiming locks the most overdue row, advances it past `now` and
//! commits before the handler runs, so concurrent workers never fire the same
//! trigger twice.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};
use tracing::debug;

use locus_core::error::AppError;
use locus_core::scheduler::TriggerScheduler;
use locus_core::trigger::{ArmedTrigger, Cadence, Trigger};

/// PostgreSQL implementation of the trigger scheduler.
#[derive(Clone)]
pub struct TriggerRepository {
    pool: Pool<Postgres>,
}

impl TriggerRepository {
    /// Create a new trigger repository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// =============================================================================
// Helper Types for Database Mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct TriggerRow {
    name: String,
    cadence: Json<Cadence>,
    next_run_at: DateTime<Utc>,
    armed_at: DateTime<Utc>,
    last_run_at: Option<DateTime<Utc>>,
}

impl TryFrom<TriggerRow> for ArmedTrigger {
    type Error = AppError;

    fn try_from(row: TriggerRow) -> Result<Self, Self::Error> {
        let trigger = row
            .name
            .parse::<Trigger>()
            .map_err(|e| AppError::Generic(e.to_string()))?;

        Ok(Self {
            trigger,
            cadence: row.cadence.0,
            next_run_at: row.next_run_at,
            armed_at: row.armed_at,
            last_run_at: row.last_run_at,
        })
    }
}

// =============================================================================
// TriggerScheduler Trait Implementation
// =============================================================================

impl TriggerScheduler for TriggerRepository {
    async fn arm(
        &self,
        trigger: Trigger,
        cadence: Cadence,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO triggers (name, cadence, next_run_at, armed_at, last_run_at)
            VALUES ($1, $2, $3, NOW(), NULL)
            ON CONFLICT (name) DO UPDATE SET
                cadence = EXCLUDED.cadence,
                next_run_at = EXCLUDED.next_run_at,
                armed_at = NOW(),
                last_run_at = NULL
            "#,
        )
        .bind(trigger.as_str())
        .bind(Json(cadence))
        .bind(next_run_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn disarm(&self, trigger: Trigger) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM triggers WHERE name = $1")
            .bind(trigger.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn disarm_all(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM triggers")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn armed(&self) -> Result<Vec<ArmedTrigger>, AppError> {
        let rows: Vec<TriggerRow> = sqlx::query_as(
            r#"
            SELECT name, cadence, next_run_at, armed_at, last_run_at
            FROM triggers
            ORDER BY next_run_at ASC, name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Option<ArmedTrigger>, AppError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<TriggerRow> = sqlx::query_as(
            r#"
            SELECT name, cadence, next_run_at, armed_at, last_run_at
            FROM triggers
            WHERE next_run_at <= $1
            ORDER BY next_run_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#,
        )
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let armed = ArmedTrigger::try_from(row)?;
        let next_run_at = armed.cadence.next_after(now);

        sqlx::query("UPDATE triggers SET next_run_at = $2, last_run_at = $3 WHERE name = $1")
            .bind(armed.trigger.as_str())
            .bind(next_run_at)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(trigger = %armed.trigger, %next_run_at, "Trigger advanced");
        Ok(Some(armed))
    }
}
