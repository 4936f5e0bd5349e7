//! Missed call record repository implementation
//!
//! Append-only side records for sessions that never connected. Inserts
//! are keyed on `call_id` so a replayed recorder call cannot duplicate a
//! notification.

use charla_core::{
    models::{EndReason, MissedCallRecord},
    traits::MissedCallRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of MissedCallRepository
pub struct PgMissedCallRepository {
    pool: PgPool,
}

impl PgMissedCallRepository {
    /// Create a new missed call repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const MISSED_CALL_SELECT_COLUMNS: &str = r#"
    id, call_id, caller_id, receiver_id, reason, viewed, created_at
"#;

#[async_trait]
impl MissedCallRepository for PgMissedCallRepository {
    #[instrument(skip(self, record))]
    async fn insert(&self, record: &MissedCallRecord) -> AppResult<MissedCallRecord> {
        debug!("Recording missed call {}", record.call_id);

        let query = format!(
            r#"
            INSERT INTO missed_calls (call_id, caller_id, receiver_id, reason, viewed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (call_id) DO UPDATE SET call_id = EXCLUDED.call_id
            RETURNING {}
            "#,
            MISSED_CALL_SELECT_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, MissedCallRow>(&query)
            .bind(&record.call_id)
            .bind(record.caller_id)
            .bind(record.receiver_id)
            .bind(record.reason.to_string())
            .bind(record.viewed)
            .bind(record.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error recording missed call: {}", e);
                AppError::Database(format!("Failed to record missed call: {}", e))
            })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn list_unviewed(&self, receiver_id: i64, limit: i64) -> AppResult<Vec<MissedCallRecord>> {
        let query = format!(
            r#"
            SELECT {}
            FROM missed_calls
            WHERE receiver_id = $1 AND viewed = FALSE
            ORDER BY created_at DESC
            LIMIT $2
            "#,
            MISSED_CALL_SELECT_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, MissedCallRow>(&query)
            .bind(receiver_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!(
                    "Database error listing missed calls for {}: {}",
                    receiver_id, e
                );
                AppError::Database(format!("Failed to list missed calls: {}", e))
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn mark_viewed(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("UPDATE missed_calls SET viewed = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error marking missed call {} viewed: {}", id, e);
                AppError::Database(format!("Failed to mark missed call viewed: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

/// Helper struct for missed call row mapping
#[derive(Debug, sqlx::FromRow)]
struct MissedCallRow {
    id: i64,
    call_id: String,
    caller_id: i64,
    receiver_id: i64,
    reason: String,
    viewed: bool,
    created_at: DateTime<Utc>,
}

impl From<MissedCallRow> for MissedCallRecord {
    fn from(row: MissedCallRow) -> Self {
        Self {
            id: row.id,
            call_id: row.call_id,
            caller_id: row.caller_id,
            receiver_id: row.receiver_id,
            reason: EndReason::from_str(&row.reason).unwrap_or(EndReason::NoAnswer),
            viewed: row.viewed,
            created_at: row.created_at,
        }
    }
}
