//! Call session repository implementation
//!
//! PostgreSQL-backed storage for call sessions. Status mutation happens
//! through conditional UPDATE statements so that every transition is a
//! single compare-and-set: a session already in a terminal state matches
//! no row, and the caller reads the winning row back instead. Uses
//! runtime queries (not compile-time macros) to avoid requiring a
//! database connection at build time.

use charla_core::{
    models::{CallClass, CallSession, CallStatus, CommissionKind, EndReason},
    traits::{ConnectParams, SessionRepository, SettlementTotals, TransitionOutcome},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of SessionRepository
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    /// Create a new session repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, call_id: &str) -> AppResult<Option<CallSession>> {
        let query = format!(
            "SELECT {} FROM call_sessions WHERE call_id = $1",
            SESSION_SELECT_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(call_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding session {}: {}", call_id, e);
                AppError::Database(format!("Failed to find session: {}", e))
            })?;

        Ok(row.map(Into::into))
    }
}

const SESSION_SELECT_COLUMNS: &str = r#"
    call_id, caller_id, receiver_id, call_class, status,
    rate_per_minute, commission_pct, commission_kind, pricing_version,
    started_at, connected_at, ended_at,
    elapsed_minutes, max_allowed_minutes,
    total_coins_charged, commission_coins, receiver_earnings_coins,
    payment_settled, end_reason,
    created_at, updated_at
"#;

#[async_trait]
impl SessionRepository for PgSessionRepository {
    #[instrument(skip(self, session))]
    async fn create(&self, session: &CallSession) -> AppResult<CallSession> {
        debug!("Creating session {}", session.call_id);

        let query = format!(
            r#"
            INSERT INTO call_sessions (
                call_id, caller_id, receiver_id, call_class, status,
                rate_per_minute, commission_pct, commission_kind, pricing_version,
                started_at, elapsed_minutes,
                total_coins_charged, commission_coins, receiver_earnings_coins,
                payment_settled, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {}
            "#,
            SESSION_SELECT_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(&session.call_id)
            .bind(session.caller_id)
            .bind(session.receiver_id)
            .bind(session.call_class.to_string())
            .bind(session.status.to_string())
            .bind(session.rate_per_minute)
            .bind(session.commission_pct)
            .bind(session.commission_kind.to_string())
            .bind(session.pricing_version)
            .bind(session.started_at)
            .bind(session.elapsed_minutes)
            .bind(session.total_coins_charged)
            .bind(session.commission_coins)
            .bind(session.receiver_earnings_coins)
            .bind(session.payment_settled)
            .bind(session.created_at)
            .bind(session.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating session {}: {}", session.call_id, e);
                AppError::Database(format!("Failed to create session: {}", e))
            })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_call_id(&self, call_id: &str) -> AppResult<Option<CallSession>> {
        debug!("Finding session {}", call_id);
        self.fetch(call_id).await
    }

    #[instrument(skip(self, params))]
    async fn mark_connected(
        &self,
        call_id: &str,
        params: ConnectParams,
    ) -> AppResult<Option<CallSession>> {
        debug!("CAS initiated -> connected for session {}", call_id);

        let query = format!(
            r#"
            UPDATE call_sessions
            SET status = 'connected',
                connected_at = $2,
                max_allowed_minutes = $3,
                updated_at = NOW()
            WHERE call_id = $1
              AND status = 'initiated'
            RETURNING {}
            "#,
            SESSION_SELECT_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(call_id)
            .bind(params.connected_at)
            .bind(params.max_allowed_minutes)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error connecting session {}: {}", call_id, e);
                AppError::Database(format!("Failed to connect session: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn update_elapsed(&self, call_id: &str, elapsed_minutes: Decimal) -> AppResult<()> {
        // GREATEST keeps elapsed monotonically non-decreasing even if a
        // stale tick lands after a fresher one
        sqlx::query(
            r#"
            UPDATE call_sessions
            SET elapsed_minutes = GREATEST(elapsed_minutes, $2),
                updated_at = NOW()
            WHERE call_id = $1
              AND status = 'connected'
            "#,
        )
        .bind(call_id)
        .bind(elapsed_minutes)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating elapsed for {}: {}", call_id, e);
            AppError::Database(format!("Failed to update elapsed: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn finish(
        &self,
        call_id: &str,
        from: CallStatus,
        status: CallStatus,
        reason: EndReason,
        ended_at: DateTime<Utc>,
        elapsed_minutes: Decimal,
    ) -> AppResult<TransitionOutcome> {
        debug!(
            "CAS terminal transition for session {}: {} -> {} ({})",
            call_id, from, status, reason
        );

        let query = format!(
            r#"
            UPDATE call_sessions
            SET status = $2,
                end_reason = $3,
                ended_at = $4,
                elapsed_minutes = GREATEST(elapsed_minutes, $5),
                updated_at = NOW()
            WHERE call_id = $1
              AND status = $6
            RETURNING {}
            "#,
            SESSION_SELECT_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(call_id)
            .bind(status.to_string())
            .bind(reason.to_string())
            .bind(ended_at)
            .bind(elapsed_minutes)
            .bind(from.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finishing session {}: {}", call_id, e);
                AppError::Database(format!("Failed to finish session: {}", e))
            })?;

        match row {
            Some(row) => Ok(TransitionOutcome::Won(row.into())),
            None => {
                // Lost the race: read back whoever won
                let existing = self
                    .fetch(call_id)
                    .await?
                    .ok_or_else(|| AppError::SessionNotFound(call_id.to_string()))?;
                if existing.is_terminal() {
                    Ok(TransitionOutcome::AlreadyTerminal(existing))
                } else {
                    Err(AppError::InvalidTransition {
                        call_id: call_id.to_string(),
                        status: existing.status.to_string(),
                    })
                }
            }
        }
    }

    #[instrument(skip(self, totals))]
    async fn record_settlement(
        &self,
        call_id: &str,
        totals: SettlementTotals,
    ) -> AppResult<bool> {
        debug!("CAS payment_settled for session {}", call_id);

        let result = sqlx::query(
            r#"
            UPDATE call_sessions
            SET payment_settled = TRUE,
                total_coins_charged = $2,
                commission_coins = $3,
                receiver_earnings_coins = $4,
                updated_at = NOW()
            WHERE call_id = $1
              AND payment_settled = FALSE
            "#,
        )
        .bind(call_id)
        .bind(totals.total_coins_charged)
        .bind(totals.commission_coins)
        .bind(totals.receiver_earnings_coins)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error recording settlement for {}: {}", call_id, e);
            AppError::Database(format!("Failed to record settlement: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn list_terminated_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<CallSession>> {
        let query = format!(
            r#"
            SELECT {}
            FROM call_sessions
            WHERE (caller_id = $1 OR receiver_id = $1)
              AND status IN ('ended', 'failed')
            ORDER BY started_at DESC
            LIMIT $2 OFFSET $3
            "#,
            SESSION_SELECT_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, SessionRow>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing sessions for user {}: {}", user_id, e);
                AppError::Database(format!("Failed to list sessions: {}", e))
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for session row mapping
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    call_id: String,
    caller_id: i64,
    receiver_id: i64,
    call_class: String,
    status: String,
    rate_per_minute: Decimal,
    commission_pct: Decimal,
    commission_kind: String,
    pricing_version: i32,
    started_at: DateTime<Utc>,
    connected_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    elapsed_minutes: Decimal,
    max_allowed_minutes: Option<Decimal>,
    total_coins_charged: Decimal,
    commission_coins: Decimal,
    receiver_earnings_coins: Decimal,
    payment_settled: bool,
    end_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SessionRow> for CallSession {
    fn from(row: SessionRow) -> Self {
        Self {
            call_id: row.call_id,
            caller_id: row.caller_id,
            receiver_id: row.receiver_id,
            call_class: CallClass::from_str(&row.call_class).unwrap_or(CallClass::Audio),
            status: CallStatus::from_str(&row.status).unwrap_or(CallStatus::Failed),
            rate_per_minute: row.rate_per_minute,
            commission_pct: row.commission_pct,
            commission_kind: CommissionKind::from_str(&row.commission_kind)
                .unwrap_or(CommissionKind::None),
            pricing_version: row.pricing_version,
            started_at: row.started_at,
            connected_at: row.connected_at,
            ended_at: row.ended_at,
            elapsed_minutes: row.elapsed_minutes,
            max_allowed_minutes: row.max_allowed_minutes,
            total_coins_charged: row.total_coins_charged,
            commission_coins: row.commission_coins,
            receiver_earnings_coins: row.receiver_earnings_coins,
            payment_settled: row.payment_settled,
            end_reason: row.end_reason.as_deref().and_then(EndReason::from_str),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
