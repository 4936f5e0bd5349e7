//! Wallet ledger repository implementation
//!
//! PostgreSQL-backed wallet storage: a `wallets` balance table plus the
//! append-only `wallet_ledger` table. Appends run in one transaction with
//! the affected wallet rows locked in user-id order, and every insert is
//! keyed on `idempotency_key` so settlement replays are no-ops.

use charla_core::{
    models::{LedgerEntry, LedgerEntryKind},
    traits::WalletRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of WalletRepository
pub struct PgWalletRepository {
    pool: PgPool,
}

impl PgWalletRepository {
    /// Create a new wallet repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const LEDGER_SELECT_COLUMNS: &str = r#"
    id, user_id, kind, amount, related_call_id, idempotency_key, created_at
"#;

#[async_trait]
impl WalletRepository for PgWalletRepository {
    #[instrument(skip(self))]
    async fn balance(&self, user_id: i64) -> AppResult<Decimal> {
        let row: Option<(Decimal,)> =
            sqlx::query_as("SELECT balance FROM wallets WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error reading balance for {}: {}", user_id, e);
                    AppError::Database(format!("Failed to read balance: {}", e))
                })?;

        Ok(row.map(|(b,)| b).unwrap_or(Decimal::ZERO))
    }

    #[instrument(skip(self, entries))]
    async fn append(&self, entries: &[LedgerEntry]) -> AppResult<u64> {
        if entries.is_empty() {
            return Ok(0);
        }

        debug!("Appending {} ledger entries", entries.len());

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        // Lock affected wallets in user-id order to serialize concurrent
        // settlements touching the same users without deadlocking
        let mut user_ids: Vec<i64> = entries.iter().map(|e| e.user_id).collect();
        user_ids.sort_unstable();
        user_ids.dedup();

        for user_id in &user_ids {
            sqlx::query(
                r#"
                INSERT INTO wallets (user_id, balance, updated_at)
                VALUES ($1, 0, NOW())
                ON CONFLICT (user_id) DO NOTHING
                "#,
            )
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(format!("Failed to ensure wallet: {}", e)))?;

            sqlx::query("SELECT balance FROM wallets WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    error!("Failed to lock wallet {}: {}", user_id, e);
                    AppError::Database(format!("Failed to lock wallet: {}", e))
                })?;
        }

        let mut inserted = 0u64;

        for entry in entries {
            let result = sqlx::query(
                r#"
                INSERT INTO wallet_ledger (
                    user_id, kind, amount, related_call_id, idempotency_key, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (idempotency_key) DO NOTHING
                "#,
            )
            .bind(entry.user_id)
            .bind(entry.kind.to_string())
            .bind(entry.amount)
            .bind(&entry.related_call_id)
            .bind(&entry.idempotency_key)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to insert ledger entry: {}", e);
                AppError::Database(format!("Failed to insert ledger entry: {}", e))
            })?;

            // Balance moves only when the entry was actually new;
            // replayed entries must not double-apply
            if result.rows_affected() > 0 {
                inserted += 1;

                sqlx::query(
                    r#"
                    UPDATE wallets
                    SET balance = balance + $2,
                        updated_at = NOW()
                    WHERE user_id = $1
                    "#,
                )
                .bind(entry.user_id)
                .bind(entry.signed_amount())
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    error!("Failed to apply balance delta: {}", e);
                    AppError::Database(format!("Failed to apply balance delta: {}", e))
                })?;
            }
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit ledger append: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        debug!("Appended {} new ledger entries", inserted);

        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn entries_for_call(&self, call_id: &str) -> AppResult<Vec<LedgerEntry>> {
        let query = format!(
            "SELECT {} FROM wallet_ledger WHERE related_call_id = $1 ORDER BY id",
            LEDGER_SELECT_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, LedgerRow>(&query)
            .bind(call_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing ledger for call {}: {}", call_id, e);
                AppError::Database(format!("Failed to list ledger entries: {}", e))
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn entries_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<LedgerEntry>> {
        let query = format!(
            r#"
            SELECT {}
            FROM wallet_ledger
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            LEDGER_SELECT_COLUMNS
        );

        let rows = sqlx::query_as::<sqlx::Postgres, LedgerRow>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing ledger for user {}: {}", user_id, e);
                AppError::Database(format!("Failed to list ledger entries: {}", e))
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Helper struct for ledger row mapping
#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: i64,
    user_id: i64,
    kind: String,
    amount: Decimal,
    related_call_id: String,
    idempotency_key: String,
    created_at: DateTime<Utc>,
}

impl From<LedgerRow> for LedgerEntry {
    fn from(row: LedgerRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            kind: LedgerEntryKind::from_str(&row.kind).unwrap_or(LedgerEntryKind::CallPayment),
            amount: row.amount,
            related_call_id: row.related_call_id,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
        }
    }
}
