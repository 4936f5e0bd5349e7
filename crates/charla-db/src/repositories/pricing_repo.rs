//! Pricing configuration repository implementation
//!
//! The pricing config is a singleton row; every admin save bumps the
//! version so settled sessions can be traced to the rates they ran under.

use charla_core::{models::PricingConfig, traits::PricingRepository, AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of PricingRepository
pub struct PgPricingRepository {
    pool: PgPool,
}

impl PgPricingRepository {
    /// Create a new pricing repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PRICING_SELECT_COLUMNS: &str = r#"
    version,
    standard_audio_rate, standard_video_rate,
    premium_audio_rate, premium_video_rate,
    message_rate,
    default_commission_pct, tier_a_commission_pct, tier_b_commission_pct,
    coin_to_currency_ratio,
    updated_at
"#;

#[async_trait]
impl PricingRepository for PgPricingRepository {
    #[instrument(skip(self))]
    async fn load(&self) -> AppResult<Option<PricingConfig>> {
        debug!("Loading pricing config");

        let query = format!(
            "SELECT {} FROM pricing_config WHERE id = 1",
            PRICING_SELECT_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, PricingRow>(&query)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error loading pricing config: {}", e);
                AppError::Database(format!("Failed to load pricing config: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, config))]
    async fn save(&self, config: &PricingConfig) -> AppResult<PricingConfig> {
        debug!("Saving pricing config");

        let query = format!(
            r#"
            INSERT INTO pricing_config (
                id, version,
                standard_audio_rate, standard_video_rate,
                premium_audio_rate, premium_video_rate,
                message_rate,
                default_commission_pct, tier_a_commission_pct, tier_b_commission_pct,
                coin_to_currency_ratio,
                updated_at
            )
            VALUES (1, 1, $1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (id) DO UPDATE
            SET version = pricing_config.version + 1,
                standard_audio_rate = EXCLUDED.standard_audio_rate,
                standard_video_rate = EXCLUDED.standard_video_rate,
                premium_audio_rate = EXCLUDED.premium_audio_rate,
                premium_video_rate = EXCLUDED.premium_video_rate,
                message_rate = EXCLUDED.message_rate,
                default_commission_pct = EXCLUDED.default_commission_pct,
                tier_a_commission_pct = EXCLUDED.tier_a_commission_pct,
                tier_b_commission_pct = EXCLUDED.tier_b_commission_pct,
                coin_to_currency_ratio = EXCLUDED.coin_to_currency_ratio,
                updated_at = NOW()
            RETURNING {}
            "#,
            PRICING_SELECT_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, PricingRow>(&query)
            .bind(config.standard_audio_rate)
            .bind(config.standard_video_rate)
            .bind(config.premium_audio_rate)
            .bind(config.premium_video_rate)
            .bind(config.message_rate)
            .bind(config.default_commission_pct)
            .bind(config.tier_a_commission_pct)
            .bind(config.tier_b_commission_pct)
            .bind(config.coin_to_currency_ratio)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error saving pricing config: {}", e);
                AppError::Database(format!("Failed to save pricing config: {}", e))
            })?;

        Ok(row.into())
    }
}

/// Helper struct for pricing row mapping
#[derive(Debug, sqlx::FromRow)]
struct PricingRow {
    version: i32,
    standard_audio_rate: Decimal,
    standard_video_rate: Decimal,
    premium_audio_rate: Decimal,
    premium_video_rate: Decimal,
    message_rate: Decimal,
    default_commission_pct: Decimal,
    tier_a_commission_pct: Decimal,
    tier_b_commission_pct: Decimal,
    coin_to_currency_ratio: Decimal,
    updated_at: DateTime<Utc>,
}

impl From<PricingRow> for PricingConfig {
    fn from(row: PricingRow) -> Self {
        Self {
            version: row.version,
            standard_audio_rate: row.standard_audio_rate,
            standard_video_rate: row.standard_video_rate,
            premium_audio_rate: row.premium_audio_rate,
            premium_video_rate: row.premium_video_rate,
            message_rate: row.message_rate,
            default_commission_pct: row.default_commission_pct,
            tier_a_commission_pct: row.tier_a_commission_pct,
            tier_b_commission_pct: row.tier_b_commission_pct,
            coin_to_currency_ratio: row.coin_to_currency_ratio,
            updated_at: row.updated_at,
        }
    }
}
