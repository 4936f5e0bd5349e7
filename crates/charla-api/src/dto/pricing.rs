//! Pricing configuration DTOs

use charla_core::models::PricingConfig;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Pricing config update request
///
/// Range validation happens on the domain model; the resolver and the
/// admin write path share the same rules.
#[derive(Debug, Clone, Deserialize)]
pub struct PricingUpdateRequest {
    /// Coins per minute for standard-tier audio calls
    pub standard_audio_rate: Decimal,

    /// Coins per minute for standard-tier video calls
    pub standard_video_rate: Decimal,

    /// Coins per minute for premium-tier audio calls
    pub premium_audio_rate: Decimal,

    /// Coins per minute for premium-tier video calls
    pub premium_video_rate: Decimal,

    /// Coins per message
    pub message_rate: Decimal,

    /// Default commission percentage (0-100)
    pub default_commission_pct: Decimal,

    /// Tier A commission percentage (0-100)
    pub tier_a_commission_pct: Decimal,

    /// Tier B commission percentage (0-100)
    pub tier_b_commission_pct: Decimal,

    /// Coins per currency unit
    pub coin_to_currency_ratio: Decimal,
}

impl PricingUpdateRequest {
    /// Convert to the domain config; the store assigns the version
    pub fn to_config(&self) -> PricingConfig {
        PricingConfig {
            version: 0,
            standard_audio_rate: self.standard_audio_rate,
            standard_video_rate: self.standard_video_rate,
            premium_audio_rate: self.premium_audio_rate,
            premium_video_rate: self.premium_video_rate,
            message_rate: self.message_rate,
            default_commission_pct: self.default_commission_pct,
            tier_a_commission_pct: self.tier_a_commission_pct,
            tier_b_commission_pct: self.tier_b_commission_pct,
            coin_to_currency_ratio: self.coin_to_currency_ratio,
            updated_at: Utc::now(),
        }
    }
}

/// Pricing config response
#[derive(Debug, Clone, Serialize)]
pub struct PricingResponse {
    /// Config version
    pub version: i32,

    /// Coins per minute for standard-tier audio calls
    pub standard_audio_rate: Decimal,

    /// Coins per minute for standard-tier video calls
    pub standard_video_rate: Decimal,

    /// Coins per minute for premium-tier audio calls
    pub premium_audio_rate: Decimal,

    /// Coins per minute for premium-tier video calls
    pub premium_video_rate: Decimal,

    /// Coins per message
    pub message_rate: Decimal,

    /// Default commission percentage
    pub default_commission_pct: Decimal,

    /// Tier A commission percentage
    pub tier_a_commission_pct: Decimal,

    /// Tier B commission percentage
    pub tier_b_commission_pct: Decimal,

    /// Coins per currency unit
    pub coin_to_currency_ratio: Decimal,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl From<PricingConfig> for PricingResponse {
    fn from(config: PricingConfig) -> Self {
        Self {
            version: config.version,
            standard_audio_rate: config.standard_audio_rate,
            standard_video_rate: config.standard_video_rate,
            premium_audio_rate: config.premium_audio_rate,
            premium_video_rate: config.premium_video_rate,
            message_rate: config.message_rate,
            default_commission_pct: config.default_commission_pct,
            tier_a_commission_pct: config.tier_a_commission_pct,
            tier_b_commission_pct: config.tier_b_commission_pct,
            coin_to_currency_ratio: config.coin_to_currency_ratio,
            updated_at: config.updated_at,
        }
    }
}
