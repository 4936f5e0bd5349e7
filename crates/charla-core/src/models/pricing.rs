//! Pricing configuration model
//!
//! Holds the per-minute coin rates, the flat message rate, and the
//! commission percentages used by every billing decision. The config is a
//! versioned snapshot: sessions capture their rate and commission at start
//! and never re-read it, so admin edits cannot retroactively change an
//! in-progress bill.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Call classification for rate resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallClass {
    /// Audio call, billed per minute
    Audio,
    /// Video call, billed per minute
    Video,
    /// Message, billed at a flat rate per message
    Message,
}

impl fmt::Display for CallClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallClass::Audio => write!(f, "audio"),
            CallClass::Video => write!(f, "video"),
            CallClass::Message => write!(f, "message"),
        }
    }
}

impl CallClass {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "audio" => Some(CallClass::Audio),
            "video" => Some(CallClass::Video),
            "message" => Some(CallClass::Message),
            _ => None,
        }
    }

    /// Per-minute classes are metered; messages are one-shot
    pub fn is_metered(&self) -> bool {
        !matches!(self, CallClass::Message)
    }
}

/// Receiver classification affecting both rate and commission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverTier {
    /// Standard receiver, default commission
    #[default]
    Standard,
    /// Premium tier A receiver
    TierA,
    /// Premium tier B receiver
    TierB,
}

impl fmt::Display for ReceiverTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverTier::Standard => write!(f, "standard"),
            ReceiverTier::TierA => write!(f, "tier_a"),
            ReceiverTier::TierB => write!(f, "tier_b"),
        }
    }
}

impl ReceiverTier {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "standard" => Some(ReceiverTier::Standard),
            "tier_a" => Some(ReceiverTier::TierA),
            "tier_b" => Some(ReceiverTier::TierB),
            _ => None,
        }
    }

    /// Premium tiers are billed at the premium rate columns
    pub fn is_premium(&self) -> bool {
        !matches!(self, ReceiverTier::Standard)
    }
}

/// Which commission bucket a session settles under
///
/// `None` marks a non-payable caller/receiver combination: the session is
/// metered for duration only and no coins move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommissionKind {
    /// Non-payable combination, zero coin movement
    #[default]
    None,
    /// Default commission percentage
    Default,
    /// Tier A commission percentage
    TierA,
    /// Tier B commission percentage
    TierB,
}

impl fmt::Display for CommissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommissionKind::None => write!(f, "none"),
            CommissionKind::Default => write!(f, "default"),
            CommissionKind::TierA => write!(f, "tier_a"),
            CommissionKind::TierB => write!(f, "tier_b"),
        }
    }
}

impl CommissionKind {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(CommissionKind::None),
            "default" => Some(CommissionKind::Default),
            "tier_a" => Some(CommissionKind::TierA),
            "tier_b" => Some(CommissionKind::TierB),
            _ => None,
        }
    }

    /// Check whether any coins move under this kind
    #[inline]
    pub fn is_payable(&self) -> bool {
        !matches!(self, CommissionKind::None)
    }
}

/// Pricing configuration snapshot
///
/// Singleton, admin-editable. `version` is bumped on every admin save so
/// that settled sessions can be traced back to the rates they ran under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Monotonically increasing config version
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

    /// Default commission percentage (0-100)
    pub default_commission_pct: Decimal,

    /// Tier A commission percentage (0-100)
    pub tier_a_commission_pct: Decimal,

    /// Tier B commission percentage (0-100)
    pub tier_b_commission_pct: Decimal,

    /// Coins per currency unit, used for payout conversion
    pub coin_to_currency_ratio: Decimal,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl PricingConfig {
    /// Validate rate and percentage ranges
    ///
    /// Billing must never proceed against undefined or out-of-range rates,
    /// so both the admin write path and the resolver call this.
    pub fn validate(&self) -> Result<(), AppError> {
        let rates = [
            ("standard_audio_rate", self.standard_audio_rate),
            ("standard_video_rate", self.standard_video_rate),
            ("premium_audio_rate", self.premium_audio_rate),
            ("premium_video_rate", self.premium_video_rate),
            ("message_rate", self.message_rate),
        ];
        for (name, rate) in rates {
            if rate < Decimal::ZERO {
                return Err(AppError::Validation(format!(
                    "{} must be >= 0, got {}",
                    name, rate
                )));
            }
        }

        let pcts = [
            ("default_commission_pct", self.default_commission_pct),
            ("tier_a_commission_pct", self.tier_a_commission_pct),
            ("tier_b_commission_pct", self.tier_b_commission_pct),
        ];
        for (name, pct) in pcts {
            if pct < Decimal::ZERO || pct > Decimal::from(100) {
                return Err(AppError::Validation(format!(
                    "{} must be in [0, 100], got {}",
                    name, pct
                )));
            }
        }

        if self.coin_to_currency_ratio < Decimal::ONE {
            return Err(AppError::Validation(format!(
                "coin_to_currency_ratio must be >= 1, got {}",
                self.coin_to_currency_ratio
            )));
        }

        Ok(())
    }

    /// Resolve the rate for a call class and receiver tier
    ///
    /// Standard tier uses the standard rate columns; both premium tiers use
    /// the premium columns (they differ in commission, not rate). Messages
    /// resolve the flat per-message rate regardless of tier.
    pub fn rate_for(&self, class: CallClass, tier: ReceiverTier) -> Decimal {
        match (class, tier.is_premium()) {
            (CallClass::Audio, false) => self.standard_audio_rate,
            (CallClass::Audio, true) => self.premium_audio_rate,
            (CallClass::Video, false) => self.standard_video_rate,
            (CallClass::Video, true) => self.premium_video_rate,
            (CallClass::Message, _) => self.message_rate,
        }
    }

    /// Resolve the commission percentage and kind for a receiver tier
    pub fn commission_for(&self, tier: ReceiverTier) -> (Decimal, CommissionKind) {
        match tier {
            ReceiverTier::Standard => (self.default_commission_pct, CommissionKind::Default),
            ReceiverTier::TierA => (self.tier_a_commission_pct, CommissionKind::TierA),
            ReceiverTier::TierB => (self.tier_b_commission_pct, CommissionKind::TierB),
        }
    }

    /// Convert a coin amount to currency units
    #[inline]
    pub fn coins_to_currency(&self, coins: Decimal) -> Decimal {
        coins / self.coin_to_currency_ratio
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            version: 1,
            standard_audio_rate: Decimal::from(5),
            standard_video_rate: Decimal::from(10),
            premium_audio_rate: Decimal::from(8),
            premium_video_rate: Decimal::from(15),
            message_rate: Decimal::ONE,
            default_commission_pct: Decimal::from(20),
            tier_a_commission_pct: Decimal::from(15),
            tier_b_commission_pct: Decimal::from(10),
            coin_to_currency_ratio: Decimal::from(100),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_default() {
        assert!(PricingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_negative_rate() {
        let config = PricingConfig {
            standard_audio_rate: dec!(-1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_percentage_range() {
        let config = PricingConfig {
            tier_a_commission_pct: dec!(101),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PricingConfig {
            default_commission_pct: dec!(100),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_coin_ratio() {
        let config = PricingConfig {
            coin_to_currency_ratio: dec!(0.5),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_for() {
        let config = PricingConfig::default();
        assert_eq!(
            config.rate_for(CallClass::Audio, ReceiverTier::Standard),
            dec!(5)
        );
        assert_eq!(
            config.rate_for(CallClass::Video, ReceiverTier::TierA),
            dec!(15)
        );
        assert_eq!(
            config.rate_for(CallClass::Audio, ReceiverTier::TierB),
            dec!(8)
        );
        assert_eq!(
            config.rate_for(CallClass::Message, ReceiverTier::TierB),
            dec!(1)
        );
    }

    #[test]
    fn test_commission_for() {
        let config = PricingConfig::default();
        assert_eq!(
            config.commission_for(ReceiverTier::Standard),
            (dec!(20), CommissionKind::Default)
        );
        assert_eq!(
            config.commission_for(ReceiverTier::TierB),
            (dec!(10), CommissionKind::TierB)
        );
    }

    #[test]
    fn test_coins_to_currency() {
        let config = PricingConfig::default();
        assert_eq!(config.coins_to_currency(dec!(250)), dec!(2.5));
    }

    #[test]
    fn test_enum_round_trips() {
        assert_eq!(CallClass::from_str("video"), Some(CallClass::Video));
        assert_eq!(ReceiverTier::from_str("tier_a"), Some(ReceiverTier::TierA));
        assert_eq!(CommissionKind::from_str("none"), Some(CommissionKind::None));
        assert_eq!(CallClass::Video.to_string(), "video");
        assert!(!CommissionKind::None.is_payable());
        assert!(CommissionKind::Default.is_payable());
    }
}
