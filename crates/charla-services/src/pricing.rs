//! Pricing service implementation
//!
//! Resolves the rate and commission a session runs under, with Redis
//! caching in front of the config store. Billing never proceeds without a
//! validated config: a missing or invalid config surfaces as
//! `PricingUnavailable` and the call is rejected.

use charla_cache::{keys::PRICING_CONFIG_KEY, RedisCache};
use charla_core::{
    models::{payable_pair, CallClass, CommissionKind, PricingConfig, UserProfile},
    traits::{PricingRepository, RateLock},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Pricing resolution service with caching
///
/// The cache is optional so that callers without a Redis deployment (and
/// tests) fall through to the backing store on every read.
pub struct PricingService {
    pricing_repo: Arc<dyn PricingRepository>,
    cache: Option<RedisCache>,
    cache_ttl_secs: u64,
}

impl PricingService {
    /// Create a new pricing service
    pub fn new(
        pricing_repo: Arc<dyn PricingRepository>,
        cache: Option<RedisCache>,
        cache_ttl_secs: u64,
    ) -> Self {
        Self {
            pricing_repo,
            cache,
            cache_ttl_secs,
        }
    }

    /// Try to get the config from cache
    async fn get_from_cache(&self) -> Option<PricingConfig> {
        let cache = self.cache.as_ref()?;

        match cache.get::<PricingConfig>(PRICING_CONFIG_KEY).await {
            Ok(config) => {
                if config.is_some() {
                    debug!("Pricing config cache HIT");
                }
                config
            }
            Err(e) => {
                warn!("Cache error loading pricing config: {}", e);
                // Don't fail on cache errors, just continue without cache
                None
            }
        }
    }

    /// Store the config in cache
    async fn store_in_cache(&self, config: &PricingConfig) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };

        if let Err(e) = cache
            .set(PRICING_CONFIG_KEY, config, self.cache_ttl_secs)
            .await
        {
            warn!("Failed to cache pricing config: {}", e);
            // Don't fail on cache errors
        }
    }

    /// Current validated pricing config
    ///
    /// Reads through the cache; a miss loads the backing store and
    /// repopulates. Fails with `PricingUnavailable` when no config has ever
    /// been saved or the stored one is out of range.
    #[instrument(skip(self))]
    pub async fn snapshot(&self) -> AppResult<PricingConfig> {
        if let Some(config) = self.get_from_cache().await {
            return Ok(config);
        }

        debug!("Pricing config cache MISS");
        let config = self
            .pricing_repo
            .load()
            .await?
            .ok_or(AppError::PricingUnavailable)?;

        if let Err(e) = config.validate() {
            warn!("Stored pricing config failed validation: {}", e);
            return Err(AppError::PricingUnavailable);
        }

        self.store_in_cache(&config).await;

        Ok(config)
    }

    /// Resolve the frozen billing parameters for a new session
    ///
    /// The rate follows the receiver's tier and the call class. Coins move
    /// only for a member calling a host; any other pairing gets a
    /// commission kind of `None` and settles to zero.
    #[instrument(skip(self, caller, receiver))]
    pub async fn lock_for(
        &self,
        caller: &UserProfile,
        receiver: &UserProfile,
        class: CallClass,
    ) -> AppResult<RateLock> {
        let config = self.snapshot().await?;

        let rate_per_minute = config.rate_for(class, receiver.tier);
        let (commission_pct, commission_kind) = if payable_pair(caller, receiver) {
            config.commission_for(receiver.tier)
        } else {
            (Decimal::ZERO, CommissionKind::None)
        };

        debug!(
            "Rate lock for {} -> {} ({}): rate={}, commission={}% ({})",
            caller.id, receiver.id, class, rate_per_minute, commission_pct, commission_kind
        );

        Ok(RateLock {
            rate_per_minute,
            commission_pct,
            commission_kind,
            pricing_version: config.version,
        })
    }

    /// Save a new pricing config and invalidate the cache
    ///
    /// In-progress sessions keep their frozen parameters; only sessions
    /// initiated after this call see the new rates.
    #[instrument(skip(self, config))]
    pub async fn update(&self, config: PricingConfig) -> AppResult<PricingConfig> {
        config.validate()?;

        let saved = self.pricing_repo.save(&config).await?;

        if let Some(cache) = self.cache.as_ref() {
            if let Err(e) = cache.delete(PRICING_CONFIG_KEY).await {
                warn!("Failed to invalidate pricing config cache: {}", e);
            }
        }

        info!("Pricing config updated to version {}", saved.version);

        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use charla_core::models::{ReceiverTier, UserKind};
    use rust_decimal_macros::dec;

    struct MockPricingRepository {
        config: Option<PricingConfig>,
    }

    #[async_trait]
    impl PricingRepository for MockPricingRepository {
        async fn load(&self) -> AppResult<Option<PricingConfig>> {
            Ok(self.config.clone())
        }

        async fn save(&self, config: &PricingConfig) -> AppResult<PricingConfig> {
            let mut saved = config.clone();
            saved.version += 1;
            Ok(saved)
        }
    }

    fn profile(id: i64, kind: UserKind, tier: ReceiverTier) -> UserProfile {
        UserProfile { id, kind, tier }
    }

    fn service(config: Option<PricingConfig>) -> PricingService {
        PricingService::new(Arc::new(MockPricingRepository { config }), None, 300)
    }

    #[tokio::test]
    async fn test_snapshot_missing_config() {
        let result = service(None).snapshot().await;
        assert!(matches!(result, Err(AppError::PricingUnavailable)));
    }

    #[tokio::test]
    async fn test_snapshot_invalid_config() {
        let config = PricingConfig {
            default_commission_pct: dec!(150),
            ..Default::default()
        };
        let result = service(Some(config)).snapshot().await;
        assert!(matches!(result, Err(AppError::PricingUnavailable)));
    }

    #[tokio::test]
    async fn test_lock_for_payable_pair() {
        let svc = service(Some(PricingConfig::default()));
        let member = profile(1, UserKind::Member, ReceiverTier::Standard);
        let host = profile(2, UserKind::Host, ReceiverTier::TierA);

        let lock = svc
            .lock_for(&member, &host, CallClass::Video)
            .await
            .unwrap();
        assert_eq!(lock.rate_per_minute, dec!(15));
        assert_eq!(lock.commission_pct, dec!(15));
        assert_eq!(lock.commission_kind, CommissionKind::TierA);
    }

    #[tokio::test]
    async fn test_lock_for_non_payable_pair() {
        let svc = service(Some(PricingConfig::default()));
        let a = profile(1, UserKind::Member, ReceiverTier::Standard);
        let b = profile(2, UserKind::Member, ReceiverTier::Standard);

        let lock = svc.lock_for(&a, &b, CallClass::Audio).await.unwrap();
        assert_eq!(lock.rate_per_minute, dec!(5));
        assert_eq!(lock.commission_pct, Decimal::ZERO);
        assert_eq!(lock.commission_kind, CommissionKind::None);
    }

    #[tokio::test]
    async fn test_update_rejects_invalid() {
        let svc = service(Some(PricingConfig::default()));
        let bad = PricingConfig {
            standard_audio_rate: dec!(-5),
            ..Default::default()
        };
        assert!(svc.update(bad).await.is_err());
    }
}
