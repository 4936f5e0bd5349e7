//! Cache key constants for the Charla billing engine
//!
//! Standardized key naming so the billing engine never collides with the
//! platform's other cache consumers.

/// Key holding the current pricing configuration snapshot
///
/// Format: `pricing_config:current`
pub const PRICING_CONFIG_KEY: &str = "pricing_config:current";
