//! HTTP request handlers

pub mod health;
pub mod missed_call;
pub mod pricing;
pub mod session;
pub mod wallet;

pub use health::health_check;
pub use missed_call::configure as configure_missed_calls;
pub use pricing::configure as configure_pricing;
pub use session::configure as configure_sessions;
pub use wallet::configure as configure_wallets;
