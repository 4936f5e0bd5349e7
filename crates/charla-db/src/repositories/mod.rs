//! Repository implementations
//!
//! This module contains concrete implementations of all repository traits
//! defined in charla-core, using sqlx for PostgreSQL access.

pub mod missed_call_repo;
pub mod pricing_repo;
pub mod session_repo;
pub mod user_repo;
pub mod wallet_repo;

pub use missed_call_repo::PgMissedCallRepository;
pub use pricing_repo::PgPricingRepository;
pub use session_repo::PgSessionRepository;
pub use user_repo::PgUserRepository;
pub use wallet_repo::PgWalletRepository;
