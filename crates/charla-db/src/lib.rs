//! Charla Billing Database Layer
//!
//! This crate provides PostgreSQL database access and repository
//! implementations for the billing engine. It includes:
//!
//! - Connection pool management with sqlx
//! - Repository implementations for sessions, wallets, pricing, missed
//!   calls, and the user directory
//! - The compare-and-set transition queries that guarantee one terminal
//!   transition and one settlement per session
//! - Idempotent ledger appends with per-user row locking

pub mod pool;
pub mod repositories;

pub use pool::create_pool;
pub use repositories::*;

// Re-export commonly used types
pub use charla_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
