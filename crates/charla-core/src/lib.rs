//! Charla Billing Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the Charla call billing engine. It includes:
//!
//! - Domain models (PricingConfig, CallSession, LedgerEntry, etc.)
//! - Common traits for repositories and collaborators
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
