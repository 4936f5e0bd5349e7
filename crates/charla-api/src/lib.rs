//! API layer for the Charla billing engine
//!
//! HTTP handlers for the call lifecycle, one-shot messages, wallets,
//! pricing administration, and missed calls.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;

pub use dto::{ApiResponse, PaginationParams};

pub use handlers::{
    configure_missed_calls, configure_pricing, configure_sessions, configure_wallets, health_check,
};
