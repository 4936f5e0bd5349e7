//! Data transfer objects for the HTTP API

pub mod common;
pub mod missed_call;
pub mod pricing;
pub mod session;
pub mod wallet;

pub use common::{ApiResponse, PaginationParams};
