//! Business logic services for the Charla billing engine
//!
//! This crate contains the services that orchestrate call monetization:
//! pricing resolution, session lifecycle, real-time metering, settlement,
//! and missed call recording.
//!
//! # Architecture
//!
//! Services are designed to be composable and testable:
//! - Each service owns its dependencies (repositories, cache, etc.)
//! - Services are wrapped in Arc for safe sharing across async tasks
//! - All operations are instrumented with tracing
//! - Comprehensive error handling with AppError
//!
//! # Services
//!
//! - `PricingService` - Rate and commission resolution with caching
//! - `SessionManager` - Call session lifecycle orchestration
//! - `MeteringService` - Per-call background metering tasks
//! - `SettlementService` - Exactly-once coin settlement
//! - `MissedCallRecorder` - Side records for unconnected sessions

pub mod metering;
pub mod missed_call;
pub mod notify;
pub mod pricing;
pub mod session_manager;
pub mod settlement;

pub use metering::{MeteringService, TickDecision};
pub use missed_call::MissedCallRecorder;
pub use notify::LogNotifier;
pub use pricing::PricingService;
pub use session_manager::SessionManager;
pub use settlement::SettlementService;

/// Business logic constants
pub mod constants {
    /// Default page size for missed call listings
    pub const MISSED_CALL_PAGE_SIZE: i64 = 50;
}
