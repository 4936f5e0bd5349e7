//! Domain models for the Charla billing engine
//!
//! This module contains all the core domain models used throughout the
//! billing subsystem.

pub mod ledger;
pub mod missed_call;
pub mod pricing;
pub mod session;
pub mod user;

pub use ledger::{LedgerEntry, LedgerEntryKind};
pub use missed_call::MissedCallRecord;
pub use pricing::{CallClass, CommissionKind, PricingConfig, ReceiverTier};
pub use session::{CallSession, CallStatus, EndReason, ELAPSED_SCALE};
pub use user::{payable_pair, UserKind, UserProfile};
