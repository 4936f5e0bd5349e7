//! Wallet ledger models
//!
//! The ledger is the single source of truth for funds: an append-only log
//! of coin movements. Balances move only through new entries, never by
//! in-place mutation. Entries carry an idempotency key so that settlement
//! replays after a crash are no-ops.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger entry kind
///
/// Only call-related kinds live in this subsystem; recharge and adjustment
/// entries belong to collaborators outside the billing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    /// Debit against the caller for a settled call
    CallPayment,
    /// Credit to the receiver for a settled call
    CallEarning,
}

impl fmt::Display for LedgerEntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerEntryKind::CallPayment => write!(f, "call_payment"),
            LedgerEntryKind::CallEarning => write!(f, "call_earning"),
        }
    }
}

impl LedgerEntryKind {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "call_payment" => Some(LedgerEntryKind::CallPayment),
            "call_earning" => Some(LedgerEntryKind::CallEarning),
            _ => None,
        }
    }
}

/// Wallet ledger entry
///
/// `amount` is always non-negative; the direction of the balance change is
/// derived from `kind` (see [`LedgerEntry::signed_amount`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique identifier (0 until persisted)
    pub id: i64,

    /// Wallet owner
    pub user_id: i64,

    /// Entry kind
    pub kind: LedgerEntryKind,

    /// Coin amount, non-negative
    pub amount: Decimal,

    /// Call this entry settles; payment and earning entries of one call
    /// share this id for reconciliation
    pub related_call_id: String,

    /// Replay guard, unique per `(call, kind)`
    pub idempotency_key: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Build the idempotency key for a call and kind
    pub fn idempotency_key(call_id: &str, kind: LedgerEntryKind) -> String {
        format!("{}:{}", call_id, kind)
    }

    /// Debit entry charging the caller for a settled call
    pub fn call_payment(user_id: i64, call_id: &str, amount: Decimal) -> Self {
        Self::new(user_id, LedgerEntryKind::CallPayment, call_id, amount)
    }

    /// Credit entry paying the receiver their earnings share
    pub fn call_earning(user_id: i64, call_id: &str, amount: Decimal) -> Self {
        Self::new(user_id, LedgerEntryKind::CallEarning, call_id, amount)
    }

    fn new(user_id: i64, kind: LedgerEntryKind, call_id: &str, amount: Decimal) -> Self {
        Self {
            id: 0,
            user_id,
            kind,
            amount,
            related_call_id: call_id.to_string(),
            idempotency_key: Self::idempotency_key(call_id, kind),
            created_at: Utc::now(),
        }
    }

    /// The balance delta this entry applies to its wallet
    #[inline]
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            LedgerEntryKind::CallPayment => -self.amount,
            LedgerEntryKind::CallEarning => self.amount,
        }
    }
}
