//! Common traits for repositories and collaborators
//!
//! Defines the abstractions the billing services are built against. The
//! session repository carries the compare-and-set transition contract that
//! guarantees exactly one terminal transition and exactly one settlement
//! per session; the wallet repository carries the atomic, idempotent
//! ledger-append contract.

use crate::error::AppError;
use crate::models::{
    CallSession, CallStatus, CommissionKind, EndReason, LedgerEntry, MissedCallRecord,
    PricingConfig, UserProfile,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Outcome of a guarded terminal transition
///
/// A caller that loses the race is not an error case: it observes the
/// winner's already-terminal session and works against that result.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// This caller performed the transition
    Won(CallSession),
    /// Another trigger already terminated the session
    AlreadyTerminal(CallSession),
}

impl TransitionOutcome {
    /// The session after the transition, whoever won
    pub fn session(&self) -> &CallSession {
        match self {
            TransitionOutcome::Won(s) | TransitionOutcome::AlreadyTerminal(s) => s,
        }
    }

    /// Check if this caller won the race
    pub fn won(&self) -> bool {
        matches!(self, TransitionOutcome::Won(_))
    }

    /// Unwrap into the session, whoever won
    pub fn into_session(self) -> CallSession {
        match self {
            TransitionOutcome::Won(s) | TransitionOutcome::AlreadyTerminal(s) => s,
        }
    }
}

/// Parameters written atomically by the Initiated -> Connected transition
#[derive(Debug, Clone)]
pub struct ConnectParams {
    /// Accept timestamp
    pub connected_at: DateTime<Utc>,
    /// Balance-derived fast-path ceiling (billable sessions only)
    pub max_allowed_minutes: Option<Decimal>,
}

/// Final settlement totals recorded with the `payment_settled` flag
#[derive(Debug, Clone, Copy, Default)]
pub struct SettlementTotals {
    pub total_coins_charged: Decimal,
    pub commission_coins: Decimal,
    pub receiver_earnings_coins: Decimal,
}

/// Call session repository
///
/// All status mutation goes through compare-and-set operations: a write is
/// applied only if the session is still in the expected non-terminal
/// state, and the losing side of a race reads back the winning row.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a freshly initiated session
    async fn create(&self, session: &CallSession) -> Result<CallSession, AppError>;

    /// Find a session by call id
    async fn find_by_call_id(&self, call_id: &str) -> Result<Option<CallSession>, AppError>;

    /// CAS Initiated -> Connected
    ///
    /// Returns `None` when the session is no longer in `Initiated`.
    async fn mark_connected(
        &self,
        call_id: &str,
        params: ConnectParams,
    ) -> Result<Option<CallSession>, AppError>;

    /// Record metering progress; applied only while the session is
    /// `Connected` and never decreases `elapsed_minutes`
    async fn update_elapsed(&self, call_id: &str, elapsed_minutes: Decimal)
        -> Result<(), AppError>;

    /// CAS into a terminal status
    ///
    /// Writes `status`, `end_reason`, `ended_at`, and the final
    /// `elapsed_minutes` in one atomic update, guarded on the session
    /// still being in `from`. Exactly one caller per session ever wins a
    /// terminal transition. When the guard misses because the session is
    /// already terminal the outcome is `AlreadyTerminal`; when it misses
    /// because the session moved to a different non-terminal state the
    /// call fails with `InvalidTransition`.
    async fn finish(
        &self,
        call_id: &str,
        from: CallStatus,
        status: CallStatus,
        reason: EndReason,
        ended_at: DateTime<Utc>,
        elapsed_minutes: Decimal,
    ) -> Result<TransitionOutcome, AppError>;

    /// CAS the `payment_settled` flag together with the totals
    ///
    /// Returns `false` when the flag was already set (a concurrent settle
    /// won); the caller must then read back the recorded totals.
    async fn record_settlement(
        &self,
        call_id: &str,
        totals: SettlementTotals,
    ) -> Result<bool, AppError>;

    /// Terminal sessions involving a user, newest-first (reporting)
    async fn list_terminated_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CallSession>, AppError>;
}

/// Wallet ledger repository
///
/// The ledger is append-only. `append` must be atomic across all entries
/// and their balance deltas, serialized per user, and idempotent: entries
/// whose `idempotency_key` already exists are skipped without error.
#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// Current committed balance for a user
    async fn balance(&self, user_id: i64) -> Result<Decimal, AppError>;

    /// Append ledger entries and apply their balance deltas atomically
    ///
    /// Returns the number of entries actually inserted (replayed entries
    /// count zero).
    async fn append(&self, entries: &[LedgerEntry]) -> Result<u64, AppError>;

    /// All ledger entries referencing a call (reconciliation)
    async fn entries_for_call(&self, call_id: &str) -> Result<Vec<LedgerEntry>, AppError>;

    /// Ledger entries for a user, newest-first
    async fn entries_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, AppError>;
}

/// Pricing configuration store
#[async_trait]
pub trait PricingRepository: Send + Sync {
    /// Load the current config; `None` when never configured
    async fn load(&self) -> Result<Option<PricingConfig>, AppError>;

    /// Persist a new config, bumping the version
    async fn save(&self, config: &PricingConfig) -> Result<PricingConfig, AppError>;
}

/// Missed call record store
#[async_trait]
pub trait MissedCallRepository: Send + Sync {
    /// Persist a record; replays for the same call id are ignored
    async fn insert(&self, record: &MissedCallRecord) -> Result<MissedCallRecord, AppError>;

    /// Unviewed records for a receiver, newest-first
    async fn list_unviewed(
        &self,
        receiver_id: i64,
        limit: i64,
    ) -> Result<Vec<MissedCallRecord>, AppError>;

    /// Mark a record viewed
    async fn mark_viewed(&self, id: i64) -> Result<bool, AppError>;
}

/// User directory, the narrow profile contract billing consumes
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Profile for a user
    async fn profile(&self, user_id: i64) -> Result<Option<UserProfile>, AppError>;
}

/// Locked billing parameters handed to a new session
#[derive(Debug, Clone, Copy)]
pub struct RateLock {
    pub rate_per_minute: Decimal,
    pub commission_pct: Decimal,
    pub commission_kind: CommissionKind,
    pub pricing_version: i32,
}

/// Settlement result returned to every caller of `settle`
#[derive(Debug, Clone, Copy)]
pub struct SettlementResult {
    pub totals: SettlementTotals,
    /// True when the totals were capped at the caller's live balance
    pub partial: bool,
    /// True when a previous settle already produced these totals
    pub already_settled: bool,
}

/// Notification dispatcher collaborator
///
/// Best-effort: implementations must not block billing, and errors are
/// logged rather than propagated.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// A session terminated without connecting
    async fn missed_call(&self, record: &MissedCallRecord);

    /// A session settled
    async fn call_settled(&self, session: &CallSession, result: &SettlementResult);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CallClass;

    fn terminal_session() -> CallSession {
        let mut s = CallSession::new(
            1,
            2,
            CallClass::Audio,
            Decimal::from(5),
            Decimal::from(20),
            CommissionKind::Default,
            1,
        );
        s.status = CallStatus::Ended;
        s
    }

    #[test]
    fn test_transition_outcome() {
        let won = TransitionOutcome::Won(terminal_session());
        assert!(won.won());
        assert!(won.session().is_terminal());

        let lost = TransitionOutcome::AlreadyTerminal(terminal_session());
        assert!(!lost.won());
        assert!(lost.into_session().is_terminal());
    }
}
