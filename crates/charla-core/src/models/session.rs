//! Call session model
//!
//! A `CallSession` owns the lifecycle of one call from initiation to a
//! terminal state, together with its frozen billing parameters and the
//! settlement totals. Sessions are never deleted; terminal records feed
//! reporting and audit.

use super::pricing::{CallClass, CommissionKind};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Decimal places kept on elapsed minutes
pub const ELAPSED_SCALE: u32 = 2;

/// Session lifecycle status
///
/// `Ended` and `Failed` are terminal; a session already terminal silently
/// rejects further transition attempts, which is the primary defense
/// against duplicate billing from racing triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Created, waiting for the receiver
    #[default]
    Initiated,
    /// Receiver accepted, metering runs
    Connected,
    /// Terminated after being connected (billable path)
    Ended,
    /// Terminated without ever connecting (missed call path)
    Failed,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Initiated => write!(f, "initiated"),
            CallStatus::Connected => write!(f, "connected"),
            CallStatus::Ended => write!(f, "ended"),
            CallStatus::Failed => write!(f, "failed"),
        }
    }
}

impl CallStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "initiated" => Some(CallStatus::Initiated),
            "connected" => Some(CallStatus::Connected),
            "ended" => Some(CallStatus::Ended),
            "failed" => Some(CallStatus::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal status
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Ended | CallStatus::Failed)
    }
}

/// Why a session reached its terminal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Normal completion
    Completed,
    /// Hard duration cap reached
    Timeout,
    /// Either party hung up or dropped
    UserDisconnected,
    /// Caller's balance ran out mid-call
    InsufficientBalance,
    /// Administrative force-end
    AdminEnded,
    /// Receiver declined before connecting
    Declined,
    /// Receiver never answered
    NoAnswer,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Completed => write!(f, "completed"),
            EndReason::Timeout => write!(f, "timeout"),
            EndReason::UserDisconnected => write!(f, "user_disconnected"),
            EndReason::InsufficientBalance => write!(f, "insufficient_balance"),
            EndReason::AdminEnded => write!(f, "admin_ended"),
            EndReason::Declined => write!(f, "declined"),
            EndReason::NoAnswer => write!(f, "no_answer"),
        }
    }
}

impl EndReason {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "completed" => Some(EndReason::Completed),
            "timeout" => Some(EndReason::Timeout),
            "user_disconnected" => Some(EndReason::UserDisconnected),
            "insufficient_balance" => Some(EndReason::InsufficientBalance),
            "admin_ended" => Some(EndReason::AdminEnded),
            "declined" => Some(EndReason::Declined),
            "no_answer" => Some(EndReason::NoAnswer),
            _ => None,
        }
    }

    /// Reasons that mark a session which never connected
    #[inline]
    pub fn is_missed(&self) -> bool {
        matches!(self, EndReason::Declined | EndReason::NoAnswer)
    }
}

/// Call session entity
///
/// Billing parameters (`rate_per_minute`, `commission_pct`,
/// `commission_kind`, `pricing_version`) are captured at session start and
/// frozen for the session's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    /// Unique call identifier
    pub call_id: String,

    /// Paying side of the call
    pub caller_id: i64,

    /// Receiving side of the call
    pub receiver_id: i64,

    /// Call classification
    pub call_class: CallClass,

    /// Current lifecycle status
    pub status: CallStatus,

    /// Frozen rate (coins per minute, or flat coins for messages)
    pub rate_per_minute: Decimal,

    /// Frozen commission percentage
    pub commission_pct: Decimal,

    /// Frozen commission kind; `None` means non-payable combination
    pub commission_kind: CommissionKind,

    /// Pricing config version the rates were captured from
    pub pricing_version: i32,

    /// When the session was initiated
    pub started_at: DateTime<Utc>,

    /// When the receiver accepted (None until connected)
    pub connected_at: Option<DateTime<Utc>>,

    /// When the session reached a terminal status
    pub ended_at: Option<DateTime<Utc>>,

    /// Chargeable minutes, monotonically non-decreasing while connected
    pub elapsed_minutes: Decimal,

    /// Fast-path ceiling derived from the caller's balance at connect time
    pub max_allowed_minutes: Option<Decimal>,

    /// Final coins charged to the caller
    pub total_coins_charged: Decimal,

    /// Platform commission share
    pub commission_coins: Decimal,

    /// Receiver earnings share
    pub receiver_earnings_coins: Decimal,

    /// Exactly-once settlement guard
    pub payment_settled: bool,

    /// Terminal reason (None while non-terminal)
    pub end_reason: Option<EndReason>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl CallSession {
    /// Create a new session in `Initiated` with frozen billing parameters
    pub fn new(
        caller_id: i64,
        receiver_id: i64,
        call_class: CallClass,
        rate_per_minute: Decimal,
        commission_pct: Decimal,
        commission_kind: CommissionKind,
        pricing_version: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            call_id: Uuid::new_v4().to_string(),
            caller_id,
            receiver_id,
            call_class,
            status: CallStatus::Initiated,
            rate_per_minute,
            commission_pct,
            commission_kind,
            pricing_version,
            started_at: now,
            connected_at: None,
            ended_at: None,
            elapsed_minutes: Decimal::ZERO,
            max_allowed_minutes: None,
            total_coins_charged: Decimal::ZERO,
            commission_coins: Decimal::ZERO,
            receiver_earnings_coins: Decimal::ZERO,
            payment_settled: false,
            end_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the session is in a terminal status
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if settlement can move coins for this session
    #[inline]
    pub fn is_billable(&self) -> bool {
        self.commission_kind.is_payable() && self.rate_per_minute > Decimal::ZERO
    }

    /// Chargeable minutes from `connected_at` to `now`
    ///
    /// Rounded down to [`ELAPSED_SCALE`] decimal places so a partial final
    /// minute is billed pro-rata and never overcharges. Zero when the
    /// session never connected.
    pub fn elapsed_since_connect(&self, now: DateTime<Utc>) -> Decimal {
        let Some(connected_at) = self.connected_at else {
            return Decimal::ZERO;
        };
        let elapsed_secs = (now - connected_at).num_seconds().max(0);
        (Decimal::from(elapsed_secs) / Decimal::from(60))
            .round_dp_with_strategy(ELAPSED_SCALE, RoundingStrategy::ToZero)
    }

    /// Cost projection for a number of elapsed minutes at the frozen rate
    ///
    /// Messages cost the flat frozen rate regardless of duration.
    pub fn projected_cost(&self, minutes: Decimal) -> Decimal {
        match self.call_class {
            CallClass::Message => self.rate_per_minute,
            _ => minutes * self.rate_per_minute,
        }
    }
}
