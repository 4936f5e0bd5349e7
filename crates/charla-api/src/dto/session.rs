//! Call session DTOs
//!
//! Request and response types for the call lifecycle endpoints.

use charla_core::models::{CallClass, CallSession, EndReason};
use charla_core::traits::SettlementResult;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Call initiation request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CallCreateRequest {
    /// Paying side of the call
    #[validate(range(min = 1, message = "caller_id is required"))]
    pub caller_id: i64,

    /// Receiving side of the call
    #[validate(range(min = 1, message = "receiver_id is required"))]
    pub receiver_id: i64,

    /// Call class: audio or video
    pub call_class: String,
}

impl CallCreateRequest {
    /// Parse the call class, rejecting one-shot classes
    ///
    /// Messages have their own endpoint; a metered call must be audio or
    /// video.
    pub fn parsed_class(&self) -> Option<CallClass> {
        match CallClass::from_str(&self.call_class) {
            Some(CallClass::Message) | None => None,
            Some(class) => Some(class),
        }
    }
}

/// Call end request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallEndRequest {
    /// End reason; defaults to a user hang-up
    pub reason: Option<String>,
}

impl CallEndRequest {
    /// Parse the reason, restricted to externally triggerable ones
    pub fn parsed_reason(&self) -> Option<EndReason> {
        match self.reason.as_deref() {
            None => Some(EndReason::UserDisconnected),
            Some(s) => match EndReason::from_str(s) {
                Some(
                    reason @ (EndReason::Completed
                    | EndReason::UserDisconnected
                    | EndReason::AdminEnded),
                ) => Some(reason),
                _ => None,
            },
        }
    }
}

/// Message send request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MessageSendRequest {
    /// Paying sender
    #[validate(range(min = 1, message = "sender_id is required"))]
    pub sender_id: i64,

    /// Receiver
    #[validate(range(min = 1, message = "receiver_id is required"))]
    pub receiver_id: i64,
}

/// Call session response
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    /// Unique call identifier
    pub call_id: String,

    /// Paying side
    pub caller_id: i64,

    /// Receiving side
    pub receiver_id: i64,

    /// Call class
    pub call_class: String,

    /// Lifecycle status
    pub status: String,

    /// Frozen rate
    pub rate_per_minute: Decimal,

    /// Frozen commission percentage
    pub commission_pct: Decimal,

    /// Pricing config version the rates came from
    pub pricing_version: i32,

    /// Initiation timestamp
    pub started_at: DateTime<Utc>,

    /// Connect timestamp
    pub connected_at: Option<DateTime<Utc>>,

    /// Terminal timestamp
    pub ended_at: Option<DateTime<Utc>>,

    /// Chargeable minutes so far
    pub elapsed_minutes: Decimal,

    /// Connect-time affordability ceiling
    pub max_allowed_minutes: Option<Decimal>,

    /// Final coins charged
    pub total_coins_charged: Decimal,

    /// Platform commission share
    pub commission_coins: Decimal,

    /// Receiver earnings share
    pub receiver_earnings_coins: Decimal,

    /// Whether settlement has completed
    pub payment_settled: bool,

    /// Terminal reason
    pub end_reason: Option<String>,
}

impl From<CallSession> for SessionResponse {
    fn from(session: CallSession) -> Self {
        Self {
            call_id: session.call_id,
            caller_id: session.caller_id,
            receiver_id: session.receiver_id,
            call_class: session.call_class.to_string(),
            status: session.status.to_string(),
            rate_per_minute: session.rate_per_minute,
            commission_pct: session.commission_pct,
            pricing_version: session.pricing_version,
            started_at: session.started_at,
            connected_at: session.connected_at,
            ended_at: session.ended_at,
            elapsed_minutes: session.elapsed_minutes,
            max_allowed_minutes: session.max_allowed_minutes,
            total_coins_charged: session.total_coins_charged,
            commission_coins: session.commission_coins,
            receiver_earnings_coins: session.receiver_earnings_coins,
            payment_settled: session.payment_settled,
            end_reason: session.end_reason.map(|r| r.to_string()),
        }
    }
}

/// Message settlement response
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    /// The settled message session
    pub session: SessionResponse,

    /// Coins charged to the sender
    pub charged: Decimal,

    /// Whether the charge was capped at the sender's balance
    pub partial: bool,
}

impl MessageResponse {
    /// Build from a settled session and its settlement result
    pub fn new(session: CallSession, result: &SettlementResult) -> Self {
        Self {
            session: session.into(),
            charged: result.totals.total_coins_charged,
            partial: result.partial,
        }
    }
}
