//! Missed call record model
//!
//! A side record persisted when a session terminates without ever reaching
//! `Connected`. Consumed by the notification collaborator; not part of the
//! billing consistency boundary.

use super::session::{CallSession, EndReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Missed call record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissedCallRecord {
    /// Unique identifier (0 until persisted)
    pub id: i64,

    /// The session that never connected
    pub call_id: String,

    /// Who called
    pub caller_id: i64,

    /// Who missed the call
    pub receiver_id: i64,

    /// Terminal reason (declined / no_answer)
    pub reason: EndReason,

    /// Whether the receiver has seen the notification
    pub viewed: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl MissedCallRecord {
    /// Build a record from a failed session
    ///
    /// Falls back to `NoAnswer` when the session carries no reason, which
    /// only happens for legacy rows.
    pub fn from_session(session: &CallSession) -> Self {
        Self {
            id: 0,
            call_id: session.call_id.clone(),
            caller_id: session.caller_id,
            receiver_id: session.receiver_id,
            reason: session.end_reason.unwrap_or(EndReason::NoAnswer),
            viewed: false,
            created_at: Utc::now(),
        }
    }
}
