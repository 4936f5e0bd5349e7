//! Missed call DTOs

use charla_core::models::MissedCallRecord;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Missed call record response
#[derive(Debug, Clone, Serialize)]
pub struct MissedCallResponse {
    /// Record identifier
    pub id: i64,

    /// The session that never connected
    pub call_id: String,

    /// Who called
    pub caller_id: i64,

    /// Who missed the call
    pub receiver_id: i64,

    /// Why the call never connected
    pub reason: String,

    /// Whether the receiver has seen the notification
    pub viewed: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl From<MissedCallRecord> for MissedCallResponse {
    fn from(record: MissedCallRecord) -> Self {
        Self {
            id: record.id,
            call_id: record.call_id,
            caller_id: record.caller_id,
            receiver_id: record.receiver_id,
            reason: record.reason.to_string(),
            viewed: record.viewed,
            created_at: record.created_at,
        }
    }
}
