//! Missed call recorder
//!
//! Persists a side record whenever a session terminates without ever
//! connecting and hands it to the notification dispatcher. Sits outside
//! the billing consistency boundary: a failure here never rolls back the
//! session's terminal transition.

use charla_core::{
    models::{CallSession, MissedCallRecord},
    traits::{MissedCallRepository, NotificationDispatcher},
    AppResult,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// Missed call recorder service
pub struct MissedCallRecorder {
    missed_call_repo: Arc<dyn MissedCallRepository>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl MissedCallRecorder {
    /// Create a new missed call recorder
    pub fn new(
        missed_call_repo: Arc<dyn MissedCallRepository>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            missed_call_repo,
            notifier,
        }
    }

    /// Record a session that never connected and notify the receiver
    ///
    /// Keyed on the call id, so a replay for the same session is a no-op
    /// at the store and produces at most one duplicate notification.
    #[instrument(skip(self, session))]
    pub async fn record(&self, session: &CallSession) -> AppResult<MissedCallRecord> {
        let record = MissedCallRecord::from_session(session);
        let saved = self.missed_call_repo.insert(&record).await?;

        info!(
            "Recorded missed call {} for receiver {} ({})",
            saved.call_id, saved.receiver_id, saved.reason
        );

        self.notifier.missed_call(&saved).await;

        Ok(saved)
    }

    /// Unviewed missed calls for a receiver, newest-first
    pub async fn unviewed_for(
        &self,
        receiver_id: i64,
        limit: i64,
    ) -> AppResult<Vec<MissedCallRecord>> {
        self.missed_call_repo.list_unviewed(receiver_id, limit).await
    }

    /// Mark a missed call record as viewed
    pub async fn mark_viewed(&self, id: i64) -> AppResult<bool> {
        self.missed_call_repo.mark_viewed(id).await
    }
}
