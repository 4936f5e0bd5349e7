//! Notification dispatch
//!
//! The billing engine emits two user-facing events: a missed call and a
//! settled call. Delivery is best-effort; the default dispatcher just
//! logs, and deployments plug in a push-capable implementation behind the
//! same trait.

use charla_core::{
    models::{CallSession, MissedCallRecord},
    traits::{NotificationDispatcher, SettlementResult},
};
use async_trait::async_trait;
use tracing::info;

/// Log-only notification dispatcher
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn missed_call(&self, record: &MissedCallRecord) {
        info!(
            "Notify receiver {}: missed call {} from {} ({})",
            record.receiver_id, record.call_id, record.caller_id, record.reason
        );
    }

    async fn call_settled(&self, session: &CallSession, result: &SettlementResult) {
        info!(
            "Notify session {} settled: charged={}, earnings={}, partial={}",
            session.call_id,
            result.totals.total_coins_charged,
            result.totals.receiver_earnings_coins,
            result.partial
        );
    }
}
