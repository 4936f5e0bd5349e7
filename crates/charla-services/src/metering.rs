//! Real-time metering service
//!
//! Spawns one background task per connected metered session. Each tick
//! recomputes elapsed minutes from the connect timestamp, persists the
//! progress, and checks affordability against the caller's live balance.
//! When the balance runs out or the hard duration cap is hit, the task
//! drives the same guarded terminal transition every other trigger uses
//! and settles if it wins.

use charla_core::{
    models::{CallSession, CallStatus, EndReason},
    traits::{SessionRepository, WalletRepository},
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::settlement::SettlementService;

/// Decimal places kept on affordable minutes, matching elapsed minutes
const AFFORDABLE_SCALE: u32 = 2;

/// What a metering tick decided for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickDecision {
    /// Session continues; persist the recomputed elapsed minutes
    Continue { elapsed: Decimal },
    /// Session must end now with `reason`, billing `billable_minutes`
    End {
        reason: EndReason,
        billable_minutes: Decimal,
    },
}

/// Per-call metering task manager
pub struct MeteringService {
    session_repo: Arc<dyn SessionRepository>,
    wallet_repo: Arc<dyn WalletRepository>,
    settlement: Arc<SettlementService>,
    active_monitors: Arc<RwLock<HashMap<String, tokio::task::JoinHandle<()>>>>,
    tick: Duration,
    hard_cap_minutes: Decimal,
}

impl MeteringService {
    /// Create a new metering service
    pub fn new(
        session_repo: Arc<dyn SessionRepository>,
        wallet_repo: Arc<dyn WalletRepository>,
        settlement: Arc<SettlementService>,
        tick_secs: u64,
        max_call_minutes: u32,
    ) -> Self {
        Self {
            session_repo,
            wallet_repo,
            settlement,
            active_monitors: Arc::new(RwLock::new(HashMap::new())),
            tick: Duration::from_secs(tick_secs),
            hard_cap_minutes: Decimal::from(max_call_minutes),
        }
    }

    /// Minutes a balance can afford at a per-minute rate, rounded down
    pub fn affordable_minutes(balance: Decimal, rate_per_minute: Decimal) -> Decimal {
        if rate_per_minute <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (balance.max(Decimal::ZERO) / rate_per_minute)
            .round_dp_with_strategy(AFFORDABLE_SCALE, RoundingStrategy::ToZero)
    }

    /// Decide what a tick does for a connected session
    ///
    /// The connect-time ceiling is a fast-path cutoff; the live balance
    /// read this tick stays authoritative for the minutes actually billed,
    /// since concurrent sessions and earnings may have moved the balance
    /// either way since connect.
    pub fn tick_decision(
        session: &CallSession,
        balance: Decimal,
        now: DateTime<Utc>,
        hard_cap_minutes: Decimal,
    ) -> TickDecision {
        let elapsed = session.elapsed_since_connect(now);

        if elapsed >= hard_cap_minutes {
            return TickDecision::End {
                reason: EndReason::Timeout,
                billable_minutes: hard_cap_minutes,
            };
        }

        if session.is_billable() {
            let over_ceiling = session
                .max_allowed_minutes
                .is_some_and(|ceiling| elapsed >= ceiling);
            if over_ceiling || session.projected_cost(elapsed) > balance {
                let affordable =
                    Self::affordable_minutes(balance, session.rate_per_minute).min(elapsed);
                return TickDecision::End {
                    reason: EndReason::InsufficientBalance,
                    billable_minutes: affordable,
                };
            }
        }

        TickDecision::Continue { elapsed }
    }

    /// Start metering a freshly connected session
    ///
    /// One-shot classes (messages) are settled inline by their callers and
    /// never get a monitor.
    pub async fn start(&self, session: &CallSession) {
        if !session.call_class.is_metered() {
            debug!(
                "Skipping metering for one-shot session {}",
                session.call_id
            );
            return;
        }

        info!("Starting metering for session {}", session.call_id);

        let session_repo = Arc::clone(&self.session_repo);
        let wallet_repo = Arc::clone(&self.wallet_repo);
        let settlement = Arc::clone(&self.settlement);
        let monitors = Arc::clone(&self.active_monitors);
        let call_id = session.call_id.clone();
        let tick = self.tick;
        let hard_cap = self.hard_cap_minutes;

        let task_call_id = call_id.clone();
        let handle = tokio::spawn(async move {
            Self::monitor_call(
                session_repo,
                wallet_repo,
                settlement,
                task_call_id.clone(),
                tick,
                hard_cap,
            )
            .await;
            monitors.write().await.remove(&task_call_id);
        });

        let mut monitors = self.active_monitors.write().await;
        monitors.insert(call_id, handle);
    }

    /// Stop metering a session
    ///
    /// Called when an external trigger terminated the session; the task is
    /// aborted rather than left to discover the terminal row on its next
    /// tick.
    pub async fn stop(&self, call_id: &str) {
        let mut monitors = self.active_monitors.write().await;

        if let Some(handle) = monitors.remove(call_id) {
            handle.abort();
            info!("Stopped metering for session {}", call_id);
        }
    }

    /// Number of sessions currently being metered
    pub async fn active_count(&self) -> usize {
        self.active_monitors.read().await.len()
    }

    async fn monitor_call(
        session_repo: Arc<dyn SessionRepository>,
        wallet_repo: Arc<dyn WalletRepository>,
        settlement: Arc<SettlementService>,
        call_id: String,
        tick: Duration,
        hard_cap_minutes: Decimal,
    ) {
        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let session = match session_repo.find_by_call_id(&call_id).await {
                Ok(Some(session)) => session,
                Ok(None) => {
                    warn!("Session {} vanished, stopping metering", call_id);
                    break;
                }
                Err(e) => {
                    error!("Error loading session {}: {}", call_id, e);
                    continue;
                }
            };

            if session.is_terminal() {
                debug!("Session {} ended, stopping metering", call_id);
                break;
            }

            let balance = if session.is_billable() {
                match wallet_repo.balance(session.caller_id).await {
                    Ok(balance) => balance,
                    Err(e) => {
                        error!("Error reading balance for session {}: {}", call_id, e);
                        continue;
                    }
                }
            } else {
                Decimal::ZERO
            };

            match Self::tick_decision(&session, balance, Utc::now(), hard_cap_minutes) {
                TickDecision::Continue { elapsed } => {
                    if let Err(e) = session_repo.update_elapsed(&call_id, elapsed).await {
                        error!("Error persisting elapsed for session {}: {}", call_id, e);
                    }
                }
                TickDecision::End {
                    reason,
                    billable_minutes,
                } => {
                    info!(
                        "Metering ending session {}: {} at {} minutes",
                        call_id, reason, billable_minutes
                    );
                    match session_repo
                        .finish(
                            &call_id,
                            CallStatus::Connected,
                            CallStatus::Ended,
                            reason,
                            Utc::now(),
                            billable_minutes,
                        )
                        .await
                    {
                        Ok(outcome) => {
                            if outcome.won() {
                                if let Err(e) = settlement.settle(&call_id).await {
                                    error!("Settlement failed for session {}: {}", call_id, e);
                                }
                            }
                        }
                        Err(e) => {
                            error!("Error ending session {}: {}", call_id, e);
                        }
                    }
                    break;
                }
            }
        }
    }
}
