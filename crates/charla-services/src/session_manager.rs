//! Call session lifecycle orchestration
//!
//! The session manager is the single entry point for every lifecycle
//! trigger: initiate, accept, decline, hang-up, admin end, and one-shot
//! messages. All terminal transitions funnel through the repository's
//! compare-and-set, so a user hang-up racing the metering task (or a
//! double-tap on the end button) resolves to exactly one winner, and only
//! the winner settles.

use charla_core::{
    models::{CallClass, CallSession, CallStatus, EndReason, UserProfile},
    traits::{ConnectParams, SessionRepository, SettlementResult, UserRepository, WalletRepository},
    AppError, AppResult,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::metering::MeteringService;
use crate::missed_call::MissedCallRecorder;
use crate::pricing::PricingService;
use crate::settlement::SettlementService;

/// Call session lifecycle manager
pub struct SessionManager {
    session_repo: Arc<dyn SessionRepository>,
    user_repo: Arc<dyn UserRepository>,
    wallet_repo: Arc<dyn WalletRepository>,
    pricing: Arc<PricingService>,
    metering: Arc<MeteringService>,
    settlement: Arc<SettlementService>,
    recorder: Arc<MissedCallRecorder>,
    ring_timeout: Duration,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(
        session_repo: Arc<dyn SessionRepository>,
        user_repo: Arc<dyn UserRepository>,
        wallet_repo: Arc<dyn WalletRepository>,
        pricing: Arc<PricingService>,
        metering: Arc<MeteringService>,
        settlement: Arc<SettlementService>,
        recorder: Arc<MissedCallRecorder>,
        ring_timeout_secs: u64,
    ) -> Self {
        Self {
            session_repo,
            user_repo,
            wallet_repo,
            pricing,
            metering,
            settlement,
            recorder,
            ring_timeout: Duration::from_secs(ring_timeout_secs),
        }
    }

    async fn load(&self, call_id: &str) -> AppResult<CallSession> {
        self.session_repo
            .find_by_call_id(call_id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(call_id.to_string()))
    }

    async fn profile(&self, user_id: i64) -> AppResult<UserProfile> {
        self.user_repo
            .profile(user_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))
    }

    /// Initiate a call session
    ///
    /// Resolves and freezes the billing parameters under the current
    /// pricing config; the session then rings in `Initiated` until the
    /// receiver answers or a failure trigger fires.
    #[instrument(skip(self))]
    pub async fn initiate(
        &self,
        caller_id: i64,
        receiver_id: i64,
        class: CallClass,
    ) -> AppResult<CallSession> {
        if caller_id == receiver_id {
            return Err(AppError::InvalidInput(
                "caller and receiver must differ".to_string(),
            ));
        }

        let caller = self.profile(caller_id).await?;
        let receiver = self.profile(receiver_id).await?;
        let lock = self.pricing.lock_for(&caller, &receiver, class).await?;

        let session = CallSession::new(
            caller_id,
            receiver_id,
            class,
            lock.rate_per_minute,
            lock.commission_pct,
            lock.commission_kind,
            lock.pricing_version,
        );
        let session = self.session_repo.create(&session).await?;
        self.spawn_ring_timer(&session.call_id);

        info!(
            "Initiated {} session {}: {} -> {} at {}/min (v{})",
            class,
            session.call_id,
            caller_id,
            receiver_id,
            session.rate_per_minute,
            session.pricing_version
        );

        Ok(session)
    }

    /// Fire NoAnswer if the session is still ringing when the timeout lands
    ///
    /// The timer is an ordinary caller of the guarded transition: an
    /// answered or already-terminal session makes it a no-op.
    fn spawn_ring_timer(&self, call_id: &str) {
        let session_repo = self.session_repo.clone();
        let recorder = self.recorder.clone();
        let call_id = call_id.to_string();
        let timeout = self.ring_timeout;

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let outcome = session_repo
                .finish(
                    &call_id,
                    CallStatus::Initiated,
                    CallStatus::Failed,
                    EndReason::NoAnswer,
                    Utc::now(),
                    Decimal::ZERO,
                )
                .await;

            match outcome {
                Ok(outcome) if outcome.won() => {
                    info!("Session {} ring timed out", call_id);
                    if let Err(e) = recorder.record(outcome.session()).await {
                        warn!("Failed to record missed call {}: {}", call_id, e);
                    }
                }
                Ok(_) => {}
                // Connected in the meantime
                Err(AppError::InvalidTransition { .. }) => {}
                Err(e) => warn!("Ring timer for session {} failed: {}", call_id, e),
            }
        });
    }

    /// Find a session by call id
    pub async fn get(&self, call_id: &str) -> AppResult<CallSession> {
        self.load(call_id).await
    }

    /// Accept a ringing session, connecting it and starting metering
    ///
    /// Billable sessions are admitted only when the caller can afford at
    /// least one metered minute; the balance also fixes the connect-time
    /// ceiling used as a metering fast-path.
    #[instrument(skip(self))]
    pub async fn accept(&self, call_id: &str) -> AppResult<CallSession> {
        let session = self.load(call_id).await?;

        match session.status {
            CallStatus::Connected => {
                debug!("Session {} already connected", call_id);
                return Ok(session);
            }
            CallStatus::Ended | CallStatus::Failed => {
                return Err(AppError::InvalidTransition {
                    call_id: call_id.to_string(),
                    status: session.status.to_string(),
                });
            }
            CallStatus::Initiated => {}
        }

        let max_allowed_minutes = if session.is_billable() {
            let balance = self.wallet_repo.balance(session.caller_id).await?;
            if balance < session.rate_per_minute {
                warn!(
                    "Rejecting accept of session {}: balance {} below one minute at {}",
                    call_id, balance, session.rate_per_minute
                );
                return Err(AppError::InsufficientBalance {
                    required: session.rate_per_minute.to_string(),
                    available: balance.to_string(),
                });
            }
            Some(MeteringService::affordable_minutes(
                balance,
                session.rate_per_minute,
            ))
        } else {
            None
        };

        let params = ConnectParams {
            connected_at: Utc::now(),
            max_allowed_minutes,
        };

        match self.session_repo.mark_connected(call_id, params).await? {
            Some(connected) => {
                info!(
                    "Session {} connected (ceiling: {:?})",
                    call_id, connected.max_allowed_minutes
                );
                self.metering.start(&connected).await;
                Ok(connected)
            }
            None => {
                // Lost the race: a concurrent accept or a failure trigger
                // moved the session first
                let current = self.load(call_id).await?;
                if current.status == CallStatus::Connected {
                    Ok(current)
                } else {
                    Err(AppError::InvalidTransition {
                        call_id: call_id.to_string(),
                        status: current.status.to_string(),
                    })
                }
            }
        }
    }

    /// Decline a ringing session
    pub async fn decline(&self, call_id: &str) -> AppResult<CallSession> {
        self.fail_unconnected(call_id, EndReason::Declined).await
    }

    /// Mark a ringing session as unanswered (ring timeout)
    pub async fn mark_no_answer(&self, call_id: &str) -> AppResult<CallSession> {
        self.fail_unconnected(call_id, EndReason::NoAnswer).await
    }

    /// End a session
    ///
    /// A connected session terminates with its final pro-rata minutes and
    /// settles; a still-ringing session is a caller cancel and takes the
    /// missed call path instead. Ending an already-terminal session is an
    /// idempotent no-op returning the recorded state.
    #[instrument(skip(self))]
    pub async fn end(&self, call_id: &str, reason: EndReason) -> AppResult<CallSession> {
        let session = self.load(call_id).await?;

        match session.status {
            CallStatus::Initiated => {
                // Caller hung up before the receiver answered
                self.fail_unconnected(call_id, EndReason::NoAnswer).await
            }
            CallStatus::Connected => {
                let now = Utc::now();
                let elapsed = session.elapsed_since_connect(now);

                let outcome = self
                    .session_repo
                    .finish(
                        call_id,
                        CallStatus::Connected,
                        CallStatus::Ended,
                        reason,
                        now,
                        elapsed,
                    )
                    .await?;

                self.metering.stop(call_id).await;

                if outcome.won() {
                    info!(
                        "Session {} ended ({}) after {} minutes",
                        call_id, reason, elapsed
                    );
                } else {
                    debug!("Session {} was already terminal", call_id);
                }

                // Settle on the loser path too: the racing winner may have
                // been a metering task aborted by stop() between its
                // transition and its own settle. Replays are idempotent.
                self.settlement.settle(call_id).await?;
                self.load(call_id).await
            }
            CallStatus::Ended if !session.payment_settled => {
                // Terminal but never settled: an earlier trigger crashed or
                // was aborted between its win and its settle
                warn!("Session {} ended unsettled, replaying settlement", call_id);
                self.settlement.settle(call_id).await?;
                self.load(call_id).await
            }
            CallStatus::Ended | CallStatus::Failed => {
                debug!("End of already-terminal session {} ignored", call_id);
                Ok(session)
            }
        }
    }

    /// Send a one-shot billed message
    ///
    /// Runs the full session lifecycle inline: the session connects,
    /// terminates, and settles at the flat message rate in one call.
    #[instrument(skip(self))]
    pub async fn send_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
    ) -> AppResult<(CallSession, SettlementResult)> {
        if sender_id == receiver_id {
            return Err(AppError::InvalidInput(
                "sender and receiver must differ".to_string(),
            ));
        }

        let sender = self.profile(sender_id).await?;
        let receiver = self.profile(receiver_id).await?;
        let lock = self
            .pricing
            .lock_for(&sender, &receiver, CallClass::Message)
            .await?;

        if lock.commission_kind.is_payable() && lock.rate_per_minute > Decimal::ZERO {
            let balance = self.wallet_repo.balance(sender_id).await?;
            if balance < lock.rate_per_minute {
                return Err(AppError::InsufficientBalance {
                    required: lock.rate_per_minute.to_string(),
                    available: balance.to_string(),
                });
            }
        }

        let session = CallSession::new(
            sender_id,
            receiver_id,
            CallClass::Message,
            lock.rate_per_minute,
            lock.commission_pct,
            lock.commission_kind,
            lock.pricing_version,
        );
        let session = self.session_repo.create(&session).await?;
        let call_id = session.call_id.clone();

        let now = Utc::now();
        let params = ConnectParams {
            connected_at: now,
            max_allowed_minutes: None,
        };
        self.session_repo
            .mark_connected(&call_id, params)
            .await?
            .ok_or_else(|| AppError::InvalidTransition {
                call_id: call_id.clone(),
                status: CallStatus::Initiated.to_string(),
            })?;

        self.session_repo
            .finish(
                &call_id,
                CallStatus::Connected,
                CallStatus::Ended,
                EndReason::Completed,
                now,
                Decimal::ZERO,
            )
            .await?;

        let result = self.settlement.settle(&call_id).await?;
        let session = self.load(&call_id).await?;

        info!(
            "Message session {} settled: {} coins from {} to {}",
            call_id, result.totals.total_coins_charged, sender_id, receiver_id
        );

        Ok((session, result))
    }

    /// Terminal sessions involving a user, newest-first
    pub async fn history_for(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<CallSession>> {
        self.session_repo
            .list_terminated_by_user(user_id, limit, offset)
            .await
    }

    /// Drive a never-connected session to `Failed` and record the miss
    async fn fail_unconnected(
        &self,
        call_id: &str,
        reason: EndReason,
    ) -> AppResult<CallSession> {
        let outcome = self
            .session_repo
            .finish(
                call_id,
                CallStatus::Initiated,
                CallStatus::Failed,
                reason,
                Utc::now(),
                Decimal::ZERO,
            )
            .await?;

        let session = outcome.session().clone();

        if outcome.won() {
            info!("Session {} failed without connecting ({})", call_id, reason);
            if reason.is_missed() {
                if let Err(e) = self.recorder.record(&session).await {
                    warn!("Failed to record missed call {}: {}", call_id, e);
                }
            }
        } else {
            debug!("Session {} already terminal", call_id);
        }

        Ok(session)
    }
}
