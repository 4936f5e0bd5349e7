//! Settlement service implementation
//!
//! Converts a terminal session into wallet ledger entries exactly once.
//! The write order is crash-safe: the idempotent ledger append happens
//! first, and the session's `payment_settled` flag is flipped last, so a
//! replay after a crash re-attempts the append (a no-op thanks to the
//! idempotency keys) and then completes the flag.

use charla_core::{
    models::{CallSession, CallStatus, LedgerEntry, LedgerEntryKind},
    traits::{
        NotificationDispatcher, SessionRepository, SettlementResult, SettlementTotals,
        WalletRepository,
    },
    AppError, AppResult,
};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Settlement service
///
/// Safe to call concurrently and to replay: the `payment_settled` CAS on
/// the session row elects a single winner, and every other caller reads
/// back the recorded totals.
pub struct SettlementService {
    session_repo: Arc<dyn SessionRepository>,
    wallet_repo: Arc<dyn WalletRepository>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl SettlementService {
    /// Create a new settlement service
    pub fn new(
        session_repo: Arc<dyn SessionRepository>,
        wallet_repo: Arc<dyn WalletRepository>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            session_repo,
            wallet_repo,
            notifier,
        }
    }

    /// Total coins owed for a session's final elapsed minutes
    ///
    /// Metered classes charge elapsed minutes at the frozen rate; messages
    /// charge the flat frozen rate. Rounded down to whole coins, never up.
    pub fn final_total(session: &CallSession) -> Decimal {
        session
            .projected_cost(session.elapsed_minutes)
            .round_dp_with_strategy(0, RoundingStrategy::ToZero)
    }

    /// Split a total into platform commission and receiver earnings
    ///
    /// Commission is rounded half-up to whole coins; earnings are the
    /// remainder, so the two always sum back to the total.
    pub fn commission_split(total: Decimal, commission_pct: Decimal) -> (Decimal, Decimal) {
        let commission = (total * commission_pct / Decimal::from(100))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        let earnings = total - commission;
        (commission, earnings)
    }

    /// Settle a terminal session, moving coins exactly once
    ///
    /// Returns the recorded totals whether this call performed the
    /// settlement or a previous one did. `partial` is set when the
    /// caller's live balance could not cover the full amount and the
    /// charge was capped at what remained.
    #[instrument(skip(self))]
    pub async fn settle(&self, call_id: &str) -> AppResult<SettlementResult> {
        let session = self
            .session_repo
            .find_by_call_id(call_id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(call_id.to_string()))?;

        if !session.is_terminal() {
            return Err(AppError::SettlementFailed(format!(
                "session {} is still {}",
                call_id, session.status
            )));
        }

        if session.payment_settled {
            debug!("Session {} already settled, returning recorded totals", call_id);
            return Ok(Self::recorded_result(&session));
        }

        let (mut totals, partial) = self.compute_totals(&session).await?;

        if totals.total_coins_charged > Decimal::ZERO && session.is_billable() {
            let mut entries = vec![LedgerEntry::call_payment(
                session.caller_id,
                call_id,
                totals.total_coins_charged,
            )];
            if totals.receiver_earnings_coins > Decimal::ZERO {
                entries.push(LedgerEntry::call_earning(
                    session.receiver_id,
                    call_id,
                    totals.receiver_earnings_coins,
                ));
            }

            let inserted = self.wallet_repo.append(&entries).await.map_err(|e| {
                error!("Ledger append failed for session {}: {}", call_id, e);
                e
            })?;
            debug!(
                "Ledger append for session {}: {} of {} entries inserted",
                call_id,
                inserted,
                entries.len()
            );

            if inserted < entries.len() as u64 {
                // A concurrent settle (or an earlier run that crashed before
                // flipping the flag) appended first, possibly from a
                // different balance read. The ledger is authoritative, so
                // record what it actually holds.
                totals = self.ledger_totals(call_id).await?;
                debug!(
                    "Reconciled session {} totals from the ledger: charged={}",
                    call_id, totals.total_coins_charged
                );
            }
        }

        let won = self.session_repo.record_settlement(call_id, totals).await?;
        if !won {
            // A concurrent settle flipped the flag first; its totals are
            // authoritative (the ledger keys made our append a no-op)
            debug!("Lost settlement race for session {}", call_id);
            let settled = self
                .session_repo
                .find_by_call_id(call_id)
                .await?
                .ok_or_else(|| AppError::SessionNotFound(call_id.to_string()))?;
            return Ok(Self::recorded_result(&settled));
        }

        info!(
            "Settled session {}: charged={}, commission={}, earnings={}, partial={}",
            call_id,
            totals.total_coins_charged,
            totals.commission_coins,
            totals.receiver_earnings_coins,
            partial
        );

        let result = SettlementResult {
            totals,
            partial,
            already_settled: false,
        };

        let mut settled = session;
        settled.total_coins_charged = totals.total_coins_charged;
        settled.commission_coins = totals.commission_coins;
        settled.receiver_earnings_coins = totals.receiver_earnings_coins;
        settled.payment_settled = true;
        self.notifier.call_settled(&settled, &result).await;

        Ok(result)
    }

    /// Compute the totals to record, capping at the caller's live balance
    async fn compute_totals(
        &self,
        session: &CallSession,
    ) -> AppResult<(SettlementTotals, bool)> {
        // Sessions that never connected carry zero elapsed minutes and
        // settle to zero across the board
        if session.status == CallStatus::Failed {
            return Ok((SettlementTotals::default(), false));
        }

        let mut total = Self::final_total(session);
        let mut partial = false;

        if !session.is_billable() || total <= Decimal::ZERO {
            // Duration is still recorded for reporting; no coins move
            let totals = SettlementTotals {
                total_coins_charged: total.max(Decimal::ZERO),
                commission_coins: Decimal::ZERO,
                receiver_earnings_coins: Decimal::ZERO,
            };
            return Ok((totals, false));
        }

        let balance = self.wallet_repo.balance(session.caller_id).await?;
        if balance < total {
            warn!(
                "Partial settlement for session {}: owed {}, balance {}",
                session.call_id, total, balance
            );
            total = balance
                .max(Decimal::ZERO)
                .round_dp_with_strategy(0, RoundingStrategy::ToZero);
            partial = true;
        }

        let (commission, earnings) = Self::commission_split(total, session.commission_pct);

        Ok((
            SettlementTotals {
                total_coins_charged: total,
                commission_coins: commission,
                receiver_earnings_coins: earnings,
            },
            partial,
        ))
    }

    /// Totals as the ledger actually recorded them for a call
    ///
    /// Commission is derived as the difference, so the conservation law
    /// holds against the entries on disk rather than a recomputation.
    async fn ledger_totals(&self, call_id: &str) -> AppResult<SettlementTotals> {
        let entries = self.wallet_repo.entries_for_call(call_id).await?;

        let charged: Decimal = entries
            .iter()
            .filter(|e| e.kind == LedgerEntryKind::CallPayment)
            .map(|e| e.amount)
            .sum();
        let earnings: Decimal = entries
            .iter()
            .filter(|e| e.kind == LedgerEntryKind::CallEarning)
            .map(|e| e.amount)
            .sum();

        Ok(SettlementTotals {
            total_coins_charged: charged,
            commission_coins: charged - earnings,
            receiver_earnings_coins: earnings,
        })
    }

    fn recorded_result(session: &CallSession) -> SettlementResult {
        SettlementResult {
            totals: SettlementTotals {
                total_coins_charged: session.total_coins_charged,
                commission_coins: session.commission_coins,
                receiver_earnings_coins: session.receiver_earnings_coins,
            },
            partial: false,
            already_settled: true,
        }
    }
}
