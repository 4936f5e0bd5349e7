//! End-to-end billing flows over in-memory stores
//!
//! Exercises the full service stack: session lifecycle, metering
//! decisions, settlement splits, ledger conservation, and the race guards
//! around terminal transitions and settlement.

mod common;

use charla_core::{
    models::{CallClass, CallStatus, EndReason, LedgerEntry, LedgerEntryKind, PricingConfig},
    traits::{MissedCallRepository, SessionRepository, WalletRepository},
    AppError,
};
use charla_services::{MeteringService, TickDecision};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::harness;

#[tokio::test]
async fn test_full_video_call_flow() {
    let h = harness();
    h.wallets.seed_balance(1, dec!(1000));

    // Member 1 video-calls standard host 2 at 10 coins/min, 20% commission
    let session = h.manager.initiate(1, 2, CallClass::Video).await.unwrap();
    assert_eq!(session.status, CallStatus::Initiated);
    assert_eq!(session.rate_per_minute, dec!(10));
    assert_eq!(session.commission_pct, dec!(20));

    let connected = h.manager.accept(&session.call_id).await.unwrap();
    assert_eq!(connected.status, CallStatus::Connected);
    // 1000 coins at 10/min affords 100 minutes
    assert_eq!(connected.max_allowed_minutes, Some(dec!(100)));

    // Simulate a 3-minute conversation
    h.sessions.backdate_connect(&session.call_id, 3);
    h.metering.stop(&session.call_id).await;

    let ended = h
        .manager
        .end(&session.call_id, EndReason::UserDisconnected)
        .await
        .unwrap();
    assert_eq!(ended.status, CallStatus::Ended);
    assert_eq!(ended.end_reason, Some(EndReason::UserDisconnected));
    assert!(ended.payment_settled);
    assert_eq!(ended.total_coins_charged, dec!(30));
    assert_eq!(ended.commission_coins, dec!(6));
    assert_eq!(ended.receiver_earnings_coins, dec!(24));

    assert_eq!(h.wallets.current_balance(1), dec!(970));
    assert_eq!(h.wallets.current_balance(2), dec!(24));

    let entries = h.wallets.all_entries();
    assert_eq!(entries.len(), 2);
    let payment = entries
        .iter()
        .find(|e| e.kind == LedgerEntryKind::CallPayment)
        .unwrap();
    let earning = entries
        .iter()
        .find(|e| e.kind == LedgerEntryKind::CallEarning)
        .unwrap();
    assert_eq!(payment.amount, dec!(30));
    assert_eq!(payment.user_id, 1);
    assert_eq!(earning.amount, dec!(24));
    assert_eq!(earning.user_id, 2);
    assert_eq!(payment.related_call_id, earning.related_call_id);
}

#[tokio::test]
async fn test_metering_ends_call_on_insufficient_balance() {
    let h = harness();
    h.wallets.seed_balance(1, dec!(25));

    let session = h.manager.initiate(1, 2, CallClass::Video).await.unwrap();
    h.manager.accept(&session.call_id).await.unwrap();
    h.metering.stop(&session.call_id).await;

    // After ~3 minutes the caller owes 30 but holds only 25
    h.sessions.backdate_connect(&session.call_id, 3);
    let current = h
        .sessions
        .find_by_call_id(&session.call_id)
        .await
        .unwrap()
        .unwrap();

    let decision = MeteringService::tick_decision(&current, dec!(25), Utc::now(), dec!(240));
    let TickDecision::End {
        reason,
        billable_minutes,
    } = decision
    else {
        panic!("expected End decision");
    };
    assert_eq!(reason, EndReason::InsufficientBalance);
    assert_eq!(billable_minutes, dec!(2.5));

    // Drive the transition the way the metering loop does
    let outcome = h
        .sessions
        .finish(
            &session.call_id,
            CallStatus::Connected,
            CallStatus::Ended,
            reason,
            Utc::now(),
            billable_minutes,
        )
        .await
        .unwrap();
    assert!(outcome.won());

    let result = h.settlement.settle(&session.call_id).await.unwrap();
    assert_eq!(result.totals.total_coins_charged, dec!(25));
    assert_eq!(result.totals.commission_coins, dec!(5));
    assert_eq!(result.totals.receiver_earnings_coins, dec!(20));

    // Balance is fully drained, never negative
    assert_eq!(h.wallets.current_balance(1), Decimal::ZERO);
    assert_eq!(h.wallets.current_balance(2), dec!(20));
}

#[tokio::test]
async fn test_non_payable_call_moves_no_coins() {
    let h = harness();
    h.wallets.seed_balance(1, dec!(500));
    h.wallets.seed_balance(4, dec!(500));

    // Member calling member: metered but free
    let session = h.manager.initiate(1, 4, CallClass::Audio).await.unwrap();
    assert!(!session.is_billable());
    assert_eq!(session.commission_pct, Decimal::ZERO);

    let connected = h.manager.accept(&session.call_id).await.unwrap();
    // No balance ceiling on non-payable sessions
    assert_eq!(connected.max_allowed_minutes, None);
    h.metering.stop(&session.call_id).await;

    h.sessions.backdate_connect(&session.call_id, 5);
    let ended = h
        .manager
        .end(&session.call_id, EndReason::UserDisconnected)
        .await
        .unwrap();

    assert!(ended.payment_settled);
    // Duration is still priced for reporting, but no coins move
    assert_eq!(ended.total_coins_charged, dec!(25));
    assert_eq!(ended.commission_coins, Decimal::ZERO);
    assert_eq!(ended.receiver_earnings_coins, Decimal::ZERO);
    assert!(h.wallets.all_entries().is_empty());
    assert_eq!(h.wallets.current_balance(1), dec!(500));
    assert_eq!(h.wallets.current_balance(4), dec!(500));
}

#[tokio::test]
async fn test_declined_call_records_missed_call() {
    let h = harness();
    h.wallets.seed_balance(1, dec!(100));

    let session = h.manager.initiate(1, 2, CallClass::Audio).await.unwrap();
    let declined = h.manager.decline(&session.call_id).await.unwrap();

    assert_eq!(declined.status, CallStatus::Failed);
    assert_eq!(declined.end_reason, Some(EndReason::Declined));
    assert_eq!(declined.elapsed_minutes, Decimal::ZERO);
    assert!(h.wallets.all_entries().is_empty());

    let records = h.missed_calls.all_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].call_id, session.call_id);
    assert_eq!(records[0].reason, EndReason::Declined);
    assert_eq!(records[0].receiver_id, 2);
    assert!(!records[0].viewed);
}

#[tokio::test]
async fn test_no_answer_records_missed_call() {
    let h = harness();
    let session = h.manager.initiate(1, 2, CallClass::Video).await.unwrap();

    let failed = h.manager.mark_no_answer(&session.call_id).await.unwrap();
    assert_eq!(failed.status, CallStatus::Failed);
    assert_eq!(failed.end_reason, Some(EndReason::NoAnswer));

    let records = h.missed_calls.all_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason, EndReason::NoAnswer);

    // A replayed trigger is a no-op
    let again = h.manager.mark_no_answer(&session.call_id).await.unwrap();
    assert_eq!(again.status, CallStatus::Failed);
    assert_eq!(h.missed_calls.all_records().len(), 1);
}

#[tokio::test]
async fn test_caller_cancel_before_answer_is_no_answer() {
    let h = harness();
    let session = h.manager.initiate(1, 2, CallClass::Audio).await.unwrap();

    let ended = h
        .manager
        .end(&session.call_id, EndReason::UserDisconnected)
        .await
        .unwrap();
    assert_eq!(ended.status, CallStatus::Failed);
    assert_eq!(ended.end_reason, Some(EndReason::NoAnswer));
    assert_eq!(h.missed_calls.all_records().len(), 1);
}

#[tokio::test]
async fn test_concurrent_settlement_is_exactly_once() {
    let h = harness();
    h.wallets.seed_balance(1, dec!(1000));

    let session = h.manager.initiate(1, 2, CallClass::Video).await.unwrap();
    h.manager.accept(&session.call_id).await.unwrap();
    h.metering.stop(&session.call_id).await;
    h.sessions.backdate_connect(&session.call_id, 3);

    let now = Utc::now();
    h.sessions
        .finish(
            &session.call_id,
            CallStatus::Connected,
            CallStatus::Ended,
            EndReason::UserDisconnected,
            now,
            dec!(3),
        )
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        h.settlement.settle(&session.call_id),
        h.settlement.settle(&session.call_id)
    );
    let a = a.unwrap();
    let b = b.unwrap();

    // Both observe the same totals; at most one performed the settlement
    assert_eq!(a.totals.total_coins_charged, dec!(30));
    assert_eq!(b.totals.total_coins_charged, dec!(30));
    assert!(a.already_settled || b.already_settled);

    assert_eq!(h.wallets.all_entries().len(), 2);
    assert_eq!(h.wallets.current_balance(1), dec!(970));
    assert_eq!(h.wallets.current_balance(2), dec!(24));
}

#[tokio::test]
async fn test_replayed_settle_returns_recorded_totals() {
    let h = harness();
    h.wallets.seed_balance(1, dec!(1000));

    let session = h.manager.initiate(1, 2, CallClass::Video).await.unwrap();
    h.manager.accept(&session.call_id).await.unwrap();
    h.metering.stop(&session.call_id).await;
    h.sessions.backdate_connect(&session.call_id, 3);
    h.manager
        .end(&session.call_id, EndReason::UserDisconnected)
        .await
        .unwrap();

    let replay = h.settlement.settle(&session.call_id).await.unwrap();
    assert!(replay.already_settled);
    assert_eq!(replay.totals.total_coins_charged, dec!(30));
    assert_eq!(h.wallets.all_entries().len(), 2);
    assert_eq!(h.wallets.current_balance(1), dec!(970));
}

#[tokio::test]
async fn test_concurrent_end_single_terminal_transition() {
    let h = harness();
    h.wallets.seed_balance(1, dec!(1000));

    let session = h.manager.initiate(1, 2, CallClass::Audio).await.unwrap();
    h.manager.accept(&session.call_id).await.unwrap();
    h.metering.stop(&session.call_id).await;
    h.sessions.backdate_connect(&session.call_id, 2);

    let (a, b) = tokio::join!(
        h.manager.end(&session.call_id, EndReason::UserDisconnected),
        h.manager.end(&session.call_id, EndReason::AdminEnded)
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(a.status, CallStatus::Ended);
    assert_eq!(b.status, CallStatus::Ended);
    // One reason won; both callers see the same terminal record
    assert_eq!(a.end_reason, b.end_reason);

    // 2 minutes of standard audio at 5/min
    assert_eq!(h.wallets.current_balance(1), dec!(990));
    assert_eq!(h.wallets.all_entries().len(), 2);
}

#[tokio::test]
async fn test_end_settles_session_left_unsettled_by_aborted_trigger() {
    let h = harness();
    h.wallets.seed_balance(1, dec!(1000));

    let session = h.manager.initiate(1, 2, CallClass::Video).await.unwrap();
    h.manager.accept(&session.call_id).await.unwrap();
    h.metering.stop(&session.call_id).await;
    h.sessions.backdate_connect(&session.call_id, 3);

    // A trigger won the terminal transition but was cut down before its
    // settle ran, leaving the session terminal and unsettled
    let outcome = h
        .sessions
        .finish(
            &session.call_id,
            CallStatus::Connected,
            CallStatus::Ended,
            EndReason::UserDisconnected,
            Utc::now(),
            dec!(3),
        )
        .await
        .unwrap();
    assert!(outcome.won());
    assert!(!outcome.session().payment_settled);
    assert!(h.wallets.all_entries().is_empty());

    // A later end replays the settlement instead of returning the hole
    let ended = h
        .manager
        .end(&session.call_id, EndReason::UserDisconnected)
        .await
        .unwrap();

    assert!(ended.payment_settled);
    assert_eq!(ended.total_coins_charged, dec!(30));
    assert_eq!(h.wallets.all_entries().len(), 2);
    assert_eq!(h.wallets.current_balance(1), dec!(970));
    assert_eq!(h.wallets.current_balance(2), dec!(24));
}

#[tokio::test]
async fn test_settle_records_totals_the_ledger_actually_holds() {
    let h = harness();
    h.wallets.seed_balance(1, dec!(1000));

    let session = h.manager.initiate(1, 2, CallClass::Video).await.unwrap();
    h.manager.accept(&session.call_id).await.unwrap();
    h.metering.stop(&session.call_id).await;
    h.sessions.backdate_connect(&session.call_id, 3);

    h.sessions
        .finish(
            &session.call_id,
            CallStatus::Connected,
            CallStatus::Ended,
            EndReason::UserDisconnected,
            Utc::now(),
            dec!(3),
        )
        .await
        .unwrap();

    // An earlier settle run appended the full 30/24 split, then crashed
    // before flipping the flag
    h.wallets
        .append(&[
            LedgerEntry::call_payment(1, &session.call_id, dec!(30)),
            LedgerEntry::call_earning(2, &session.call_id, dec!(24)),
        ])
        .await
        .unwrap();

    // The balance has moved since; a fresh computation would cap at 12
    h.wallets.seed_balance(1, dec!(12));

    let result = h.settlement.settle(&session.call_id).await.unwrap();

    // The recorded totals agree with the entries on disk, not the replay's
    // own balance read
    assert_eq!(result.totals.total_coins_charged, dec!(30));
    assert_eq!(result.totals.commission_coins, dec!(6));
    assert_eq!(result.totals.receiver_earnings_coins, dec!(24));

    let settled = h
        .sessions
        .find_by_call_id(&session.call_id)
        .await
        .unwrap()
        .unwrap();
    assert!(settled.payment_settled);
    assert_eq!(settled.total_coins_charged, dec!(30));
    assert_eq!(h.wallets.all_entries().len(), 2);
}

#[tokio::test]
async fn test_decline_racing_accept_conflicts() {
    let h = harness();
    h.wallets.seed_balance(1, dec!(100));

    let session = h.manager.initiate(1, 2, CallClass::Audio).await.unwrap();
    h.manager.accept(&session.call_id).await.unwrap();
    h.metering.stop(&session.call_id).await;

    // The receiver's late decline cannot fail a connected session
    let result = h.manager.decline(&session.call_id).await;
    assert!(matches!(
        result,
        Err(AppError::InvalidTransition { .. })
    ));
    assert!(h.missed_calls.all_records().is_empty());
}

#[tokio::test]
async fn test_accept_requires_one_affordable_minute() {
    let h = harness();
    h.wallets.seed_balance(1, dec!(3));

    // Standard video costs 10/min; 3 coins cannot buy the first minute
    let session = h.manager.initiate(1, 2, CallClass::Video).await.unwrap();
    let result = h.manager.accept(&session.call_id).await;
    assert!(matches!(result, Err(AppError::InsufficientBalance { .. })));

    let current = h
        .sessions
        .find_by_call_id(&session.call_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.status, CallStatus::Initiated);
}

#[tokio::test]
async fn test_rates_frozen_at_initiation() {
    let h = harness();
    h.wallets.seed_balance(1, dec!(1000));

    let session = h.manager.initiate(1, 2, CallClass::Video).await.unwrap();
    assert_eq!(session.rate_per_minute, dec!(10));

    // Admin doubles the video rate mid-ring
    let new_config = PricingConfig {
        standard_video_rate: dec!(20),
        ..Default::default()
    };
    h.pricing.update(new_config).await.unwrap();

    h.manager.accept(&session.call_id).await.unwrap();
    h.metering.stop(&session.call_id).await;
    h.sessions.backdate_connect(&session.call_id, 3);
    let ended = h
        .manager
        .end(&session.call_id, EndReason::UserDisconnected)
        .await
        .unwrap();

    // Billed at the frozen rate, not the new one
    assert_eq!(ended.total_coins_charged, dec!(30));

    // A fresh session picks up the new rate and version
    let fresh = h.manager.initiate(1, 2, CallClass::Video).await.unwrap();
    assert_eq!(fresh.rate_per_minute, dec!(20));
    assert!(fresh.pricing_version > session.pricing_version);
}

#[tokio::test]
async fn test_tier_commission_split() {
    let h = harness();
    h.wallets.seed_balance(1, dec!(1000));

    // Tier A host: premium video at 15/min, 15% commission
    let session = h.manager.initiate(1, 3, CallClass::Video).await.unwrap();
    assert_eq!(session.rate_per_minute, dec!(15));
    assert_eq!(session.commission_pct, dec!(15));

    h.manager.accept(&session.call_id).await.unwrap();
    h.metering.stop(&session.call_id).await;
    h.sessions.backdate_connect(&session.call_id, 2);
    let ended = h
        .manager
        .end(&session.call_id, EndReason::UserDisconnected)
        .await
        .unwrap();

    // 30 coins at 15%: 4.5 rounds half-up to 5
    assert_eq!(ended.total_coins_charged, dec!(30));
    assert_eq!(ended.commission_coins, dec!(5));
    assert_eq!(ended.receiver_earnings_coins, dec!(25));
    assert_eq!(
        ended.commission_coins + ended.receiver_earnings_coins,
        ended.total_coins_charged
    );
}

#[tokio::test]
async fn test_message_flow() {
    let h = harness();
    h.wallets.seed_balance(1, dec!(10));

    let (session, result) = h.manager.send_message(1, 2).await.unwrap();
    assert_eq!(session.status, CallStatus::Ended);
    assert_eq!(session.end_reason, Some(EndReason::Completed));
    assert!(session.payment_settled);
    assert_eq!(result.totals.total_coins_charged, dec!(1));
    // 1 coin at 20% commission rounds to 0; the host keeps the coin
    assert_eq!(result.totals.commission_coins, Decimal::ZERO);
    assert_eq!(result.totals.receiver_earnings_coins, dec!(1));

    assert_eq!(h.wallets.current_balance(1), dec!(9));
    assert_eq!(h.wallets.current_balance(2), dec!(1));
}

#[tokio::test]
async fn test_message_rejected_without_balance() {
    let h = harness();
    h.wallets.seed_balance(1, dec!(0.5));

    let result = h.manager.send_message(1, 2).await;
    assert!(matches!(result, Err(AppError::InsufficientBalance { .. })));
    assert!(h.wallets.all_entries().is_empty());
}

#[tokio::test]
async fn test_non_payable_message_is_free() {
    let h = harness();

    let (session, result) = h.manager.send_message(2, 1).await.unwrap();
    assert!(!session.is_billable());
    assert_eq!(result.totals.commission_coins, Decimal::ZERO);
    assert_eq!(result.totals.receiver_earnings_coins, Decimal::ZERO);
    assert!(h.wallets.all_entries().is_empty());
}

#[tokio::test]
async fn test_partial_settlement_when_balance_drained_concurrently() {
    let h = harness();
    h.wallets.seed_balance(1, dec!(1000));

    let session = h.manager.initiate(1, 2, CallClass::Video).await.unwrap();
    h.manager.accept(&session.call_id).await.unwrap();
    h.metering.stop(&session.call_id).await;
    h.sessions.backdate_connect(&session.call_id, 3);

    // Another session drained the wallet to 12 before settlement ran
    h.wallets.seed_balance(1, dec!(12));

    let now = Utc::now();
    h.sessions
        .finish(
            &session.call_id,
            CallStatus::Connected,
            CallStatus::Ended,
            EndReason::UserDisconnected,
            now,
            dec!(3),
        )
        .await
        .unwrap();
    let result = h.settlement.settle(&session.call_id).await.unwrap();

    assert!(result.partial);
    assert_eq!(result.totals.total_coins_charged, dec!(12));
    assert_eq!(
        result.totals.commission_coins + result.totals.receiver_earnings_coins,
        dec!(12)
    );
    assert_eq!(h.wallets.current_balance(1), Decimal::ZERO);
}

#[tokio::test]
async fn test_self_call_rejected() {
    let h = harness();
    let result = h.manager.initiate(1, 1, CallClass::Audio).await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn test_unknown_user_rejected() {
    let h = harness();
    let result = h.manager.initiate(1, 99, CallClass::Audio).await;
    assert!(matches!(result, Err(AppError::UserNotFound(_))));
}

#[tokio::test]
async fn test_history_lists_terminal_sessions() {
    let h = harness();
    h.wallets.seed_balance(1, dec!(1000));

    let declined = h.manager.initiate(1, 2, CallClass::Audio).await.unwrap();
    h.manager.decline(&declined.call_id).await.unwrap();

    let ended = h.manager.initiate(1, 2, CallClass::Audio).await.unwrap();
    h.manager.accept(&ended.call_id).await.unwrap();
    h.metering.stop(&ended.call_id).await;
    h.sessions.backdate_connect(&ended.call_id, 1);
    h.manager
        .end(&ended.call_id, EndReason::UserDisconnected)
        .await
        .unwrap();

    // A ringing session is excluded
    h.manager.initiate(1, 2, CallClass::Audio).await.unwrap();

    let history = h.manager.history_for(1, 10, 0).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|s| s.is_terminal()));
}

#[tokio::test]
async fn test_missed_call_view_flow() {
    let h = harness();

    let session = h.manager.initiate(1, 2, CallClass::Audio).await.unwrap();
    h.manager.decline(&session.call_id).await.unwrap();

    let records = h.missed_calls.all_records();
    assert_eq!(records.len(), 1);
    let id = records[0].id;

    let unviewed = h.missed_calls.list_unviewed(2, 10).await.unwrap();
    assert_eq!(unviewed.len(), 1);

    assert!(h.missed_calls.mark_viewed(id).await.unwrap());
    let unviewed = h.missed_calls.list_unviewed(2, 10).await.unwrap();
    assert!(unviewed.is_empty());
}
