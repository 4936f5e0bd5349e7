//! In-memory repository implementations and service wiring for tests

use async_trait::async_trait;
use charla_core::{
    models::{
        CallSession, CallStatus, EndReason, LedgerEntry, MissedCallRecord, PricingConfig,
        ReceiverTier, UserKind, UserProfile,
    },
    traits::{
        ConnectParams, MissedCallRepository, PricingRepository, SessionRepository,
        SettlementTotals, TransitionOutcome, UserRepository, WalletRepository,
    },
    AppError, AppResult,
};
use charla_services::{
    LogNotifier, MeteringService, MissedCallRecorder, PricingService, SessionManager,
    SettlementService,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub struct MemorySessionRepository {
    sessions: Mutex<HashMap<String, CallSession>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Shift a session's connect timestamp into the past so elapsed-time
    /// computations see a call that has been running for `minutes`
    pub fn backdate_connect(&self, call_id: &str, minutes: i64) {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(call_id).expect("session exists");
        session.connected_at = Some(Utc::now() - Duration::minutes(minutes));
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn create(&self, session: &CallSession) -> AppResult<CallSession> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(session.call_id.clone(), session.clone());
        Ok(session.clone())
    }

    async fn find_by_call_id(&self, call_id: &str) -> AppResult<Option<CallSession>> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions.get(call_id).cloned())
    }

    async fn mark_connected(
        &self,
        call_id: &str,
        params: ConnectParams,
    ) -> AppResult<Option<CallSession>> {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(session) = sessions.get_mut(call_id) else {
            return Ok(None);
        };
        if session.status != CallStatus::Initiated {
            return Ok(None);
        }
        session.status = CallStatus::Connected;
        session.connected_at = Some(params.connected_at);
        session.max_allowed_minutes = params.max_allowed_minutes;
        session.updated_at = Utc::now();
        Ok(Some(session.clone()))
    }

    async fn update_elapsed(&self, call_id: &str, elapsed_minutes: Decimal) -> AppResult<()> {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(call_id) {
            if session.status == CallStatus::Connected {
                session.elapsed_minutes = session.elapsed_minutes.max(elapsed_minutes);
                session.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn finish(
        &self,
        call_id: &str,
        from: CallStatus,
        status: CallStatus,
        reason: EndReason,
        ended_at: DateTime<Utc>,
        elapsed_minutes: Decimal,
    ) -> AppResult<TransitionOutcome> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(call_id)
            .ok_or_else(|| AppError::SessionNotFound(call_id.to_string()))?;

        if session.status == from {
            session.status = status;
            session.end_reason = Some(reason);
            session.ended_at = Some(ended_at);
            session.elapsed_minutes = session.elapsed_minutes.max(elapsed_minutes);
            session.updated_at = Utc::now();
            Ok(TransitionOutcome::Won(session.clone()))
        } else if session.is_terminal() {
            Ok(TransitionOutcome::AlreadyTerminal(session.clone()))
        } else {
            Err(AppError::InvalidTransition {
                call_id: call_id.to_string(),
                status: session.status.to_string(),
            })
        }
    }

    async fn record_settlement(
        &self,
        call_id: &str,
        totals: SettlementTotals,
    ) -> AppResult<bool> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(call_id)
            .ok_or_else(|| AppError::SessionNotFound(call_id.to_string()))?;

        if session.payment_settled {
            return Ok(false);
        }
        session.payment_settled = true;
        session.total_coins_charged = totals.total_coins_charged;
        session.commission_coins = totals.commission_coins;
        session.receiver_earnings_coins = totals.receiver_earnings_coins;
        session.updated_at = Utc::now();
        Ok(true)
    }

    async fn list_terminated_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<CallSession>> {
        let sessions = self.sessions.lock().unwrap();
        let mut terminated: Vec<CallSession> = sessions
            .values()
            .filter(|s| s.is_terminal() && (s.caller_id == user_id || s.receiver_id == user_id))
            .cloned()
            .collect();
        terminated.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(terminated
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

struct WalletState {
    balances: HashMap<i64, Decimal>,
    entries: Vec<LedgerEntry>,
    seen_keys: HashSet<String>,
    next_id: i64,
}

pub struct MemoryWalletRepository {
    state: Mutex<WalletState>,
}

impl MemoryWalletRepository {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WalletState {
                balances: HashMap::new(),
                entries: Vec::new(),
                seen_keys: HashSet::new(),
                next_id: 1,
            }),
        }
    }

    pub fn seed_balance(&self, user_id: i64, balance: Decimal) {
        let mut state = self.state.lock().unwrap();
        state.balances.insert(user_id, balance);
    }

    pub fn current_balance(&self, user_id: i64) -> Decimal {
        let state = self.state.lock().unwrap();
        state.balances.get(&user_id).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn all_entries(&self) -> Vec<LedgerEntry> {
        let state = self.state.lock().unwrap();
        state.entries.clone()
    }
}

#[async_trait]
impl WalletRepository for MemoryWalletRepository {
    async fn balance(&self, user_id: i64) -> AppResult<Decimal> {
        Ok(self.current_balance(user_id))
    }

    async fn append(&self, entries: &[LedgerEntry]) -> AppResult<u64> {
        let mut state = self.state.lock().unwrap();
        let mut inserted = 0u64;
        for entry in entries {
            if !state.seen_keys.insert(entry.idempotency_key.clone()) {
                continue;
            }
            let mut entry = entry.clone();
            entry.id = state.next_id;
            state.next_id += 1;
            let delta = entry.signed_amount();
            *state.balances.entry(entry.user_id).or_insert(Decimal::ZERO) += delta;
            state.entries.push(entry);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn entries_for_call(&self, call_id: &str) -> AppResult<Vec<LedgerEntry>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .entries
            .iter()
            .filter(|e| e.related_call_id == call_id)
            .cloned()
            .collect())
    }

    async fn entries_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<LedgerEntry>> {
        let state = self.state.lock().unwrap();
        let mut entries: Vec<LedgerEntry> = state
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

pub struct MemoryPricingRepository {
    config: Mutex<Option<PricingConfig>>,
}

impl MemoryPricingRepository {
    pub fn new(config: PricingConfig) -> Self {
        Self {
            config: Mutex::new(Some(config)),
        }
    }
}

#[async_trait]
impl PricingRepository for MemoryPricingRepository {
    async fn load(&self) -> AppResult<Option<PricingConfig>> {
        Ok(self.config.lock().unwrap().clone())
    }

    async fn save(&self, config: &PricingConfig) -> AppResult<PricingConfig> {
        let mut stored = self.config.lock().unwrap();
        let version = stored.as_ref().map(|c| c.version + 1).unwrap_or(1);
        let mut saved = config.clone();
        saved.version = version;
        saved.updated_at = Utc::now();
        *stored = Some(saved.clone());
        Ok(saved)
    }
}

pub struct MemoryMissedCallRepository {
    records: Mutex<Vec<MissedCallRecord>>,
}

impl MemoryMissedCallRepository {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn all_records(&self) -> Vec<MissedCallRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl MissedCallRepository for MemoryMissedCallRepository {
    async fn insert(&self, record: &MissedCallRecord) -> AppResult<MissedCallRecord> {
        let mut records = self.records.lock().unwrap();
        if let Some(existing) = records.iter().find(|r| r.call_id == record.call_id) {
            return Ok(existing.clone());
        }
        let mut record = record.clone();
        record.id = records.len() as i64 + 1;
        records.push(record.clone());
        Ok(record)
    }

    async fn list_unviewed(
        &self,
        receiver_id: i64,
        limit: i64,
    ) -> AppResult<Vec<MissedCallRecord>> {
        let records = self.records.lock().unwrap();
        let mut unviewed: Vec<MissedCallRecord> = records
            .iter()
            .filter(|r| r.receiver_id == receiver_id && !r.viewed)
            .cloned()
            .collect();
        unviewed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        unviewed.truncate(limit as usize);
        Ok(unviewed)
    }

    async fn mark_viewed(&self, id: i64) -> AppResult<bool> {
        let mut records = self.records.lock().unwrap();
        for record in records.iter_mut() {
            if record.id == id {
                record.viewed = true;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

pub struct MemoryUserRepository {
    profiles: HashMap<i64, UserProfile>,
}

impl MemoryUserRepository {
    pub fn with_profiles(profiles: Vec<UserProfile>) -> Self {
        Self {
            profiles: profiles.into_iter().map(|p| (p.id, p)).collect(),
        }
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn profile(&self, user_id: i64) -> AppResult<Option<UserProfile>> {
        Ok(self.profiles.get(&user_id).cloned())
    }
}

pub fn profile(id: i64, kind: UserKind, tier: ReceiverTier) -> UserProfile {
    UserProfile { id, kind, tier }
}

/// Fully wired service stack over in-memory stores
///
/// Users: 1 and 4 are members, 2 is a standard host, 3 is a tier A host,
/// 5 is a tier B host.
pub struct Harness {
    pub sessions: Arc<MemorySessionRepository>,
    pub wallets: Arc<MemoryWalletRepository>,
    pub missed_calls: Arc<MemoryMissedCallRepository>,
    pub pricing: Arc<PricingService>,
    pub settlement: Arc<SettlementService>,
    pub metering: Arc<MeteringService>,
    pub manager: SessionManager,
}

pub fn harness() -> Harness {
    harness_with_config(PricingConfig::default())
}

pub fn harness_with_config(config: PricingConfig) -> Harness {
    let sessions = Arc::new(MemorySessionRepository::new());
    let wallets = Arc::new(MemoryWalletRepository::new());
    let missed_calls = Arc::new(MemoryMissedCallRepository::new());
    let users = Arc::new(MemoryUserRepository::with_profiles(vec![
        profile(1, UserKind::Member, ReceiverTier::Standard),
        profile(2, UserKind::Host, ReceiverTier::Standard),
        profile(3, UserKind::Host, ReceiverTier::TierA),
        profile(4, UserKind::Member, ReceiverTier::Standard),
        profile(5, UserKind::Host, ReceiverTier::TierB),
    ]));
    let notifier = Arc::new(LogNotifier);

    let pricing = Arc::new(PricingService::new(
        Arc::new(MemoryPricingRepository::new(config)),
        None,
        300,
    ));
    let settlement = Arc::new(SettlementService::new(
        sessions.clone() as Arc<dyn SessionRepository>,
        wallets.clone() as Arc<dyn WalletRepository>,
        notifier.clone(),
    ));
    let metering = Arc::new(MeteringService::new(
        sessions.clone() as Arc<dyn SessionRepository>,
        wallets.clone() as Arc<dyn WalletRepository>,
        settlement.clone(),
        60,
        240,
    ));
    let recorder = Arc::new(MissedCallRecorder::new(
        missed_calls.clone() as Arc<dyn MissedCallRepository>,
        notifier,
    ));
    let manager = SessionManager::new(
        sessions.clone() as Arc<dyn SessionRepository>,
        users,
        wallets.clone() as Arc<dyn WalletRepository>,
        pricing.clone(),
        metering.clone(),
        settlement.clone(),
        recorder,
        45,
    );

    Harness {
        sessions,
        wallets,
        missed_calls,
        pricing,
        settlement,
        metering,
        manager,
    }
}
