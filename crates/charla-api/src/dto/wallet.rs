//! Wallet and ledger DTOs

use charla_core::models::LedgerEntry;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Wallet balance response
#[derive(Debug, Clone, Serialize)]
pub struct WalletResponse {
    /// Wallet owner
    pub user_id: i64,

    /// Current committed balance in coins
    pub balance: Decimal,
}

/// Ledger entry response
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntryResponse {
    /// Entry identifier
    pub id: i64,

    /// Wallet owner
    pub user_id: i64,

    /// Entry kind
    pub kind: String,

    /// Coin amount, non-negative
    pub amount: Decimal,

    /// Signed balance delta
    pub signed_amount: Decimal,

    /// Call this entry settles
    pub related_call_id: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        let signed_amount = entry.signed_amount();
        Self {
            id: entry.id,
            user_id: entry.user_id,
            kind: entry.kind.to_string(),
            amount: entry.amount,
            signed_amount,
            related_call_id: entry.related_call_id,
            created_at: entry.created_at,
        }
    }
}
