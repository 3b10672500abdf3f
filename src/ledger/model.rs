//! # Ledger Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user credit wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditWallet {
    pub id: Uuid,
    pub user_id: String,

    /// Settled balance
    pub balance: f64,

    /// Sum of open pending transactions
    pub balance_pending: f64,

    /// Portion of the settled balance that expires
    pub balance_expiring: f64,

    pub balance_expiring_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Optimistic concurrency token; incremented on every balance write
    pub version: u64,
}

impl CreditWallet {
    /// A fresh wallet at version 1
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            balance: 0.0,
            balance_pending: 0.0,
            balance_expiring: 0.0,
            balance_expiring_at: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Wallet bookkeeping entry
    Init,
    /// Adds to the balance (rewards)
    Debit,
    /// Takes from the balance (spends)
    Credit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrxStatus {
    Pending,
    Success,
    Failed,
    Expired,
}

impl TrxStatus {
    /// Pending moves to a terminal status; terminal statuses never move
    pub fn can_transition_to(&self, next: TrxStatus) -> bool {
        matches!(
            (self, next),
            (
                TrxStatus::Pending,
                TrxStatus::Success | TrxStatus::Failed | TrxStatus::Expired
            )
        )
    }
}

/// Append-only ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,

    /// Wallet balance after this entry
    pub balance: f64,

    /// Wallet pending balance after this entry
    pub balance_pending: f64,

    pub amount: f64,
    pub entry_type: EntryType,
    pub status: TrxStatus,

    /// Pending transaction this entry settles or releases
    pub ref_trx_id: Option<Uuid>,

    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expired_at: Option<DateTime<Utc>>,

    /// Wallet version this entry was written at
    pub version: u64,
}

impl WalletTransaction {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expired_at.is_some_and(|exp| now > exp)
    }
}

/// Options for opening a pending transaction
#[derive(Debug, Clone)]
pub struct PendingTrxOpt {
    /// Caller-chosen id; generated when `None`
    pub id: Option<Uuid>,
    pub wallet_id: Uuid,
    pub amount: f64,
    pub entry_type: EntryType,
    pub notes: Option<String>,
    pub expired_at: Option<DateTime<Utc>>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl PendingTrxOpt {
    pub fn new(wallet_id: Uuid, amount: f64, entry_type: EntryType) -> Self {
        Self {
            id: None,
            wallet_id,
            amount,
            entry_type,
            notes: None,
            expired_at: None,
            timestamp: None,
        }
    }
}

/// Options for settling a pending transaction
#[derive(Debug, Clone)]
pub struct SettleOpt {
    pub trx_id: Uuid,
    pub notes: Option<String>,
    /// Expiry of the settled amount
    pub expired_at: Option<DateTime<Utc>>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl SettleOpt {
    pub fn new(trx_id: Uuid) -> Self {
        Self {
            trx_id,
            notes: None,
            expired_at: None,
            timestamp: None,
        }
    }
}

/// Options for a balance check or a charge
#[derive(Debug, Clone)]
pub struct ChargeOpt {
    pub user_id: String,
    pub amount: f64,
    /// Version returned by a prior balance check
    pub wallet_version: Option<u64>,
}

/// Balance view returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceResp {
    pub balance: f64,
    pub pending_balance: f64,
    pub expiring_balance: f64,
    /// Unix seconds; 0 when nothing expires
    pub expire_time: i64,
}

impl From<&CreditWallet> for BalanceResp {
    fn from(wallet: &CreditWallet) -> Self {
        Self {
            balance: wallet.balance,
            pending_balance: wallet.balance_pending,
            expiring_balance: wallet.balance_expiring,
            expire_time: wallet
                .balance_expiring_at
                .map(|t| t.timestamp())
                .unwrap_or(0),
        }
    }
}
