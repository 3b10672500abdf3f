//! # Credit Ledger
//!
//! Wallet balances with pending/settled bookkeeping. Every balance write is
//! version-guarded; a stale version surfaces as
//! [`LedgerError::ConcurrencyConflict`] and is never retried here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::errors::{LedgerError, LedgerResult};
use super::model::{
    BalanceResp, ChargeOpt, CreditWallet, EntryType, PendingTrxOpt, SettleOpt, TrxStatus,
    WalletTransaction,
};
use super::store::{LedgerStore, LedgerWrite, StatusTransition};

#[derive(Debug, Clone)]
pub struct CreditLedger {
    store: Arc<dyn LedgerStore>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Read the user's wallet, creating it at version 1 on first access
    pub fn get_or_create_wallet(&self, user_id: &str) -> LedgerResult<CreditWallet> {
        if user_id.is_empty() {
            return Err(LedgerError::Validation("user_id is required".into()));
        }
        if let Some(wallet) = self.store.find_wallet_by_user(user_id)? {
            return Ok(wallet);
        }

        let now = Utc::now();
        let wallet = CreditWallet::new(user_id, now);
        let init = WalletTransaction {
            id: Uuid::new_v4(),
            wallet_id: wallet.id,
            balance: 0.0,
            balance_pending: 0.0,
            amount: 0.0,
            entry_type: EntryType::Init,
            status: TrxStatus::Success,
            ref_trx_id: None,
            notes: Some("Init wallet".into()),
            created_at: now,
            expired_at: None,
            version: wallet.version,
        };

        let stored = self.store.insert_wallet(wallet, init).map_err(|e| {
            error!(user_id, error = %e, "Unable to persist wallet");
            e
        })?;
        info!(user_id, wallet_id = %stored.id, "Wallet created");
        Ok(stored)
    }

    pub fn get_balance(&self, user_id: &str) -> LedgerResult<BalanceResp> {
        let wallet = self.get_or_create_wallet(user_id)?;
        Ok(BalanceResp::from(&wallet))
    }

    /// Reserve `amount` in the wallet's pending balance
    pub fn insert_pending_trx(&self, opt: PendingTrxOpt) -> LedgerResult<Uuid> {
        if !opt.amount.is_finite() || opt.amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(opt.amount));
        }
        if opt.entry_type == EntryType::Init {
            return Err(LedgerError::Validation(
                "pending transactions must be debit or credit".into(),
            ));
        }

        let wallet = self
            .store
            .find_wallet(opt.wallet_id)?
            .ok_or_else(|| LedgerError::WalletNotFound(opt.wallet_id.to_string()))?;

        let timestamp = opt.timestamp.unwrap_or_else(Utc::now);
        let mut next = wallet.clone();
        next.balance_pending = wallet.balance_pending + opt.amount;
        next.version = wallet.version + 1;
        next.updated_at = timestamp;

        let trx = WalletTransaction {
            id: opt.id.unwrap_or_else(Uuid::new_v4),
            wallet_id: wallet.id,
            balance: next.balance,
            balance_pending: next.balance_pending,
            amount: opt.amount,
            entry_type: opt.entry_type,
            status: TrxStatus::Pending,
            ref_trx_id: None,
            notes: opt.notes,
            created_at: timestamp,
            expired_at: opt.expired_at,
            version: next.version,
        };
        let trx_id = trx.id;

        self.commit(LedgerWrite {
            wallet: next,
            expected_version: wallet.version,
            insert: trx,
            transition: None,
        })?;

        debug!(
            wallet_id = %wallet.id,
            trx_id = %trx_id,
            amount = opt.amount,
            version = wallet.version + 1,
            "Pending transaction opened"
        );
        Ok(trx_id)
    }

    /// Move a pending transaction into the settled balance
    pub fn settle_pending_trx(&self, opt: SettleOpt) -> LedgerResult<Uuid> {
        let timestamp = opt.timestamp.unwrap_or_else(Utc::now);

        let pending = self
            .store
            .find_trx(opt.trx_id)?
            .ok_or(LedgerError::TrxNotFound(opt.trx_id))?;
        if pending.status != TrxStatus::Pending {
            return Err(LedgerError::NotPending(pending.id));
        }
        if self.store.is_trx_referenced(pending.wallet_id, pending.id)? {
            return Err(LedgerError::AlreadySettled(pending.id));
        }
        if pending.is_expired_at(timestamp) {
            warn!(trx_id = %pending.id, "Pending transaction has expired");
            return Err(LedgerError::Expired(pending.id));
        }
        if !matches!(pending.entry_type, EntryType::Debit | EntryType::Credit) {
            return Err(LedgerError::InvalidEntryType(pending.id));
        }

        let wallet = self
            .store
            .find_wallet(pending.wallet_id)?
            .ok_or_else(|| LedgerError::WalletNotFound(pending.wallet_id.to_string()))?;
        if wallet.balance_pending <= 0.0 {
            return Err(LedgerError::PendingEmpty);
        }
        if wallet.balance_pending < pending.amount {
            return Err(LedgerError::PendingInsufficient {
                pending: wallet.balance_pending,
                amount: pending.amount,
            });
        }

        let mut next = wallet.clone();
        match pending.entry_type {
            EntryType::Debit => {
                next.balance = wallet.balance + pending.amount;
                if let Some(expires) = opt.expired_at {
                    next.balance_expiring = wallet.balance_expiring + pending.amount;
                    next.balance_expiring_at = Some(
                        wallet
                            .balance_expiring_at
                            .map_or(expires, |current| current.min(expires)),
                    );
                }
            }
            _ => {
                if wallet.balance < pending.amount {
                    return Err(LedgerError::InsufficientBalance {
                        balance: wallet.balance,
                        amount: pending.amount,
                    });
                }
                next.balance = wallet.balance - pending.amount;
                next.balance_expiring = wallet.balance_expiring.min(next.balance);
                if next.balance_expiring <= 0.0 {
                    next.balance_expiring = 0.0;
                    next.balance_expiring_at = None;
                }
            }
        }
        next.balance_pending = wallet.balance_pending - pending.amount;
        next.version = wallet.version + 1;
        next.updated_at = timestamp;

        let settlement = WalletTransaction {
            id: Uuid::new_v4(),
            wallet_id: wallet.id,
            balance: next.balance,
            balance_pending: next.balance_pending,
            amount: pending.amount,
            entry_type: pending.entry_type,
            status: TrxStatus::Success,
            ref_trx_id: Some(pending.id),
            notes: opt.notes,
            created_at: timestamp,
            expired_at: opt.expired_at,
            version: next.version,
        };
        let settlement_id = settlement.id;

        self.commit(LedgerWrite {
            wallet: next,
            expected_version: wallet.version,
            insert: settlement,
            transition: Some(StatusTransition {
                trx_id: pending.id,
                from: TrxStatus::Pending,
                to: TrxStatus::Success,
            }),
        })?;

        info!(
            wallet_id = %wallet.id,
            trx_id = %pending.id,
            amount = pending.amount,
            version = wallet.version + 1,
            "Pending transaction settled"
        );
        Ok(settlement_id)
    }

    /// Release an expired pending transaction from the pending balance
    pub fn expire_pending_trx(&self, trx_id: Uuid, now: DateTime<Utc>) -> LedgerResult<Uuid> {
        let pending = self
            .store
            .find_trx(trx_id)?
            .ok_or(LedgerError::TrxNotFound(trx_id))?;
        if pending.status != TrxStatus::Pending {
            return Err(LedgerError::NotPending(trx_id));
        }
        if !pending.is_expired_at(now) {
            return Err(LedgerError::Validation(format!(
                "transaction {} has not expired",
                trx_id
            )));
        }

        let wallet = self
            .store
            .find_wallet(pending.wallet_id)?
            .ok_or_else(|| LedgerError::WalletNotFound(pending.wallet_id.to_string()))?;
        if wallet.balance_pending < pending.amount {
            return Err(LedgerError::PendingInsufficient {
                pending: wallet.balance_pending,
                amount: pending.amount,
            });
        }

        let mut next = wallet.clone();
        next.balance_pending = wallet.balance_pending - pending.amount;
        next.version = wallet.version + 1;
        next.updated_at = now;

        let release = WalletTransaction {
            id: Uuid::new_v4(),
            wallet_id: wallet.id,
            balance: next.balance,
            balance_pending: next.balance_pending,
            amount: pending.amount,
            entry_type: pending.entry_type,
            status: TrxStatus::Expired,
            ref_trx_id: Some(pending.id),
            notes: Some("Pending transaction expired".into()),
            created_at: now,
            expired_at: None,
            version: next.version,
        };
        let release_id = release.id;

        self.commit(LedgerWrite {
            wallet: next,
            expected_version: wallet.version,
            insert: release,
            transition: Some(StatusTransition {
                trx_id,
                from: TrxStatus::Pending,
                to: TrxStatus::Expired,
            }),
        })?;

        info!(wallet_id = %wallet.id, trx_id = %trx_id, "Pending transaction expired");
        Ok(release_id)
    }

    /// Mark a pending transaction `Failed` and release its amount from the
    /// pending balance. Used to undo a reservation whose owning write failed.
    pub fn cancel_pending_trx(&self, trx_id: Uuid, reason: &str) -> LedgerResult<Uuid> {
        let pending = self
            .store
            .find_trx(trx_id)?
            .ok_or(LedgerError::TrxNotFound(trx_id))?;
        if pending.status != TrxStatus::Pending {
            return Err(LedgerError::NotPending(trx_id));
        }

        let wallet = self
            .store
            .find_wallet(pending.wallet_id)?
            .ok_or_else(|| LedgerError::WalletNotFound(pending.wallet_id.to_string()))?;
        if wallet.balance_pending < pending.amount {
            return Err(LedgerError::PendingInsufficient {
                pending: wallet.balance_pending,
                amount: pending.amount,
            });
        }

        let now = Utc::now();
        let mut next = wallet.clone();
        next.balance_pending = wallet.balance_pending - pending.amount;
        next.version = wallet.version + 1;
        next.updated_at = now;

        let release = WalletTransaction {
            id: Uuid::new_v4(),
            wallet_id: wallet.id,
            balance: next.balance,
            balance_pending: next.balance_pending,
            amount: pending.amount,
            entry_type: pending.entry_type,
            status: TrxStatus::Failed,
            ref_trx_id: Some(pending.id),
            notes: Some(reason.to_string()),
            created_at: now,
            expired_at: None,
            version: next.version,
        };
        let release_id = release.id;

        self.commit(LedgerWrite {
            wallet: next,
            expected_version: wallet.version,
            insert: release,
            transition: Some(StatusTransition {
                trx_id,
                from: TrxStatus::Pending,
                to: TrxStatus::Failed,
            }),
        })?;

        warn!(wallet_id = %wallet.id, trx_id = %trx_id, reason, "Pending transaction cancelled");
        Ok(release_id)
    }

    /// Check the settled balance covers `amount`; returns the wallet version
    /// to hold as an optimistic-lock token
    pub fn check_charge_amount(&self, opt: &ChargeOpt) -> LedgerResult<u64> {
        let wallet = self.get_or_create_wallet(&opt.user_id)?;
        if wallet.balance < opt.amount {
            return Err(LedgerError::InsufficientBalance {
                balance: wallet.balance,
                amount: opt.amount,
            });
        }
        Ok(wallet.version)
    }

    /// Open a pending credit (spend) for `amount`
    pub fn charge(&self, opt: &ChargeOpt) -> LedgerResult<Uuid> {
        let wallet = self.get_or_create_wallet(&opt.user_id)?;

        let stale = opt.wallet_version != Some(wallet.version);
        if stale && wallet.balance < opt.amount {
            return Err(LedgerError::InsufficientBalance {
                balance: wallet.balance,
                amount: opt.amount,
            });
        }

        self.insert_pending_trx(PendingTrxOpt::new(wallet.id, opt.amount, EntryType::Credit))
    }

    pub fn transactions(&self, user_id: &str) -> LedgerResult<Vec<WalletTransaction>> {
        let wallet = self.get_or_create_wallet(user_id)?;
        self.store.list_trx(wallet.id)
    }

    fn commit(&self, write: LedgerWrite) -> LedgerResult<()> {
        let wallet_id = write.wallet.id;
        self.store.commit(write).map_err(|e| {
            match &e {
                LedgerError::ConcurrencyConflict { expected, .. } => {
                    warn!(wallet_id = %wallet_id, version = expected, "Wallet update affected no rows")
                }
                other => error!(wallet_id = %wallet_id, error = %other, "Unable to persist ledger write"),
            }
            e
        })
    }
}
