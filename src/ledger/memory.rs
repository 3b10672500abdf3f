//! # In-Memory Ledger Store
//!
//! A single mutex guards all state, so each commit is validated and applied
//! without interleaving.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use super::errors::{LedgerError, LedgerResult};
use super::model::{CreditWallet, WalletTransaction};
use super::store::{LedgerStore, LedgerWrite};

#[derive(Debug, Default)]
struct State {
    wallets: HashMap<Uuid, CreditWallet>,
    wallet_by_user: HashMap<String, Uuid>,
    trx: HashMap<Uuid, WalletTransaction>,
    trx_order: Vec<Uuid>,
}

impl State {
    fn push_trx(&mut self, trx: WalletTransaction) {
        self.trx_order.push(trx.id);
        self.trx.insert(trx.id, trx);
    }
}

#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: Mutex<State>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> LedgerResult<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Internal("Lock poisoned".into()))
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn find_wallet_by_user(&self, user_id: &str) -> LedgerResult<Option<CreditWallet>> {
        let state = self.lock()?;
        Ok(state
            .wallet_by_user
            .get(user_id)
            .and_then(|id| state.wallets.get(id))
            .cloned())
    }

    fn find_wallet(&self, wallet_id: Uuid) -> LedgerResult<Option<CreditWallet>> {
        Ok(self.lock()?.wallets.get(&wallet_id).cloned())
    }

    fn find_trx(&self, trx_id: Uuid) -> LedgerResult<Option<WalletTransaction>> {
        Ok(self.lock()?.trx.get(&trx_id).cloned())
    }

    fn is_trx_referenced(&self, wallet_id: Uuid, trx_id: Uuid) -> LedgerResult<bool> {
        Ok(self
            .lock()?
            .trx
            .values()
            .any(|t| t.wallet_id == wallet_id && t.ref_trx_id == Some(trx_id)))
    }

    fn list_trx(&self, wallet_id: Uuid) -> LedgerResult<Vec<WalletTransaction>> {
        let state = self.lock()?;
        Ok(state
            .trx_order
            .iter()
            .filter_map(|id| state.trx.get(id))
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect())
    }

    fn insert_wallet(
        &self,
        wallet: CreditWallet,
        init: WalletTransaction,
    ) -> LedgerResult<CreditWallet> {
        let mut state = self.lock()?;
        if let Some(existing) = state
            .wallet_by_user
            .get(&wallet.user_id)
            .and_then(|id| state.wallets.get(id))
        {
            return Ok(existing.clone());
        }

        state
            .wallet_by_user
            .insert(wallet.user_id.clone(), wallet.id);
        state.wallets.insert(wallet.id, wallet.clone());
        state.push_trx(init);
        Ok(wallet)
    }

    fn commit(&self, write: LedgerWrite) -> LedgerResult<()> {
        let mut state = self.lock()?;
        let wallet_id = write.wallet.id;

        // Validate everything before touching state
        let current = state
            .wallets
            .get(&wallet_id)
            .ok_or_else(|| LedgerError::WalletNotFound(wallet_id.to_string()))?;
        if current.version != write.expected_version {
            return Err(LedgerError::ConcurrencyConflict {
                wallet_id,
                expected: write.expected_version,
            });
        }

        if let Some(ref_id) = write.insert.ref_trx_id {
            let referenced = state
                .trx
                .values()
                .any(|t| t.wallet_id == wallet_id && t.ref_trx_id == Some(ref_id));
            if referenced {
                return Err(LedgerError::AlreadySettled(ref_id));
            }
        }

        if let Some(transition) = &write.transition {
            let trx = state
                .trx
                .get(&transition.trx_id)
                .ok_or(LedgerError::TrxNotFound(transition.trx_id))?;
            if trx.status != transition.from || !transition.from.can_transition_to(transition.to) {
                return Err(LedgerError::NotPending(transition.trx_id));
            }
        }

        // Apply
        if let Some(transition) = &write.transition {
            if let Some(trx) = state.trx.get_mut(&transition.trx_id) {
                trx.status = transition.to;
            }
        }
        state.push_trx(write.insert);
        state.wallets.insert(wallet_id, write.wallet);
        Ok(())
    }
}
