//! # Ledger Store
//!
//! Storage contract for wallets and their transactions. Every
//! balance-changing write goes through [`LedgerStore::commit`], which applies
//! the wallet update, the new transaction row and an optional status
//! transition as one unit, conditioned on the wallet version the caller read.

use uuid::Uuid;

use super::errors::LedgerResult;
use super::model::{CreditWallet, TrxStatus, WalletTransaction};

/// Status change on an existing transaction, applied only if the row is
/// still in `from`
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    pub trx_id: Uuid,
    pub from: TrxStatus,
    pub to: TrxStatus,
}

/// One atomic ledger write
#[derive(Debug, Clone)]
pub struct LedgerWrite {
    /// Wallet state after the write (version already incremented)
    pub wallet: CreditWallet,

    /// Version the caller read; the write affects nothing if it differs
    pub expected_version: u64,

    pub insert: WalletTransaction,

    pub transition: Option<StatusTransition>,
}

/// Wallet and transaction storage
pub trait LedgerStore: Send + Sync + std::fmt::Debug {
    fn find_wallet_by_user(&self, user_id: &str) -> LedgerResult<Option<CreditWallet>>;

    fn find_wallet(&self, wallet_id: Uuid) -> LedgerResult<Option<CreditWallet>>;

    fn find_trx(&self, trx_id: Uuid) -> LedgerResult<Option<WalletTransaction>>;

    /// Whether any transaction on the wallet references `trx_id`
    fn is_trx_referenced(&self, wallet_id: Uuid, trx_id: Uuid) -> LedgerResult<bool>;

    /// Transactions of a wallet in insertion order
    fn list_trx(&self, wallet_id: Uuid) -> LedgerResult<Vec<WalletTransaction>>;

    /// Insert a new wallet with its bookkeeping transaction. Returns the
    /// stored wallet, which is the existing one if the user already has a
    /// wallet.
    fn insert_wallet(
        &self,
        wallet: CreditWallet,
        init: WalletTransaction,
    ) -> LedgerResult<CreditWallet>;

    /// Apply a version-guarded write. Fails with `ConcurrencyConflict` and
    /// changes nothing if the stored version differs from
    /// `expected_version`.
    fn commit(&self, write: LedgerWrite) -> LedgerResult<()>;
}
