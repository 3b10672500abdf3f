//! # Credit Ledger Module
//!
//! Per-user credit wallets. Rewards and spends are opened as pending
//! transactions and later settled into the balance; all balance writes are
//! guarded by the wallet version.

pub mod errors;
pub mod memory;
pub mod model;
pub mod service;
pub mod store;

pub use errors::{LedgerError, LedgerResult};
pub use memory::MemoryLedgerStore;
pub use model::{
    BalanceResp, ChargeOpt, CreditWallet, EntryType, PendingTrxOpt, SettleOpt, TrxStatus,
    WalletTransaction,
};
pub use service::CreditLedger;
pub use store::{LedgerStore, LedgerWrite, StatusTransition};
