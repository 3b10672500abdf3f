//! Ledger Invariant Tests
//!
//! Balance bookkeeping across open/settle/expire sequences and the
//! optimistic concurrency guard on wallet writes.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use runledger::ledger::{
    ChargeOpt, CreditLedger, CreditWallet, EntryType, LedgerError, LedgerStore, LedgerWrite,
    MemoryLedgerStore, PendingTrxOpt, SettleOpt, StatusTransition, TrxStatus,
    WalletTransaction,
};

fn ledger() -> CreditLedger {
    CreditLedger::new(Arc::new(MemoryLedgerStore::new()))
}

fn fund(ledger: &CreditLedger, user_id: &str, amount: f64) {
    let wallet = ledger.get_or_create_wallet(user_id).unwrap();
    let trx = ledger
        .insert_pending_trx(PendingTrxOpt::new(wallet.id, amount, EntryType::Debit))
        .unwrap();
    ledger.settle_pending_trx(SettleOpt::new(trx)).unwrap();
}

/// Recompute balances from the transaction log and compare with the wallet
fn assert_conserved(ledger: &CreditLedger, user_id: &str) {
    let wallet = ledger.get_or_create_wallet(user_id).unwrap();
    let trx = ledger.transactions(user_id).unwrap();

    let pending: f64 = trx
        .iter()
        .filter(|t| t.status == TrxStatus::Pending)
        .map(|t| t.amount)
        .sum();
    let settled: f64 = trx
        .iter()
        .filter(|t| t.ref_trx_id.is_some() && t.status == TrxStatus::Success)
        .map(|t| match t.entry_type {
            EntryType::Debit => t.amount,
            _ => -t.amount,
        })
        .sum();

    assert!(wallet.balance_pending >= 0.0);
    assert!((wallet.balance_pending - pending).abs() < 1e-9);
    assert!((wallet.balance - settled).abs() < 1e-9);
}

// =============================================================================
// Conservation
// =============================================================================

/// Open/settle interleavings keep wallet totals equal to the log.
#[test]
fn test_balances_match_transaction_log() {
    let ledger = ledger();
    let wallet = ledger.get_or_create_wallet("u1").unwrap();

    let a = ledger
        .insert_pending_trx(PendingTrxOpt::new(wallet.id, 3.0, EntryType::Debit))
        .unwrap();
    assert_conserved(&ledger, "u1");
    let b = ledger
        .insert_pending_trx(PendingTrxOpt::new(wallet.id, 1.5, EntryType::Debit))
        .unwrap();
    assert_conserved(&ledger, "u1");

    ledger.settle_pending_trx(SettleOpt::new(b)).unwrap();
    assert_conserved(&ledger, "u1");

    let spend = ledger
        .insert_pending_trx(PendingTrxOpt::new(wallet.id, 1.0, EntryType::Credit))
        .unwrap();
    ledger.settle_pending_trx(SettleOpt::new(spend)).unwrap();
    assert_conserved(&ledger, "u1");

    ledger.settle_pending_trx(SettleOpt::new(a)).unwrap();
    assert_conserved(&ledger, "u1");

    let balance = ledger.get_balance("u1").unwrap();
    assert_eq!(balance.balance, 3.5);
    assert_eq!(balance.pending_balance, 0.0);
}

/// Settling twice never double-counts.
#[test]
fn test_double_settle_rejected() {
    let ledger = ledger();
    let wallet = ledger.get_or_create_wallet("u1").unwrap();
    let trx = ledger
        .insert_pending_trx(PendingTrxOpt::new(wallet.id, 2.0, EntryType::Debit))
        .unwrap();

    ledger.settle_pending_trx(SettleOpt::new(trx)).unwrap();
    let err = ledger.settle_pending_trx(SettleOpt::new(trx)).unwrap_err();
    assert!(matches!(err, LedgerError::NotPending(_)));

    assert_conserved(&ledger, "u1");
    assert_eq!(ledger.get_balance("u1").unwrap().balance, 2.0);
}

#[test]
fn test_spend_beyond_balance_rejected() {
    let ledger = ledger();
    fund(&ledger, "u1", 1.0);
    let wallet = ledger.get_or_create_wallet("u1").unwrap();
    let spend = ledger
        .insert_pending_trx(PendingTrxOpt::new(wallet.id, 5.0, EntryType::Credit))
        .unwrap();

    let err = ledger.settle_pending_trx(SettleOpt::new(spend)).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    assert_conserved(&ledger, "u1");
}

// =============================================================================
// Expiry
// =============================================================================

#[test]
fn test_expired_pending_released() {
    let ledger = ledger();
    let wallet = ledger.get_or_create_wallet("u1").unwrap();
    let opened = Utc.with_ymd_and_hms(2020, 3, 1, 0, 0, 0).unwrap();

    let trx = ledger
        .insert_pending_trx(PendingTrxOpt {
            expired_at: Some(opened + Duration::hours(168)),
            timestamp: Some(opened),
            ..PendingTrxOpt::new(wallet.id, 2.0, EntryType::Debit)
        })
        .unwrap();

    // Not yet expired
    let early = ledger.expire_pending_trx(trx, opened + Duration::hours(1));
    assert!(matches!(early, Err(LedgerError::Validation(_))));

    let late = opened + Duration::hours(169);
    let settle = ledger.settle_pending_trx(SettleOpt {
        timestamp: Some(late),
        ..SettleOpt::new(trx)
    });
    assert!(matches!(settle, Err(LedgerError::Expired(_))));

    ledger.expire_pending_trx(trx, late).unwrap();
    assert_conserved(&ledger, "u1");

    let balance = ledger.get_balance("u1").unwrap();
    assert_eq!(balance.pending_balance, 0.0);
    assert_eq!(balance.balance, 0.0);
    assert_eq!(
        ledger.store().find_trx(trx).unwrap().unwrap().status,
        TrxStatus::Expired
    );
}

// =============================================================================
// Concurrency
// =============================================================================

fn pending_row(wallet: &CreditWallet, amount: f64) -> WalletTransaction {
    WalletTransaction {
        id: Uuid::new_v4(),
        wallet_id: wallet.id,
        balance: wallet.balance,
        balance_pending: wallet.balance_pending + amount,
        amount,
        entry_type: EntryType::Debit,
        status: TrxStatus::Pending,
        ref_trx_id: None,
        notes: None,
        created_at: Utc::now(),
        expired_at: None,
        version: wallet.version + 1,
    }
}

/// Two writers from the same snapshot: exactly one wins.
#[test]
fn test_stale_version_write_conflicts() {
    let ledger = ledger();
    let snapshot = ledger.get_or_create_wallet("u1").unwrap();

    let write = |amount: f64| {
        let mut next = snapshot.clone();
        next.balance_pending += amount;
        next.version += 1;
        LedgerWrite {
            insert: pending_row(&snapshot, amount),
            wallet: next,
            expected_version: snapshot.version,
            transition: None,
        }
    };

    let first = ledger.store().commit(write(1.0));
    let second = ledger.store().commit(write(2.0));

    assert!(first.is_ok());
    let err = second.unwrap_err();
    assert!(matches!(err, LedgerError::ConcurrencyConflict { .. }));
    assert_eq!(err.code(), "CRD011");

    let wallet = ledger.get_or_create_wallet("u1").unwrap();
    assert_eq!(wallet.version, snapshot.version + 1);
    assert_eq!(wallet.balance_pending, 1.0);
    assert_conserved(&ledger, "u1");
}

/// A settlement built from a stale wallet read writes nothing.
#[test]
fn test_stale_settlement_write_conflicts() {
    let ledger = ledger();
    let wallet = ledger.get_or_create_wallet("u1").unwrap();
    let trx = ledger
        .insert_pending_trx(PendingTrxOpt::new(wallet.id, 2.0, EntryType::Debit))
        .unwrap();
    let current = ledger.get_or_create_wallet("u1").unwrap();

    // Read before the pending row was opened
    let mut next = wallet.clone();
    next.balance = wallet.balance + 2.0;
    next.version = wallet.version + 1;
    let settlement = WalletTransaction {
        status: TrxStatus::Success,
        ref_trx_id: Some(trx),
        balance: next.balance,
        balance_pending: 0.0,
        ..pending_row(&wallet, 2.0)
    };
    let err = ledger
        .store()
        .commit(LedgerWrite {
            wallet: next,
            expected_version: wallet.version,
            insert: settlement,
            transition: Some(StatusTransition {
                trx_id: trx,
                from: TrxStatus::Pending,
                to: TrxStatus::Success,
            }),
        })
        .unwrap_err();
    assert_eq!(err.code(), "CRD011");

    assert_eq!(
        ledger.store().find_trx(trx).unwrap().unwrap().status,
        TrxStatus::Pending
    );
    let after = ledger.get_or_create_wallet("u1").unwrap();
    assert_eq!(after.version, current.version);
    assert_eq!(after.balance, current.balance);
    assert_eq!(after.balance_pending, current.balance_pending);
    assert_conserved(&ledger, "u1");
}

/// Two threads settling the same pending row: one settles, one is refused.
#[test]
fn test_concurrent_settle_single_winner() {
    for _ in 0..32 {
        let ledger = ledger();
        let wallet = ledger.get_or_create_wallet("u1").unwrap();
        let trx = ledger
            .insert_pending_trx(PendingTrxOpt::new(wallet.id, 3.0, EntryType::Debit))
            .unwrap();

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| scope.spawn(|| ledger.settle_pending_trx(SettleOpt::new(trx))))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.into_iter().filter_map(Result::err) {
            assert!(matches!(
                err,
                LedgerError::ConcurrencyConflict { .. }
                    | LedgerError::NotPending(_)
                    | LedgerError::AlreadySettled(_)
            ));
        }

        let balance = ledger.get_balance("u1").unwrap();
        assert_eq!(balance.balance, 3.0);
        assert_eq!(balance.pending_balance, 0.0);
        assert_conserved(&ledger, "u1");
    }
}

/// Check, charge with the returned version, settle.
#[test]
fn test_charge_with_checked_version() {
    let ledger = ledger();
    fund(&ledger, "u1", 4.0);

    let mut opt = ChargeOpt {
        user_id: "u1".into(),
        amount: 2.0,
        wallet_version: None,
    };
    let version = ledger.check_charge_amount(&opt).unwrap();
    opt.wallet_version = Some(version);

    let trx = ledger.charge(&opt).unwrap();
    ledger.settle_pending_trx(SettleOpt::new(trx)).unwrap();

    let balance = ledger.get_balance("u1").unwrap();
    assert_eq!(balance.balance, 2.0);
    assert_eq!(balance.pending_balance, 0.0);
    assert_conserved(&ledger, "u1");
}

#[test]
fn test_charge_check_insufficient() {
    let ledger = ledger();
    fund(&ledger, "u1", 1.0);

    let err = ledger
        .check_charge_amount(&ChargeOpt {
            user_id: "u1".into(),
            amount: 2.0,
            wallet_version: None,
        })
        .unwrap_err();
    assert_eq!(err.code(), "CRD010");
}
