//! Integration tests for Fundtrail
//!
//! These drive the full stack through the CLI commands: request lifecycle,
//! wallet ledger, JSONL journal and verification.

use fundtrail_bus::MemoryPort;
use fundtrail_core::Amount;
use fundtrail_ledger::{
    BalanceSource, HoldBucket, LedgerError, LedgerStore, RecordKind, VerificationStatus,
};
use fundtrail_requests::{NewRequest, Priority, RequestError, RequestState};
use fundtrail_rpc::{commands, AppConfig, AppContext, CommandError};
use fundtrail_verify::MismatchLocation;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn config() -> AppConfig {
    AppConfig {
        budget_ceiling: dec!(100000),
        log_notifications: false,
        ..AppConfig::default()
    }
}

fn input(amount: Decimal) -> NewRequest {
    NewRequest {
        amount,
        department: "Engineering".to_string(),
        project: "Atlas".to_string(),
        category: "hardware".to_string(),
        priority: Priority::High,
        description: "build servers".to_string(),
        requester: "alice".to_string(),
    }
}

fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

/// Rewrite every journal file, replacing `from` with `to`
fn tamper_journal(journal_path: &Path, from: &str, to: &str) {
    let mut touched = 0;
    for entry in std::fs::read_dir(journal_path).unwrap() {
        let path = entry.unwrap().path();
        let content = std::fs::read_to_string(&path).unwrap();
        if content.contains(from) {
            std::fs::write(&path, content.replace(from, to)).unwrap();
            touched += 1;
        }
    }
    assert!(touched > 0, "nothing to tamper with");
}

/// Onboard acme, then submit, approve and allocate a request of `value`
async fn allocated_request(ctx: &AppContext, value: Decimal) -> String {
    commands::onboard_vendor(ctx, "acme", "Acme Servers")
        .await
        .unwrap();
    let request = commands::submit_request(ctx, input(value)).await.unwrap();
    let id = request.request_id.to_string();
    commands::approve_request(ctx, &id, "bob").await.unwrap();
    commands::allocate_funds(ctx, &id, "acme", value)
        .await
        .unwrap();
    id
}

/// Test: submit → approve → allocate → start → complete → withdraw → audit
#[tokio::test]
async fn test_full_workflow() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = AppContext::new(temp_dir.path(), config()).unwrap();
    let port = Arc::new(MemoryPort::new());
    ctx.bus.register(port.clone());

    commands::onboard_vendor(&ctx, "acme", "Acme Servers")
        .await
        .unwrap();

    let request = commands::submit_request(&ctx, input(dec!(50000)))
        .await
        .unwrap();
    assert_eq!(request.state, RequestState::Pending);
    let id = request.request_id.to_string();

    let request = commands::approve_request(&ctx, &id, "bob").await.unwrap();
    assert_eq!(request.state, RequestState::Approved);
    assert_eq!(request.approver.as_deref(), Some("bob"));

    let request = commands::allocate_funds(&ctx, &id, "acme", dec!(50000))
        .await
        .unwrap();
    assert_eq!(request.state, RequestState::Allocated);
    let allocation_id = request.allocation_record.clone().unwrap();

    let wallet = commands::wallet(&ctx, Some("acme")).await.unwrap().remove(0);
    assert_eq!(wallet.allocated().value(), dec!(50000));
    assert_eq!(wallet.pending().value(), dec!(50000));
    assert_eq!(wallet.available(), Amount::ZERO);

    let request = commands::start_request(&ctx, &id).await.unwrap();
    assert_eq!(request.state, RequestState::InProgress);

    let request = commands::complete_request(&ctx, &id, "carol").await.unwrap();
    assert_eq!(request.state, RequestState::Completed);

    let wallet = commands::wallet(&ctx, Some("acme")).await.unwrap().remove(0);
    assert_eq!(wallet.pending(), Amount::ZERO);
    assert_eq!(wallet.available().value(), dec!(50000));

    // The whole available balance can be withdrawn, not a cent more
    let withdrawal = commands::withdraw(&ctx, "acme", dec!(50000), "acme-finance")
        .await
        .unwrap();
    assert_eq!(withdrawal.kind, RecordKind::Withdrawal);
    assert_eq!(withdrawal.sequence, 3);
    let err = commands::withdraw(&ctx, "acme", dec!(0.01), "acme-finance")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CommandError::Ledger(LedgerError::InsufficientBalance {
            bucket: BalanceSource::Available,
            ..
        })
    ));

    let wallet = ctx
        .ledger
        .wallet(&"acme".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(wallet.allocated().value(), dec!(50000));
    assert_eq!(wallet.available(), Amount::ZERO);
    assert_eq!(wallet.pending(), Amount::ZERO);
    assert_eq!(wallet.withdrawn().value(), dec!(50000));
    assert!(wallet.check_conservation().is_ok());

    // Allocation record carries the request's attribution
    let record = ctx.journal.record(&allocation_id).unwrap().unwrap();
    assert_eq!(record.kind, RecordKind::Allocation);
    assert_eq!(record.department, "Engineering");
    assert_eq!(record.approved_by, "bob");
    assert_eq!(record.vendor_name, "Acme Servers");
    assert_eq!(record.verification_status, VerificationStatus::Pending);

    let verification = commands::verify_record(&ctx, allocation_id.as_str())
        .await
        .unwrap();
    assert!(verification.matched);
    assert_eq!(verification.status, VerificationStatus::Verified);
    assert_eq!(
        verification.hashes.reader.as_deref(),
        Some(record.data_hash.as_str())
    );

    let report = commands::audit(&ctx).await.unwrap();
    assert_eq!(report.records, 3);
    assert_eq!(report.verified, 3);
    assert!(report.is_clean());

    let record = ctx.journal.record(&allocation_id).unwrap().unwrap();
    assert_eq!(record.verification_status, VerificationStatus::Verified);

    let types = port.event_types();
    for expected in [
        "vendor.onboarded",
        "request.submitted",
        "request.approved",
        "request.allocated",
        "request.in_progress",
        "request.completed",
        "ledger.mutation",
        "record.verified",
    ] {
        assert!(types.iter().any(|t| t == expected), "missing {expected}");
    }
    assert_eq!(port.count("ledger.mutation"), 3);
}

/// Test: an allocation whose request save failed is picked up on reopen
#[tokio::test]
async fn test_reopen_recovers_unsaved_allocation() {
    let temp_dir = TempDir::new().unwrap();
    let db = rusqlite::Connection::open(temp_dir.path().join("requests.db")).unwrap();

    let id = {
        let ctx = AppContext::new(temp_dir.path(), config()).unwrap();
        commands::onboard_vendor(&ctx, "acme", "Acme Servers")
            .await
            .unwrap();
        let request = commands::submit_request(&ctx, input(dec!(30000)))
            .await
            .unwrap();
        let id = request.request_id.to_string();
        commands::approve_request(&ctx, &id, "bob").await.unwrap();

        db.execute_batch(
            "CREATE TRIGGER fail_allocated BEFORE UPDATE ON budget_requests
             WHEN NEW.state = 'allocated'
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .unwrap();
        let err = commands::allocate_funds(&ctx, &id, "acme", dec!(30000))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(ctx.last_sequence().unwrap(), 1);
        id
    };
    db.execute_batch("DROP TRIGGER fail_allocated;").unwrap();

    let ctx = AppContext::new(temp_dir.path(), config()).unwrap();
    let (allocated, _) = commands::requests(&ctx, Some(RequestState::Allocated)).unwrap();
    assert_eq!(allocated.len(), 1);
    assert_eq!(allocated[0].request_id.as_str(), id);
    assert_eq!(allocated[0].allocated_amount, Some(amount(dec!(30000))));

    let err = commands::allocate_funds(&ctx, &id, "acme", dec!(30000))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CommandError::Request(RequestError::InvalidTransition { .. })
    ));
    assert_eq!(
        ctx.ledger.allocated_total().await.unwrap().value(),
        dec!(30000)
    );
    assert_eq!(ctx.last_sequence().unwrap(), 1);
}

/// Test: state survives a restart and the sequence continues
#[tokio::test]
async fn test_replay_across_restart() {
    let temp_dir = TempDir::new().unwrap();

    let id = {
        let ctx = AppContext::new(temp_dir.path(), config()).unwrap();
        let id = allocated_request(&ctx, dec!(40000)).await;
        assert_eq!(ctx.last_sequence().unwrap(), 1);
        id
    };

    let ctx = AppContext::new(temp_dir.path(), config()).unwrap();
    assert_eq!(ctx.last_sequence().unwrap(), 1);
    assert_eq!(
        ctx.ledger.allocated_total().await.unwrap().value(),
        dec!(40000)
    );

    let wallets = commands::wallet(&ctx, None).await.unwrap();
    assert_eq!(wallets.len(), 1);
    assert_eq!(wallets[0].pending().value(), dec!(40000));

    let request = commands::complete_request(&ctx, &id, "carol").await.unwrap();
    assert_eq!(request.state, RequestState::Completed);
    assert_eq!(ctx.last_sequence().unwrap(), 2);

    let (listed, stats) = commands::requests(&ctx, Some(RequestState::Completed)).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.pending, 0);
}

/// Test: the pool ceiling is shared by every vendor and request
#[tokio::test]
async fn test_budget_ceiling() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = AppContext::new(temp_dir.path(), config()).unwrap();
    allocated_request(&ctx, dec!(80000)).await;

    commands::onboard_vendor(&ctx, "globex", "Globex")
        .await
        .unwrap();
    let second = commands::submit_request(&ctx, input(dec!(30000)))
        .await
        .unwrap();
    let id = second.request_id.to_string();
    commands::approve_request(&ctx, &id, "bob").await.unwrap();

    let err = commands::allocate_funds(&ctx, &id, "globex", dec!(30000))
        .await
        .unwrap_err();
    match err {
        CommandError::Request(RequestError::Ledger(LedgerError::InsufficientBalance {
            bucket,
            shortfall,
            ..
        })) => {
            assert_eq!(bucket, BalanceSource::Pool);
            assert_eq!(shortfall, dec!(10000));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Nothing moved
    let request = ctx.requests.get(&second.request_id).unwrap();
    assert_eq!(request.state, RequestState::Approved);
    assert_eq!(ctx.last_sequence().unwrap(), 1);

    // A partial allocation within the headroom still works
    let request = commands::allocate_funds(&ctx, &id, "globex", dec!(20000))
        .await
        .unwrap();
    assert_eq!(request.allocated_amount, Some(amount(dec!(20000))));
    assert_eq!(
        ctx.ledger
            .remaining(ctx.requests.config().budget_ceiling)
            .await
            .unwrap(),
        Amount::ZERO
    );
}

/// Test: rejected requests never reach the ledger
#[tokio::test]
async fn test_reject_is_terminal() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = AppContext::new(temp_dir.path(), config()).unwrap();
    commands::onboard_vendor(&ctx, "acme", "Acme").await.unwrap();

    let request = commands::submit_request(&ctx, input(dec!(1000)))
        .await
        .unwrap();
    let id = request.request_id.to_string();

    let request = commands::reject_request(&ctx, &id, "bob", "out of scope")
        .await
        .unwrap();
    assert_eq!(request.state, RequestState::Rejected);
    assert_eq!(request.rejection_reason.as_deref(), Some("out of scope"));

    let err = commands::approve_request(&ctx, &id, "bob")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CommandError::Request(RequestError::InvalidTransition { .. })
    ));
    assert!(!err.is_fatal());
    assert_eq!(ctx.last_sequence().unwrap(), 0);
}

/// Test: a hold moves funds into frozen and back
#[tokio::test]
async fn test_freeze_and_unfreeze() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = AppContext::new(temp_dir.path(), config()).unwrap();
    allocated_request(&ctx, dec!(10000)).await;

    let record = commands::freeze(
        &ctx,
        "acme",
        dec!(4000),
        HoldBucket::Pending,
        "compliance review",
        "compliance",
    )
    .await
    .unwrap();
    assert!(matches!(record.kind, RecordKind::Freeze { .. }));

    let wallet = ctx.ledger.wallet(&"acme".parse().unwrap()).await.unwrap();
    assert_eq!(wallet.pending().value(), dec!(6000));
    assert_eq!(wallet.frozen().value(), dec!(4000));

    let err = commands::unfreeze(&ctx, "acme", dec!(5000), HoldBucket::Available, "compliance")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CommandError::Ledger(LedgerError::InsufficientBalance {
            bucket: BalanceSource::Frozen,
            ..
        })
    ));

    commands::unfreeze(&ctx, "acme", dec!(4000), HoldBucket::Available, "compliance")
        .await
        .unwrap();
    let wallet = ctx.ledger.wallet(&"acme".parse().unwrap()).await.unwrap();
    assert_eq!(wallet.frozen(), Amount::ZERO);
    assert_eq!(wallet.available().value(), dec!(4000));
    assert_eq!(wallet.allocated().value(), dec!(10000));
    assert!(wallet.check_conservation().is_ok());

    // Holds survive a restart
    drop(ctx);
    let ctx = AppContext::new(temp_dir.path(), config()).unwrap();
    let wallet = ctx.ledger.wallet(&"acme".parse().unwrap()).await.unwrap();
    assert_eq!(wallet.available().value(), dec!(4000));
    assert_eq!(wallet.pending().value(), dec!(6000));
    assert_eq!(ctx.last_sequence().unwrap(), 3);
}

/// Test: editing the journal under a running context is reported as drift
#[tokio::test]
async fn test_journal_drift_detected() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = AppContext::new(temp_dir.path(), config()).unwrap();
    let id = allocated_request(&ctx, dec!(25000)).await;
    let request = ctx.requests.get(&id.parse().unwrap()).unwrap();
    let record_id = request.allocation_record.unwrap();

    tamper_journal(ctx.journal_path(), "\"project\":\"Atlas\"", "\"project\":\"Apollo\"");

    let verification = commands::verify_record(&ctx, record_id.as_str())
        .await
        .unwrap();
    assert!(!verification.matched);
    assert_eq!(verification.status, VerificationStatus::Drifted);

    let mismatch = verification.mismatch.unwrap();
    assert_eq!(mismatch.location, MismatchLocation::StoredReader);
    assert_eq!(mismatch.location.to_string(), "layerB-layerC");
    assert_eq!(mismatch.expected, verification.hashes.stored);
    assert_ne!(mismatch.actual, mismatch.expected);
    assert_eq!(verification.hashes.creator, verification.hashes.stored);

    let report = commands::audit(&ctx).await.unwrap();
    assert_eq!(report.drifted, 1);
    assert!(!report.is_clean());
}

/// Test: a journal tampered with while offline fails verification on reopen
#[tokio::test]
async fn test_tampered_journal_fails_on_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let record_id = {
        let ctx = AppContext::new(temp_dir.path(), config()).unwrap();
        let id = allocated_request(&ctx, dec!(25000)).await;
        let request = ctx.requests.get(&id.parse().unwrap()).unwrap();
        tamper_journal(
            ctx.journal_path(),
            "\"department\":\"Engineering\"",
            "\"department\":\"Marketing\"",
        );
        request.allocation_record.unwrap()
    };

    let ctx = AppContext::new(temp_dir.path(), config()).unwrap();

    // Balances are untouched, so replay still succeeds
    assert_eq!(
        ctx.ledger.allocated_total().await.unwrap().value(),
        dec!(25000)
    );

    let verification = commands::verify_record(&ctx, record_id.as_str())
        .await
        .unwrap();
    assert_eq!(verification.status, VerificationStatus::Failed);
    let mismatch = verification.mismatch.unwrap();
    assert_eq!(mismatch.location, MismatchLocation::CreatorStored);
    assert_eq!(mismatch.location.to_string(), "layerA-layerB");

    let record = ctx.journal.record(&record_id).unwrap().unwrap();
    assert_eq!(record.verification_status, VerificationStatus::Failed);
}

/// Test: bad input is rejected before anything is written
#[tokio::test]
async fn test_input_validation() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = AppContext::new(temp_dir.path(), config()).unwrap();

    let err = commands::onboard_vendor(&ctx, "   ", "Nobody")
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::InvalidId(_)));

    let err = commands::submit_request(&ctx, input(dec!(0)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CommandError::Request(RequestError::Validation(_))
    ));

    commands::onboard_vendor(&ctx, "acme", "Acme").await.unwrap();
    let err = commands::withdraw(&ctx, "acme", dec!(-5), "ops")
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::Validation(_)));

    let err = commands::verify_record(&ctx, "TX-missing").await.unwrap_err();
    assert!(matches!(
        err,
        CommandError::Verify(fundtrail_verify::VerifyError::RecordNotFound(_))
    ));

    let (requests, stats) = commands::requests(&ctx, None).unwrap();
    assert!(requests.is_empty());
    assert_eq!(stats.pending, 0);
}
