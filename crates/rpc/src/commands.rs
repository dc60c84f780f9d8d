//! CLI commands

use fundtrail_core::{Amount, IdError, RecordId, RequestId, VendorId};
use fundtrail_ledger::{HoldBucket, LedgerError, LedgerRecord, RecordContext, VendorWallet};
use fundtrail_requests::{BudgetRequest, NewRequest, RequestError, RequestState, RequestStats};
use fundtrail_verify::{AuditReport, Verification, VerifyError};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::context::AppContext;

/// Errors surfaced by CLI commands
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Verify(#[from] VerifyError),
}

impl CommandError {
    /// Internal failures (storage, broken invariants) as opposed to
    /// user-correctable input or business-rule rejections
    pub fn is_fatal(&self) -> bool {
        match self {
            CommandError::InvalidId(_) | CommandError::Validation(_) => false,
            CommandError::Ledger(err) => ledger_fatal(err),
            CommandError::Request(err) => match err {
                RequestError::Ledger(err) => ledger_fatal(err),
                RequestError::Store(_) | RequestError::Poisoned => true,
                _ => false,
            },
            CommandError::Verify(err) => matches!(err, VerifyError::Store(_)),
        }
    }
}

fn ledger_fatal(err: &LedgerError) -> bool {
    err.is_fatal() || matches!(err, LedgerError::Store(_))
}

fn positive(amount: Decimal) -> Result<Amount, CommandError> {
    Amount::positive(amount).map_err(|e| CommandError::Validation(e.to_string()))
}

fn print_record(action: &str, record: &LedgerRecord) {
    println!(
        "✅ {} {} for {} (record: {}, seq: {})",
        action, record.amount, record.vendor_id, record.record_id, record.sequence
    );
}

/// Register a vendor with an empty wallet
pub async fn onboard_vendor(
    ctx: &AppContext,
    vendor_id: &str,
    name: &str,
) -> Result<VendorWallet, CommandError> {
    let vendor_id = VendorId::new(vendor_id)?;
    let wallet = ctx.ledger.onboard_vendor(vendor_id, name).await?;

    println!("✅ Onboarded vendor {} ({})", wallet.vendor_id(), wallet.display_name());
    Ok(wallet)
}

/// Submit a new budget request
pub async fn submit_request(
    ctx: &AppContext,
    input: NewRequest,
) -> Result<BudgetRequest, CommandError> {
    let request = ctx.requests.submit(input).await?;

    println!(
        "✅ Submitted {} for {} ({} / {})",
        request.request_id, request.amount, request.department, request.project
    );
    Ok(request)
}

/// Approve a pending request
pub async fn approve_request(
    ctx: &AppContext,
    request_id: &str,
    approver: &str,
) -> Result<BudgetRequest, CommandError> {
    let request_id = RequestId::new(request_id)?;
    let request = ctx.requests.approve(&request_id, approver).await?;

    println!("✅ Approved {} by {}", request.request_id, approver.trim());
    Ok(request)
}

/// Reject a pending request
pub async fn reject_request(
    ctx: &AppContext,
    request_id: &str,
    approver: &str,
    reason: &str,
) -> Result<BudgetRequest, CommandError> {
    let request_id = RequestId::new(request_id)?;
    let request = ctx.requests.reject(&request_id, approver, reason).await?;

    println!(
        "⛔ Rejected {}: {}",
        request.request_id,
        request.rejection_reason.as_deref().unwrap_or_default()
    );
    Ok(request)
}

/// Allocate funds for an approved request to a vendor
pub async fn allocate_funds(
    ctx: &AppContext,
    request_id: &str,
    vendor_id: &str,
    amount: Decimal,
) -> Result<BudgetRequest, CommandError> {
    let request_id = RequestId::new(request_id)?;
    let vendor_id = VendorId::new(vendor_id)?;
    let request = ctx.requests.allocate(&request_id, &vendor_id, amount).await?;

    println!(
        "✅ Allocated {} to {} for {} (record: {})",
        request.allocated_amount.unwrap_or_default(),
        request
            .assigned_vendor
            .as_ref()
            .map(VendorId::as_str)
            .unwrap_or("-"),
        request.request_id,
        request
            .allocation_record
            .as_ref()
            .map(RecordId::as_str)
            .unwrap_or("-")
    );
    Ok(request)
}

/// Mark an allocated request as in progress
pub async fn start_request(
    ctx: &AppContext,
    request_id: &str,
) -> Result<BudgetRequest, CommandError> {
    let request_id = RequestId::new(request_id)?;
    let request = ctx.requests.mark_in_progress(&request_id).await?;

    println!("✅ {} is now {}", request.request_id, request.state);
    Ok(request)
}

/// Complete a request, releasing its allocation to the vendor
pub async fn complete_request(
    ctx: &AppContext,
    request_id: &str,
    actor: &str,
) -> Result<BudgetRequest, CommandError> {
    let request_id = RequestId::new(request_id)?;
    let request = ctx.requests.complete(&request_id, actor).await?;

    println!(
        "✅ Completed {} ({} released to {})",
        request.request_id,
        request.allocated_amount.unwrap_or_default(),
        request
            .assigned_vendor
            .as_ref()
            .map(VendorId::as_str)
            .unwrap_or("-")
    );
    Ok(request)
}

/// Withdraw from a vendor's available balance
pub async fn withdraw(
    ctx: &AppContext,
    vendor_id: &str,
    amount: Decimal,
    actor: &str,
) -> Result<LedgerRecord, CommandError> {
    let vendor_id = VendorId::new(vendor_id)?;
    let amount = positive(amount)?;
    let record = ctx
        .ledger
        .withdraw(&vendor_id, amount, &RecordContext::new(actor))
        .await?;

    print_record("Withdrew", &record);
    Ok(record)
}

/// Place a compliance hold on part of a vendor's balance
pub async fn freeze(
    ctx: &AppContext,
    vendor_id: &str,
    amount: Decimal,
    source: HoldBucket,
    reason: &str,
    actor: &str,
) -> Result<LedgerRecord, CommandError> {
    let vendor_id = VendorId::new(vendor_id)?;
    let amount = positive(amount)?;
    let record = ctx
        .ledger
        .freeze(&vendor_id, amount, source, reason, &RecordContext::new(actor))
        .await?;

    print_record("Froze", &record);
    Ok(record)
}

/// Lift a compliance hold back into `target`
pub async fn unfreeze(
    ctx: &AppContext,
    vendor_id: &str,
    amount: Decimal,
    target: HoldBucket,
    actor: &str,
) -> Result<LedgerRecord, CommandError> {
    let vendor_id = VendorId::new(vendor_id)?;
    let amount = positive(amount)?;
    let record = ctx
        .ledger
        .unfreeze(&vendor_id, amount, target, &RecordContext::new(actor))
        .await?;

    print_record("Unfroze", &record);
    Ok(record)
}

/// Verify one ledger record against every hash layer
pub async fn verify_record(
    ctx: &AppContext,
    record_id: &str,
) -> Result<Verification, CommandError> {
    let record_id = RecordId::new(record_id)?;
    let verification = ctx.verifier.verify_record(&record_id).await?;

    match &verification.mismatch {
        None => println!("✅ {} verified", verification.record_id),
        Some(mismatch) => {
            println!(
                "❌ {} {} at {}",
                verification.record_id, verification.status, mismatch.location
            );
            println!("   expected: {}", mismatch.expected);
            println!("   actual:   {}", mismatch.actual);
        }
    }
    Ok(verification)
}

/// Verify every record and check the journal sequence
pub async fn audit(ctx: &AppContext) -> Result<AuditReport, CommandError> {
    let report = ctx.verifier.audit().await?;

    println!(
        "Audited {} records: {} verified, {} failed, {} drifted",
        report.records, report.verified, report.failed, report.drifted
    );
    for issue in &report.issues {
        println!("❌ {}", issue);
    }
    for verification in &report.mismatches {
        if let Some(mismatch) = &verification.mismatch {
            println!(
                "❌ {} {} at {}",
                verification.record_id, verification.status, mismatch.location
            );
        }
    }
    if report.is_clean() {
        println!("✅ Ledger verified");
    }
    Ok(report)
}

/// Show one vendor's buckets, or every wallet plus the pool
pub async fn wallet(
    ctx: &AppContext,
    vendor_id: Option<&str>,
) -> Result<Vec<VendorWallet>, CommandError> {
    let wallets = match vendor_id {
        Some(vendor_id) => {
            let vendor_id = VendorId::new(vendor_id)?;
            vec![ctx.ledger.wallet(&vendor_id).await?]
        }
        None => ctx.ledger.wallets().await?,
    };

    if wallets.is_empty() {
        println!("No vendors onboarded");
    } else {
        println!(
            "{:<16} | {:>14} | {:>14} | {:>14} | {:>14} | {:>14}",
            "Vendor", "Allocated", "Available", "Pending", "Withdrawn", "Frozen"
        );
        println!("{:-<100}", "");
        for wallet in &wallets {
            println!(
                "{:<16} | {:>14} | {:>14} | {:>14} | {:>14} | {:>14}",
                wallet.vendor_id().as_str(),
                wallet.allocated(),
                wallet.available(),
                wallet.pending(),
                wallet.withdrawn(),
                wallet.frozen(),
            );
        }
    }

    let ceiling = ctx.requests.config().budget_ceiling;
    println!(
        "Budget pool: {} allocated, {} remaining of {}",
        ctx.ledger.allocated_total().await?,
        ctx.ledger.remaining(ceiling).await?,
        ceiling
    );
    Ok(wallets)
}

/// List requests, optionally filtered by state
pub fn requests(
    ctx: &AppContext,
    state: Option<RequestState>,
) -> Result<(Vec<BudgetRequest>, RequestStats), CommandError> {
    let requests = ctx.requests.list(state)?;
    let stats = ctx.requests.stats()?;

    if requests.is_empty() {
        println!("No requests found");
    } else {
        println!(
            "{:<12} | {:<11} | {:>14} | {:<16} | {:<16}",
            "ID", "State", "Amount", "Department", "Vendor"
        );
        println!("{:-<82}", "");
        for request in &requests {
            println!(
                "{:<12} | {:<11} | {:>14} | {:<16} | {:<16}",
                request.request_id.as_str(),
                request.state.to_string(),
                request.amount.to_string(),
                request.department,
                request
                    .assigned_vendor
                    .as_ref()
                    .map(VendorId::as_str)
                    .unwrap_or("-"),
            );
        }
    }
    println!(
        "pending {} | approved {} | rejected {} | allocated {} | in-progress {} | completed {}",
        stats.pending,
        stats.approved,
        stats.rejected,
        stats.allocated,
        stats.in_progress,
        stats.completed
    );
    Ok((requests, stats))
}
