//! Ledger errors

use crate::store::StoreError;
use fundtrail_core::{AmountError, VendorId};
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Which balance an operation tried to draw from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BalanceSource {
    /// The budget pool (ceiling minus everything already allocated)
    Pool,
    Available,
    Pending,
    Frozen,
}

impl fmt::Display for BalanceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BalanceSource::Pool => "budget pool",
            BalanceSource::Available => "available",
            BalanceSource::Pending => "pending",
            BalanceSource::Frozen => "frozen",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Vendor wallet not found: {0}")]
    VendorNotFound(VendorId),

    #[error("Vendor wallet already exists: {0}")]
    VendorExists(VendorId),

    #[error("Insufficient {bucket} balance: required {required}, available {available} (short {shortfall})")]
    InsufficientBalance {
        bucket: BalanceSource,
        required: Decimal,
        available: Decimal,
        shortfall: Decimal,
    },

    #[error("Conservation invariant violated for {vendor_id}: {detail}")]
    InvariantViolation { vendor_id: VendorId, detail: String },

    #[error("Timed out after {timeout_ms}ms waiting for lock on {resource}")]
    LockTimeout { resource: String, timeout_ms: u64 },

    #[error("Replay failed at sequence {sequence}: {reason}")]
    Replay { sequence: u64, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Build an insufficient-balance error with the shortfall filled in
    pub fn insufficient(bucket: BalanceSource, required: Decimal, available: Decimal) -> Self {
        let shortfall = if required > available {
            required - available
        } else {
            Decimal::ZERO
        };
        LedgerError::InsufficientBalance {
            bucket,
            required,
            available,
            shortfall,
        }
    }

    /// A broken ledger guarantee rather than a caller mistake.
    ///
    /// Fatal errors are escalated, never shown as a normal failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerError::InvariantViolation { .. } | LedgerError::Replay { .. }
        )
    }
}

impl From<AmountError> for LedgerError {
    fn from(err: AmountError) -> Self {
        LedgerError::Validation(err.to_string())
    }
}
