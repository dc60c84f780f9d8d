//! Verification errors
//!
//! A hash mismatch is never an error; these cover failing to run a check.

use fundtrail_core::RecordId;
use fundtrail_ledger::StoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("Hash layer {layer} failed: {reason}")]
    Layer { layer: String, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
