//! Journal errors

use fundtrail_core::RecordId;
use fundtrail_ledger::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid journal file {file} line {line}: {reason}")]
    InvalidFile {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("Sequence must be strictly increasing: last {last}, got {attempted}")]
    Sequence { last: u64, attempted: u64 },

    #[error("Duplicate record: {0}")]
    DuplicateRecord(RecordId),

    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("Journal lock poisoned")]
    Poisoned,
}

impl From<EventError> for StoreError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::Sequence { last, attempted } => {
                StoreError::NonMonotonicSequence { last, attempted }
            }
            EventError::DuplicateRecord(id) => StoreError::DuplicateRecord(id),
            EventError::RecordNotFound(id) => StoreError::RecordNotFound(id),
            EventError::Poisoned => StoreError::Poisoned,
            other => StoreError::Backend(other.to_string()),
        }
    }
}
