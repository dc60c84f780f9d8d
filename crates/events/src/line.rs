//! Journal line format

use chrono::{DateTime, Utc};
use fundtrail_core::RecordId;
use fundtrail_ledger::{LedgerRecord, VendorProfile, VerificationStatus};
use serde::{Deserialize, Serialize};

/// One line of the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "line", rename_all = "snake_case")]
pub enum JournalLine {
    /// Vendor registration (or a later profile update)
    Vendor(VendorProfile),
    /// A committed ledger record, exactly as stamped
    Record(LedgerRecord),
    /// Verification status change for an earlier record
    Status {
        record_id: RecordId,
        status: VerificationStatus,
        at: DateTime<Utc>,
    },
}

impl JournalLine {
    /// UTC day the line is filed under
    pub fn date(&self) -> String {
        let at = match self {
            JournalLine::Vendor(vendor) => vendor.onboarded_at,
            JournalLine::Record(record) => record.created_at,
            JournalLine::Status { at, .. } => *at,
        };
        at.format("%Y-%m-%d").to_string()
    }
}
