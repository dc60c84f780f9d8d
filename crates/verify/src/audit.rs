//! Ledger-wide audit

use crate::service::Verification;
use chrono::{DateTime, Utc};
use fundtrail_ledger::{LedgerRecord, VerificationStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A structural problem found in the record sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum AuditIssue {
    /// Sequence numbers must run 1, 2, 3, ... without holes or repeats
    SequenceGap { expected: u64, found: u64 },
    /// A later record carries an earlier commit time
    TimeRegression {
        sequence: u64,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
}

impl fmt::Display for AuditIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditIssue::SequenceGap { expected, found } => {
                write!(f, "sequence gap: expected {expected}, found {found}")
            }
            AuditIssue::TimeRegression {
                sequence,
                previous,
                current,
            } => write!(
                f,
                "time regression at sequence {sequence}: {current} is before {previous}"
            ),
        }
    }
}

/// Check sequence continuity and commit-time ordering
pub fn check_sequence(records: &[LedgerRecord]) -> Vec<AuditIssue> {
    let mut issues = Vec::new();
    let mut expected = 1;
    let mut previous: Option<DateTime<Utc>> = None;

    for record in records {
        if record.sequence != expected {
            issues.push(AuditIssue::SequenceGap {
                expected,
                found: record.sequence,
            });
        }
        if let Some(prev) = previous {
            if record.created_at < prev {
                issues.push(AuditIssue::TimeRegression {
                    sequence: record.sequence,
                    previous: prev,
                    current: record.created_at,
                });
            }
        }
        expected = record.sequence + 1;
        previous = Some(record.created_at);
    }

    issues
}

/// Outcome of auditing every record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub records: usize,
    pub verified: usize,
    pub failed: usize,
    pub drifted: usize,
    pub issues: Vec<AuditIssue>,
    /// Verifications that did not match
    pub mismatches: Vec<Verification>,
}

impl AuditReport {
    pub(crate) fn new(issues: Vec<AuditIssue>) -> Self {
        Self {
            issues,
            ..Default::default()
        }
    }

    pub(crate) fn add(&mut self, verification: Verification) {
        self.records += 1;
        match verification.status {
            VerificationStatus::Verified => self.verified += 1,
            VerificationStatus::Failed => self.failed += 1,
            VerificationStatus::Drifted => self.drifted += 1,
            VerificationStatus::Pending => {}
        }
        if !verification.matched {
            self.mismatches.push(verification);
        }
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.mismatches.is_empty()
    }
}
