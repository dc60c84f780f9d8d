//! Ledger records - one immutable entry per balance-affecting operation

use crate::hash::{compute_hash, CanonicalFields, HashAlgorithm};
use chrono::{DateTime, Utc};
use fundtrail_core::{Amount, RecordId, RequestId, VendorId};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Wallet bucket that can feed (or receive) a compliance hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HoldBucket {
    Available,
    Pending,
}

/// What a record did to its wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecordKind {
    /// Pool -> vendor: `allocated += a`, `pending += a`
    Allocation,
    /// `pending -> available`
    Release,
    /// `available -> withdrawn`
    Withdrawal,
    /// `available|pending -> frozen`
    Freeze { source: HoldBucket, reason: String },
    /// `frozen -> available|pending`
    Unfreeze { target: HoldBucket },
}

impl RecordKind {
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// Integrity state of a record, updated only by verification
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerificationStatus {
    /// Not verified since creation
    #[default]
    Pending,
    /// Every layer agrees with the stored hash
    Verified,
    /// The creating layer no longer reproduces the stored hash
    Failed,
    /// Stored hash is intact but a downstream reader disagrees
    Drifted,
}

/// Who and what a ledger operation is for.
///
/// Supplied by the caller; copied verbatim into the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordContext {
    pub request_id: Option<RequestId>,
    pub department: String,
    pub project: String,
    pub category: String,
    pub created_by: String,
    pub approved_by: String,
}

impl RecordContext {
    pub fn new(created_by: impl Into<String>) -> Self {
        Self {
            created_by: created_by.into(),
            ..Default::default()
        }
    }

    pub fn request(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn department(mut self, department: impl Into<String>) -> Self {
        self.department = department.into();
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn approved_by(mut self, approver: impl Into<String>) -> Self {
        self.approved_by = approver.into();
        self
    }
}

/// An immutable ledger entry.
///
/// `data_hash` is computed once, at commit, from [`LedgerRecord::hash_fields`].
/// `verification_status` is the only field that changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub record_id: RecordId,
    /// Monotonic per store, assigned in commit order
    pub sequence: u64,
    pub kind: RecordKind,
    pub amount: Amount,
    pub request_id: Option<RequestId>,
    pub vendor_id: VendorId,
    pub vendor_name: String,
    pub department: String,
    pub project: String,
    pub category: String,
    pub created_by: String,
    pub approved_by: String,
    pub created_at: DateTime<Utc>,
    pub data_hash: String,
    pub hash_algorithm: HashAlgorithm,
    #[serde(default)]
    pub verification_status: VerificationStatus,
}

impl LedgerRecord {
    /// Build and stamp a record. Only the ledger calls this, at commit.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn stamp(
        sequence: u64,
        kind: RecordKind,
        amount: Amount,
        vendor_id: VendorId,
        vendor_name: String,
        context: &RecordContext,
        created_at: DateTime<Utc>,
        algorithm: HashAlgorithm,
    ) -> Self {
        let mut record = LedgerRecord {
            record_id: RecordId::generate(),
            sequence,
            kind,
            amount,
            request_id: context.request_id.clone(),
            vendor_id,
            vendor_name,
            department: context.department.clone(),
            project: context.project.clone(),
            category: context.category.clone(),
            created_by: context.created_by.clone(),
            approved_by: context.approved_by.clone(),
            created_at,
            data_hash: String::new(),
            hash_algorithm: algorithm,
            verification_status: VerificationStatus::Pending,
        };
        record.data_hash = record.recompute_hash();
        record
    }

    /// Projection covered by the canonical hash
    pub fn hash_fields(&self) -> CanonicalFields<'_> {
        CanonicalFields {
            request_id: self.request_id.as_ref().map(|id| id.as_str()).unwrap_or(""),
            amount: self.amount,
            timestamp: self.created_at,
            department: &self.department,
            project: &self.project,
            vendor_id: self.vendor_id.as_str(),
            authority: &self.approved_by,
            category: &self.category,
            vendor_name: &self.vendor_name,
        }
    }

    /// Recompute the digest from the current field values with the record's algorithm
    pub fn recompute_hash(&self) -> String {
        compute_hash(self.hash_algorithm, &self.hash_fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn sample() -> LedgerRecord {
        let context = RecordContext::new("alice")
            .request(RequestId::new("REQ-1").unwrap())
            .department("Engineering")
            .project("Atlas")
            .category("hardware")
            .approved_by("admin");
        LedgerRecord::stamp(
            1,
            RecordKind::Allocation,
            Amount::new(dec!(50000)).unwrap(),
            VendorId::new("V-1").unwrap(),
            "Acme".to_string(),
            &context,
            Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap(),
            HashAlgorithm::Sha256CanonV1,
        )
    }

    #[test]
    fn test_stamp_sets_hash_once() {
        let record = sample();
        assert_eq!(record.data_hash, record.recompute_hash());
        assert_eq!(record.verification_status, VerificationStatus::Pending);
        assert!(record.record_id.as_str().starts_with("TX-"));
    }

    #[test]
    fn test_status_is_not_hashed() {
        let mut record = sample();
        let before = record.recompute_hash();
        record.verification_status = VerificationStatus::Verified;
        assert_eq!(record.recompute_hash(), before);
    }

    #[test]
    fn test_tampered_amount_changes_hash() {
        let mut record = sample();
        record.amount = Amount::new(dec!(50001)).unwrap();
        assert_ne!(record.recompute_hash(), record.data_hash);
    }

    #[test]
    fn test_kind_serialization_is_tagged() {
        let kind = RecordKind::Freeze {
            source: HoldBucket::Pending,
            reason: "audit hold".to_string(),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "freeze");
        assert_eq!(json["source"], "pending");
        assert_eq!(kind.name(), "freeze");
        assert_eq!(RecordKind::Withdrawal.name(), "withdrawal");
    }

    #[test]
    fn test_record_json_roundtrip_keeps_hash_valid() {
        let record = sample();
        let json = serde_json::to_string(&record).unwrap();
        let parsed: LedgerRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.recompute_hash(), record.data_hash);
    }
}
