//! Persistence port for ledger records and vendor registrations
//!
//! The ledger needs two things from storage: an append that refuses
//! out-of-order sequence numbers, and a way to read everything back for
//! replay. Any engine that can do both can back a `WalletLedger`.

use crate::record::{LedgerRecord, VerificationStatus};
use crate::wallet::VendorProfile;
use fundtrail_core::RecordId;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Errors from a ledger store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Sequence must be strictly increasing: last {last}, got {attempted}")]
    NonMonotonicSequence { last: u64, attempted: u64 },

    #[error("Duplicate record: {0}")]
    DuplicateRecord(RecordId),

    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Storage used by the wallet ledger and the verification service
pub trait LedgerStore: Send + Sync {
    /// Highest committed sequence number (0 when empty)
    fn last_sequence(&self) -> Result<u64, StoreError>;

    /// Persist a freshly stamped record. Must reject a sequence that does not
    /// exceed `last_sequence`.
    fn append(&self, record: &LedgerRecord) -> Result<(), StoreError>;

    fn record(&self, record_id: &RecordId) -> Result<Option<LedgerRecord>, StoreError>;

    /// All records in sequence order
    fn records(&self) -> Result<Vec<LedgerRecord>, StoreError>;

    /// The only post-creation update a record ever receives
    fn set_status(&self, record_id: &RecordId, status: VerificationStatus)
        -> Result<(), StoreError>;

    fn save_vendor(&self, vendor: &VendorProfile) -> Result<(), StoreError>;

    /// Registered vendors in onboarding order
    fn vendors(&self) -> Result<Vec<VendorProfile>, StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    records: Vec<LedgerRecord>,
    index: HashMap<RecordId, usize>,
    vendors: Vec<VendorProfile>,
}

/// In-memory store (for testing and embedding)
#[derive(Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn last_sequence(&self) -> Result<u64, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.records.last().map_or(0, |r| r.sequence))
    }

    fn append(&self, record: &LedgerRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        let last = inner.records.last().map_or(0, |r| r.sequence);
        if record.sequence <= last {
            return Err(StoreError::NonMonotonicSequence {
                last,
                attempted: record.sequence,
            });
        }
        if inner.index.contains_key(&record.record_id) {
            return Err(StoreError::DuplicateRecord(record.record_id.clone()));
        }
        let position = inner.records.len();
        inner.index.insert(record.record_id.clone(), position);
        inner.records.push(record.clone());
        Ok(())
    }

    fn record(&self, record_id: &RecordId) -> Result<Option<LedgerRecord>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(inner
            .index
            .get(record_id)
            .map(|&position| inner.records[position].clone()))
    }

    fn records(&self) -> Result<Vec<LedgerRecord>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.records.clone())
    }

    fn set_status(
        &self,
        record_id: &RecordId,
        status: VerificationStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        let position = *inner
            .index
            .get(record_id)
            .ok_or_else(|| StoreError::RecordNotFound(record_id.clone()))?;
        inner.records[position].verification_status = status;
        Ok(())
    }

    fn save_vendor(&self, vendor: &VendorProfile) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        match inner
            .vendors
            .iter_mut()
            .find(|v| v.vendor_id == vendor.vendor_id)
        {
            Some(existing) => *existing = vendor.clone(),
            None => inner.vendors.push(vendor.clone()),
        }
        Ok(())
    }

    fn vendors(&self) -> Result<Vec<VendorProfile>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.vendors.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashAlgorithm;
    use crate::record::{RecordContext, RecordKind};
    use chrono::Utc;
    use fundtrail_core::{Amount, VendorId};
    use rust_decimal_macros::dec;

    fn record(sequence: u64) -> LedgerRecord {
        LedgerRecord::stamp(
            sequence,
            RecordKind::Allocation,
            Amount::new(dec!(10)).unwrap(),
            VendorId::new("V-1").unwrap(),
            "Acme".to_string(),
            &RecordContext::new("tester"),
            Utc::now(),
            HashAlgorithm::Sha256CanonV1,
        )
    }

    #[test]
    fn test_append_requires_increasing_sequence() {
        let store = MemoryLedgerStore::new();
        store.append(&record(1)).unwrap();
        store.append(&record(2)).unwrap();

        let err = store.append(&record(2)).unwrap_err();
        assert_eq!(err, StoreError::NonMonotonicSequence { last: 2, attempted: 2 });
        assert_eq!(store.last_sequence().unwrap(), 2);
    }

    #[test]
    fn test_set_status_only_touches_status() {
        let store = MemoryLedgerStore::new();
        let original = record(1);
        store.append(&original).unwrap();

        store
            .set_status(&original.record_id, VerificationStatus::Verified)
            .unwrap();

        let stored = store.record(&original.record_id).unwrap().unwrap();
        assert_eq!(stored.verification_status, VerificationStatus::Verified);
        assert_eq!(stored.data_hash, original.data_hash);
        assert_eq!(stored.amount, original.amount);
    }

    #[test]
    fn test_set_status_unknown_record() {
        let store = MemoryLedgerStore::new();
        let missing = RecordId::new("TX-MISSING").unwrap();
        assert_eq!(
            store.set_status(&missing, VerificationStatus::Failed),
            Err(StoreError::RecordNotFound(missing))
        );
    }

    #[test]
    fn test_vendor_registration_upserts() {
        let store = MemoryLedgerStore::new();
        let mut vendor = VendorProfile {
            vendor_id: VendorId::new("V-1").unwrap(),
            display_name: "Acme".to_string(),
            onboarded_at: Utc::now(),
        };
        store.save_vendor(&vendor).unwrap();
        vendor.display_name = "Acme Ltd".to_string();
        store.save_vendor(&vendor).unwrap();

        let vendors = store.vendors().unwrap();
        assert_eq!(vendors.len(), 1);
        assert_eq!(vendors[0].display_name, "Acme Ltd");
    }
}
