//! Verification service

use crate::audit::{check_sequence, AuditReport};
use crate::error::VerifyError;
use crate::layer::{EngineLayer, HashLayer};
use chrono::Utc;
use fundtrail_bus::{EventBus, LifecycleEvent};
use fundtrail_core::RecordId;
use fundtrail_ledger::{LedgerRecord, LedgerStore, VerificationStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::Display;
use tracing::{info, warn};

/// Which pair of layers disagreed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum MismatchLocation {
    /// Creator recomputes something other than what was stored
    #[strum(serialize = "layerA-layerB")]
    #[serde(rename = "layerA-layerB")]
    CreatorStored,
    /// Stored hash is intact, the downstream reader disagrees
    #[strum(serialize = "layerB-layerC")]
    #[serde(rename = "layerB-layerC")]
    StoredReader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedHashes {
    pub creator: String,
    pub stored: String,
    /// `None` when no downstream reader is configured
    pub reader: Option<String>,
}

/// A classified disagreement. Informational, never raised as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashMismatch {
    pub location: MismatchLocation,
    /// The stored hash
    pub expected: String,
    /// What the disagreeing layer produced (empty if it has no copy)
    pub actual: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub record_id: RecordId,
    pub matched: bool,
    pub status: VerificationStatus,
    pub mismatch: Option<HashMismatch>,
    pub hashes: ComputedHashes,
}

/// Compares stored hashes with the hashes recomputed by each layer
pub struct VerificationService {
    store: Arc<dyn LedgerStore>,
    bus: Arc<EventBus>,
    creator: Arc<dyn HashLayer>,
    reader: Option<Arc<dyn HashLayer>>,
}

impl VerificationService {
    /// Service with the engine as creating layer and no downstream reader
    pub fn new(store: Arc<dyn LedgerStore>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            creator: Arc::new(EngineLayer),
            reader: None,
        }
    }

    /// Add a downstream reader (layer C)
    pub fn with_reader(mut self, reader: Arc<dyn HashLayer>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Classify `record` without touching the store.
    ///
    /// Creator vs stored is checked first: a record whose own creating layer
    /// disagrees is `failed` regardless of what the reader says.
    pub fn verify(&self, record: &LedgerRecord) -> Result<Verification, VerifyError> {
        let reader = match &self.reader {
            Some(layer) => Some(layer.compute(record)?.unwrap_or_default()),
            None => None,
        };
        self.classify(record, reader)
    }

    /// Classify against a reader digest already computed (empty string when
    /// the reader has no copy)
    fn classify(
        &self,
        record: &LedgerRecord,
        reader: Option<String>,
    ) -> Result<Verification, VerifyError> {
        let creator = self
            .creator
            .compute(record)?
            .ok_or_else(|| VerifyError::Layer {
                layer: self.creator.name().to_string(),
                reason: format!("no view of record {}", record.record_id),
            })?;
        let stored = record.data_hash.clone();

        let mismatch = if creator != stored {
            Some(HashMismatch {
                location: MismatchLocation::CreatorStored,
                expected: stored.clone(),
                actual: creator.clone(),
            })
        } else {
            match &reader {
                Some(seen) if *seen != stored => Some(HashMismatch {
                    location: MismatchLocation::StoredReader,
                    expected: stored.clone(),
                    actual: seen.clone(),
                }),
                _ => None,
            }
        };

        let status = match mismatch.as_ref().map(|m| m.location) {
            None => VerificationStatus::Verified,
            Some(MismatchLocation::CreatorStored) => VerificationStatus::Failed,
            Some(MismatchLocation::StoredReader) => VerificationStatus::Drifted,
        };

        Ok(Verification {
            record_id: record.record_id.clone(),
            matched: mismatch.is_none(),
            status,
            mismatch,
            hashes: ComputedHashes {
                creator,
                stored,
                reader,
            },
        })
    }

    /// Verify a stored record and persist its new status
    pub async fn verify_record(&self, record_id: &RecordId) -> Result<Verification, VerifyError> {
        let record = self
            .store
            .record(record_id)?
            .ok_or_else(|| VerifyError::RecordNotFound(record_id.clone()))?;

        let verification = self.verify(&record)?;
        self.settle(&record, &verification).await?;
        Ok(verification)
    }

    /// Verify every stored record and check sequence continuity
    pub async fn audit(&self) -> Result<AuditReport, VerifyError> {
        let records = self.store.records()?;
        let mut report = AuditReport::new(check_sequence(&records));

        let seen: Vec<Option<String>> = match &self.reader {
            Some(layer) => layer
                .compute_all(&records)?
                .into_iter()
                .map(|hash| Some(hash.unwrap_or_default()))
                .collect(),
            None => vec![None; records.len()],
        };
        if seen.len() != records.len() {
            return Err(VerifyError::Layer {
                layer: self.reader.as_ref().map_or("reader", |l| l.name()).to_string(),
                reason: format!("{} digests for {} records", seen.len(), records.len()),
            });
        }

        for (record, reader) in records.iter().zip(seen) {
            let verification = self.classify(record, reader)?;
            self.settle(record, &verification).await?;
            report.add(verification);
        }

        if report.is_clean() {
            info!(records = report.records, "Audit passed");
        } else {
            warn!(
                records = report.records,
                failed = report.failed,
                drifted = report.drifted,
                issues = report.issues.len(),
                "Audit found problems"
            );
        }
        Ok(report)
    }

    async fn settle(
        &self,
        record: &LedgerRecord,
        verification: &Verification,
    ) -> Result<(), VerifyError> {
        if record.verification_status != verification.status {
            self.store
                .set_status(&record.record_id, verification.status)?;
        }

        match &verification.mismatch {
            Some(mismatch) => warn!(
                record_id = %record.record_id,
                location = %mismatch.location,
                expected = %mismatch.expected,
                actual = %mismatch.actual,
                "Hash mismatch"
            ),
            None => info!(record_id = %record.record_id, "Record verified"),
        }

        self.bus
            .publish(LifecycleEvent::RecordVerified {
                record_id: record.record_id.clone(),
                status: verification.status.to_string(),
                mismatch_location: verification
                    .mismatch
                    .as_ref()
                    .map(|m| m.location.to_string()),
                timestamp: Utc::now(),
            })
            .await;
        Ok(())
    }
}
