//! Hash layers - independent views that recompute a record's digest

use crate::error::VerifyError;
use fundtrail_ledger::{compute_hash, LedgerRecord};

/// A layer able to recompute the canonical digest of a record from its own
/// view of that record.
pub trait HashLayer: Send + Sync {
    fn name(&self) -> &str;

    /// Digest as this layer sees the record, `None` when the layer has no
    /// copy of it
    fn compute(&self, record: &LedgerRecord) -> Result<Option<String>, VerifyError>;

    /// Digests for a whole pass, one entry per record in order. Layers with
    /// an expensive view override this to load it once.
    fn compute_all(&self, records: &[LedgerRecord]) -> Result<Vec<Option<String>>, VerifyError> {
        records.iter().map(|record| self.compute(record)).collect()
    }
}

/// The creating layer: recomputes from the record's own fields with the
/// algorithm the record was stamped with
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineLayer;

impl HashLayer for EngineLayer {
    fn name(&self) -> &str {
        "engine"
    }

    fn compute(&self, record: &LedgerRecord) -> Result<Option<String>, VerifyError> {
        Ok(Some(compute_hash(record.hash_algorithm, &record.hash_fields())))
    }
}
