//! Downstream hash layer backed by the on-disk journal

use fundtrail_core::RecordId;
use fundtrail_events::{EventError, JournalReader};
use fundtrail_ledger::{compute_hash, LedgerRecord};
use fundtrail_verify::{HashLayer, VerifyError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Layer C: re-reads the journal directory from disk and recomputes the hash
/// of the record as persisted, independent of the store's in-memory copy.
pub struct JournalLayer {
    journal_path: PathBuf,
}

impl JournalLayer {
    pub fn new(journal_path: impl AsRef<Path>) -> Self {
        Self {
            journal_path: journal_path.as_ref().to_path_buf(),
        }
    }
}

impl HashLayer for JournalLayer {
    fn name(&self) -> &str {
        "journal"
    }

    fn compute(&self, record: &LedgerRecord) -> Result<Option<String>, VerifyError> {
        let persisted = JournalReader::from_directory(&self.journal_path)
            .and_then(|reader| reader.record(&record.record_id))
            .map_err(layer_error)?;

        Ok(persisted.as_ref().map(digest))
    }

    /// One read of the journal for the whole pass
    fn compute_all(&self, records: &[LedgerRecord]) -> Result<Vec<Option<String>>, VerifyError> {
        let snapshot = JournalReader::from_directory(&self.journal_path)
            .and_then(|reader| reader.snapshot())
            .map_err(layer_error)?;
        let on_disk: HashMap<&RecordId, &LedgerRecord> = snapshot
            .records
            .iter()
            .map(|copy| (&copy.record_id, copy))
            .collect();

        Ok(records
            .iter()
            .map(|record| on_disk.get(&record.record_id).map(|copy| digest(copy)))
            .collect())
    }
}

fn digest(copy: &LedgerRecord) -> String {
    compute_hash(copy.hash_algorithm, &copy.hash_fields())
}

fn layer_error(err: EventError) -> VerifyError {
    VerifyError::Layer {
        layer: "journal".to_string(),
        reason: err.to_string(),
    }
}
