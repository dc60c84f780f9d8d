//! JSONL journal reader - sequential reader for replay and independent re-reads

use crate::error::EventError;
use crate::line::JournalLine;
use fundtrail_core::RecordId;
use fundtrail_ledger::{LedgerRecord, VendorProfile, VerificationStatus};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// The journal folded into current state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalSnapshot {
    /// Vendors in first-registration order, latest profile wins
    pub vendors: Vec<VendorProfile>,
    /// Records in journal order, with their latest verification status
    pub records: Vec<LedgerRecord>,
}

impl JournalSnapshot {
    pub fn last_sequence(&self) -> u64 {
        self.records.last().map_or(0, |r| r.sequence)
    }
}

/// Sequential journal reader
pub struct JournalReader {
    files: Vec<PathBuf>,
}

impl JournalReader {
    /// Create a new reader from a directory
    pub fn from_directory(path: impl AsRef<Path>) -> Result<Self, EventError> {
        let path = path.as_ref();
        let mut files = Vec::new();

        if path.exists() {
            for entry in std::fs::read_dir(path)? {
                let entry = entry?;
                let file_path = entry.path();
                if file_path.extension().map_or(false, |ext| ext == "jsonl") {
                    files.push(file_path);
                }
            }
        }

        files.sort();

        Ok(Self { files })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Read every line from every file, oldest file first
    pub fn read_lines(&self) -> Result<Vec<JournalLine>, EventError> {
        let mut lines = Vec::new();

        for file_path in &self.files {
            let file = File::open(file_path)?;
            let reader = BufReader::new(file);

            for (index, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let parsed: JournalLine =
                    serde_json::from_str(&line).map_err(|e| EventError::InvalidFile {
                        file: file_path.display().to_string(),
                        line: index + 1,
                        reason: e.to_string(),
                    })?;
                lines.push(parsed);
            }
        }

        Ok(lines)
    }

    /// Fold the journal into vendors and records.
    ///
    /// Status lines are applied after all records are known, since a status
    /// change can be filed under an earlier day than a record it follows.
    pub fn snapshot(&self) -> Result<JournalSnapshot, EventError> {
        let mut snapshot = JournalSnapshot::default();
        let mut vendor_index: HashMap<String, usize> = HashMap::new();
        let mut statuses: Vec<(RecordId, VerificationStatus)> = Vec::new();

        for line in self.read_lines()? {
            match line {
                JournalLine::Vendor(profile) => {
                    match vendor_index.get(profile.vendor_id.as_str()) {
                        Some(&position) => snapshot.vendors[position] = profile,
                        None => {
                            vendor_index
                                .insert(profile.vendor_id.to_string(), snapshot.vendors.len());
                            snapshot.vendors.push(profile);
                        }
                    }
                }
                JournalLine::Record(record) => snapshot.records.push(record),
                JournalLine::Status {
                    record_id, status, ..
                } => statuses.push((record_id, status)),
            }
        }

        let record_index: HashMap<RecordId, usize> = snapshot
            .records
            .iter()
            .enumerate()
            .map(|(position, record)| (record.record_id.clone(), position))
            .collect();

        for (record_id, status) in statuses {
            let position = record_index
                .get(&record_id)
                .ok_or_else(|| EventError::RecordNotFound(record_id.clone()))?;
            snapshot.records[*position].verification_status = status;
        }

        Ok(snapshot)
    }

    /// Read one record as it currently sits on disk
    pub fn record(&self, record_id: &RecordId) -> Result<Option<LedgerRecord>, EventError> {
        Ok(self
            .snapshot()?
            .records
            .into_iter()
            .find(|r| &r.record_id == record_id))
    }

    /// Count total lines across all files
    pub fn count(&self) -> Result<usize, EventError> {
        let mut count = 0;

        for file_path in &self.files {
            let file = File::open(file_path)?;
            let reader = BufReader::new(file);

            for line in reader.lines() {
                let line = line?;
                if !line.trim().is_empty() {
                    count += 1;
                }
            }
        }

        Ok(count)
    }
}
