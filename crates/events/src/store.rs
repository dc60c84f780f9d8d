//! JSONL journal store - append-only writer backing the wallet ledger

use crate::error::EventError;
use crate::line::JournalLine;
use crate::reader::JournalReader;
use chrono::Utc;
use fundtrail_core::RecordId;
use fundtrail_ledger::{LedgerRecord, LedgerStore, StoreError, VendorProfile, VerificationStatus};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

struct JournalState {
    current_file: Option<BufWriter<File>>,
    current_date: Option<String>,
    records: Vec<LedgerRecord>,
    index: HashMap<RecordId, usize>,
    vendors: Vec<VendorProfile>,
}

/// Append-only JSONL journal, one file per UTC day.
///
/// Holds an in-memory copy of what it has written, rebuilt from disk on open.
pub struct JournalStore {
    base_path: PathBuf,
    state: Mutex<JournalState>,
}

impl JournalStore {
    /// Open (or create) a journal at the given path
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self, EventError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;

        let snapshot = JournalReader::from_directory(&base_path)?.snapshot()?;
        let index = snapshot
            .records
            .iter()
            .enumerate()
            .map(|(position, record)| (record.record_id.clone(), position))
            .collect();

        debug!(
            path = %base_path.display(),
            vendors = snapshot.vendors.len(),
            records = snapshot.records.len(),
            "Journal loaded"
        );

        Ok(Self {
            base_path,
            state: Mutex::new(JournalState {
                current_file: None,
                current_date: None,
                records: snapshot.records,
                index,
                vendors: snapshot.vendors,
            }),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Reader over the same directory, bypassing the in-memory copy
    pub fn reader(&self) -> Result<JournalReader, EventError> {
        JournalReader::from_directory(&self.base_path)
    }

    /// List all JSONL files in the journal
    pub fn list_files(&self) -> Result<Vec<PathBuf>, EventError> {
        Ok(self.reader()?.files().to_vec())
    }

    /// Flush and close the current file
    pub fn close(&self) -> Result<(), EventError> {
        let mut state = self.lock()?;
        if let Some(ref mut writer) = state.current_file {
            writer.flush()?;
        }
        state.current_file = None;
        state.current_date = None;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, JournalState>, EventError> {
        self.state.lock().map_err(|_| EventError::Poisoned)
    }

    fn write_line(&self, state: &mut JournalState, line: &JournalLine) -> Result<(), EventError> {
        let date = line.date();

        // Rotate file if date changed
        if state.current_date.as_ref() != Some(&date) {
            self.rotate_file(state, &date)?;
        }

        if let Some(ref mut writer) = state.current_file {
            let json = serde_json::to_string(line)?;
            writeln!(writer, "{}", json)?;
            writer.flush()?;
        }

        Ok(())
    }

    fn rotate_file(&self, state: &mut JournalState, date: &str) -> Result<(), EventError> {
        if let Some(ref mut writer) = state.current_file {
            writer.flush()?;
        }

        let file_path = self.base_path.join(format!("{}.jsonl", date));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;

        state.current_file = Some(BufWriter::new(file));
        state.current_date = Some(date.to_string());

        Ok(())
    }

    fn append_record(&self, record: &LedgerRecord) -> Result<(), EventError> {
        let mut state = self.lock()?;
        let last = state.records.last().map_or(0, |r| r.sequence);
        if record.sequence <= last {
            return Err(EventError::Sequence {
                last,
                attempted: record.sequence,
            });
        }
        if state.index.contains_key(&record.record_id) {
            return Err(EventError::DuplicateRecord(record.record_id.clone()));
        }

        self.write_line(&mut state, &JournalLine::Record(record.clone()))?;

        let position = state.records.len();
        state.index.insert(record.record_id.clone(), position);
        state.records.push(record.clone());
        Ok(())
    }

    fn write_status(
        &self,
        record_id: &RecordId,
        status: VerificationStatus,
    ) -> Result<(), EventError> {
        let mut state = self.lock()?;
        let position = *state
            .index
            .get(record_id)
            .ok_or_else(|| EventError::RecordNotFound(record_id.clone()))?;

        let line = JournalLine::Status {
            record_id: record_id.clone(),
            status,
            at: Utc::now(),
        };
        self.write_line(&mut state, &line)?;
        state.records[position].verification_status = status;
        Ok(())
    }

    fn write_vendor(&self, vendor: &VendorProfile) -> Result<(), EventError> {
        let mut state = self.lock()?;
        self.write_line(&mut state, &JournalLine::Vendor(vendor.clone()))?;
        match state
            .vendors
            .iter_mut()
            .find(|v| v.vendor_id == vendor.vendor_id)
        {
            Some(existing) => *existing = vendor.clone(),
            None => state.vendors.push(vendor.clone()),
        }
        Ok(())
    }
}

impl LedgerStore for JournalStore {
    fn last_sequence(&self) -> Result<u64, StoreError> {
        let state = self.lock()?;
        Ok(state.records.last().map_or(0, |r| r.sequence))
    }

    fn append(&self, record: &LedgerRecord) -> Result<(), StoreError> {
        Ok(self.append_record(record)?)
    }

    fn record(&self, record_id: &RecordId) -> Result<Option<LedgerRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .index
            .get(record_id)
            .map(|&position| state.records[position].clone()))
    }

    fn records(&self) -> Result<Vec<LedgerRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state.records.clone())
    }

    fn set_status(
        &self,
        record_id: &RecordId,
        status: VerificationStatus,
    ) -> Result<(), StoreError> {
        Ok(self.write_status(record_id, status)?)
    }

    fn save_vendor(&self, vendor: &VendorProfile) -> Result<(), StoreError> {
        Ok(self.write_vendor(vendor)?)
    }

    fn vendors(&self) -> Result<Vec<VendorProfile>, StoreError> {
        let state = self.lock()?;
        Ok(state.vendors.clone())
    }
}

impl Drop for JournalStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
