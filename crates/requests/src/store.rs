//! SQLite storage for budget requests

use crate::request::{BudgetRequest, Priority, RequestState};
use chrono::{DateTime, Utc};
use fundtrail_core::{Amount, RecordId, RequestId, VendorId};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// Errors from the request store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Request not found: {0}")]
    NotFound(RequestId),

    #[error("Request already exists: {0}")]
    Duplicate(RequestId),

    #[error("Corrupt row for {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Request store lock poisoned")]
    Poisoned,
}

const COLUMNS: &str = "request_id, amount, department, project, category, priority, description,
    requester, state, approver, approved_at, rejection_reason, assigned_vendor,
    allocated_amount, allocation_record, created_at, updated_at";

/// Raw column values, parsed outside the rusqlite row callback
struct RequestRow {
    request_id: String,
    amount: String,
    department: String,
    project: String,
    category: String,
    priority: String,
    description: String,
    requester: String,
    state: String,
    approver: Option<String>,
    approved_at: Option<String>,
    rejection_reason: Option<String>,
    assigned_vendor: Option<String>,
    allocated_amount: Option<String>,
    allocation_record: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RequestRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            request_id: row.get(0)?,
            amount: row.get(1)?,
            department: row.get(2)?,
            project: row.get(3)?,
            category: row.get(4)?,
            priority: row.get(5)?,
            description: row.get(6)?,
            requester: row.get(7)?,
            state: row.get(8)?,
            approver: row.get(9)?,
            approved_at: row.get(10)?,
            rejection_reason: row.get(11)?,
            assigned_vendor: row.get(12)?,
            allocated_amount: row.get(13)?,
            allocation_record: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    fn into_request(self) -> Result<BudgetRequest, StoreError> {
        let id = self.request_id.clone();
        let corrupt = |reason: String| StoreError::Corrupt {
            id: id.clone(),
            reason,
        };

        let amount = |text: &str| -> Result<Amount, StoreError> {
            let value = Decimal::from_str(text).map_err(|e| corrupt(e.to_string()))?;
            Amount::new(value).map_err(|e| corrupt(e.to_string()))
        };
        let timestamp = |text: &str| -> Result<DateTime<Utc>, StoreError> {
            DateTime::parse_from_rfc3339(text)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| corrupt(e.to_string()))
        };

        Ok(BudgetRequest {
            request_id: RequestId::new(self.request_id.as_str())
                .map_err(|e| corrupt(e.to_string()))?,
            amount: amount(&self.amount)?,
            department: self.department,
            project: self.project,
            category: self.category,
            priority: Priority::from_str(&self.priority).map_err(|e| corrupt(e.to_string()))?,
            description: self.description,
            requester: self.requester,
            state: RequestState::from_str(&self.state).map_err(|e| corrupt(e.to_string()))?,
            approver: self.approver,
            approved_at: self.approved_at.as_deref().map(timestamp).transpose()?,
            rejection_reason: self.rejection_reason,
            assigned_vendor: self
                .assigned_vendor
                .map(VendorId::new)
                .transpose()
                .map_err(|e| corrupt(e.to_string()))?,
            allocated_amount: self.allocated_amount.as_deref().map(amount).transpose()?,
            allocation_record: self
                .allocation_record
                .map(RecordId::new)
                .transpose()
                .map_err(|e| corrupt(e.to_string()))?,
            created_at: timestamp(&self.created_at)?,
            updated_at: timestamp(&self.updated_at)?,
        })
    }
}

/// SQLite storage for budget requests
pub struct RequestStore {
    conn: Mutex<Connection>,
}

impl RequestStore {
    /// Create a new store with the given database path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS budget_requests (
                request_id TEXT PRIMARY KEY,
                amount TEXT NOT NULL,
                department TEXT NOT NULL,
                project TEXT NOT NULL,
                category TEXT NOT NULL,
                priority TEXT NOT NULL,
                description TEXT NOT NULL,
                requester TEXT NOT NULL,
                state TEXT NOT NULL,
                approver TEXT,
                approved_at TEXT,
                rejection_reason TEXT,
                assigned_vendor TEXT,
                allocated_amount TEXT,
                allocation_record TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Index for efficient state queries
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_budget_requests_state
             ON budget_requests(state)",
            [],
        )?;

        Ok(())
    }

    /// Insert a new request. Fails with `Duplicate` if the id is taken;
    /// an existing request is never overwritten.
    pub fn insert(&self, request: &BudgetRequest) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let result = conn.execute(
            &format!(
                "INSERT INTO budget_requests ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
            ),
            params![
                request.request_id.as_str(),
                request.amount.value().to_string(),
                request.department,
                request.project,
                request.category,
                request.priority.to_string(),
                request.description,
                request.requester,
                request.state.to_string(),
                request.approver,
                request.approved_at.map(|t| t.to_rfc3339()),
                request.rejection_reason,
                request.assigned_vendor.as_ref().map(|v| v.as_str()),
                request.allocated_amount.map(|a| a.value().to_string()),
                request.allocation_record.as_ref().map(|r| r.as_str()),
                request.created_at.to_rfc3339(),
                request.updated_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Duplicate(request.request_id.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Write the lifecycle fields of an existing request. The submitted
    /// fields (amount, department, requester, ...) are immutable.
    pub fn update(&self, request: &BudgetRequest) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE budget_requests SET
                state = ?2, approver = ?3, approved_at = ?4, rejection_reason = ?5,
                assigned_vendor = ?6, allocated_amount = ?7, allocation_record = ?8,
                updated_at = ?9
             WHERE request_id = ?1",
            params![
                request.request_id.as_str(),
                request.state.to_string(),
                request.approver,
                request.approved_at.map(|t| t.to_rfc3339()),
                request.rejection_reason,
                request.assigned_vendor.as_ref().map(|v| v.as_str()),
                request.allocated_amount.map(|a| a.value().to_string()),
                request.allocation_record.as_ref().map(|r| r.as_str()),
                request.updated_at.to_rfc3339(),
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(request.request_id.clone()));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    /// Get a request by ID
    pub fn get(&self, id: &RequestId) -> Result<BudgetRequest, StoreError> {
        let row = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM budget_requests WHERE request_id = ?1"
            ))?;
            let row = stmt
                .query_row(params![id.as_str()], RequestRow::from_row)
                .optional()?;
            row
        };

        row.ok_or_else(|| StoreError::NotFound(id.clone()))?
            .into_request()
    }

    /// List every request, newest first
    pub fn list_all(&self) -> Result<Vec<BudgetRequest>, StoreError> {
        self.query(
            &format!("SELECT {COLUMNS} FROM budget_requests ORDER BY created_at DESC"),
            None,
        )
    }

    /// List requests in a specific state, newest first
    pub fn list_by_state(&self, state: RequestState) -> Result<Vec<BudgetRequest>, StoreError> {
        self.query(
            &format!(
                "SELECT {COLUMNS} FROM budget_requests WHERE state = ?1 ORDER BY created_at DESC"
            ),
            Some(state),
        )
    }

    /// Count requests by state
    pub fn count_by_state(&self, state: RequestState) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM budget_requests WHERE state = ?1",
            params![state.to_string()],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }

    fn query(
        &self,
        sql: &str,
        state: Option<RequestState>,
    ) -> Result<Vec<BudgetRequest>, StoreError> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(sql)?;
            let rows = match state {
                Some(state) => stmt
                    .query_map(params![state.to_string()], RequestRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?,
                None => stmt
                    .query_map([], RequestRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?,
            };
            rows
        };

        rows.into_iter().map(RequestRow::into_request).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::NewRequest;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn create_request(amount: Decimal) -> BudgetRequest {
        BudgetRequest::new(NewRequest {
            amount,
            department: "Engineering".to_string(),
            project: "Atlas".to_string(),
            category: "hardware".to_string(),
            priority: Priority::Urgent,
            description: "rack servers".to_string(),
            requester: "alice".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_store_save_and_get() {
        let store = RequestStore::in_memory().unwrap();
        let request = create_request(dec!(1250.75));

        store.insert(&request).unwrap();
        let retrieved = store.get(&request.request_id).unwrap();

        assert_eq!(retrieved.request_id, request.request_id);
        assert_eq!(retrieved.amount.value(), dec!(1250.75));
        assert_eq!(retrieved.priority, Priority::Urgent);
        assert_eq!(retrieved.state, RequestState::Pending);
        assert!(retrieved.assigned_vendor.is_none());
    }

    #[test]
    fn test_store_keeps_lifecycle_fields() {
        let store = RequestStore::in_memory().unwrap();
        let mut request = create_request(dec!(500));
        request.state = RequestState::Allocated;
        request.approver = Some("admin".to_string());
        request.approved_at = Some(Utc::now());
        request.assigned_vendor = Some(VendorId::new("V-ACME").unwrap());
        request.allocated_amount = Some(Amount::new(dec!(450)).unwrap());
        request.allocation_record = Some(RecordId::new("TX-ABC").unwrap());

        store.insert(&request).unwrap();
        let retrieved = store.get(&request.request_id).unwrap();

        assert_eq!(retrieved.state, RequestState::Allocated);
        assert_eq!(retrieved.assigned_vendor, request.assigned_vendor);
        assert_eq!(retrieved.allocated_amount, request.allocated_amount);
        assert_eq!(retrieved.allocation_record, request.allocation_record);
        assert_eq!(retrieved.approver.as_deref(), Some("admin"));
    }

    #[test]
    fn test_store_get_missing() {
        let store = RequestStore::in_memory().unwrap();
        let id = RequestId::new("REQ-MISSING").unwrap();
        assert!(matches!(store.get(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_store_list_and_count_by_state() {
        let store = RequestStore::in_memory().unwrap();

        for i in 0..5 {
            let mut request = create_request(Decimal::from(100 + i));
            if i % 2 == 0 {
                request.state = RequestState::InProgress;
            }
            store.insert(&request).unwrap();
        }

        assert_eq!(store.list_all().unwrap().len(), 5);
        assert_eq!(store.list_by_state(RequestState::InProgress).unwrap().len(), 3);
        assert_eq!(store.count_by_state(RequestState::Pending).unwrap(), 2);
        assert_eq!(store.count_by_state(RequestState::Completed).unwrap(), 0);
    }

    #[test]
    fn test_store_persists_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requests.db");
        let request = create_request(dec!(42));

        {
            let store = RequestStore::new(&path).unwrap();
            store.insert(&request).unwrap();
        }

        let store = RequestStore::new(&path).unwrap();
        assert_eq!(store.get(&request.request_id).unwrap(), request);
    }

    #[test]
    fn test_insert_never_overwrites() {
        let store = RequestStore::in_memory().unwrap();
        let mut allocated = create_request(dec!(100));
        allocated.state = RequestState::Allocated;
        allocated.assigned_vendor = Some(VendorId::new("V-ACME").unwrap());
        allocated.allocation_record = Some(RecordId::new("TX-1").unwrap());
        store.insert(&allocated).unwrap();

        let mut colliding = create_request(dec!(5));
        colliding.request_id = allocated.request_id.clone();
        let err = store.insert(&colliding).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(id) if id == allocated.request_id));

        let kept = store.get(&allocated.request_id).unwrap();
        assert_eq!(kept.state, RequestState::Allocated);
        assert_eq!(kept.amount.value(), dec!(100));
        assert_eq!(kept.allocation_record, allocated.allocation_record);
    }

    #[test]
    fn test_update_changes_lifecycle_fields_only() {
        let store = RequestStore::in_memory().unwrap();
        let mut request = create_request(dec!(300));
        store.insert(&request).unwrap();

        request.state = RequestState::Approved;
        request.approver = Some("admin".to_string());
        request.amount = Amount::new(dec!(999)).unwrap();
        store.update(&request).unwrap();

        let stored = store.get(&request.request_id).unwrap();
        assert_eq!(stored.state, RequestState::Approved);
        assert_eq!(stored.approver.as_deref(), Some("admin"));
        assert_eq!(stored.amount.value(), dec!(300));
    }

    #[test]
    fn test_update_missing_request() {
        let store = RequestStore::in_memory().unwrap();
        let request = create_request(dec!(1));
        assert!(matches!(store.update(&request), Err(StoreError::NotFound(_))));
        assert_eq!(store.list_all().unwrap().len(), 0);
    }
}
