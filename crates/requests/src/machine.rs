//! Budget request state machine

use crate::request::{BudgetRequest, NewRequest, RequestState};
use crate::store::{RequestStore, StoreError};
use chrono::Utc;
use fundtrail_bus::{EventBus, LifecycleEvent};
use fundtrail_core::{Amount, RequestId, VendorId};
use fundtrail_ledger::{LedgerError, LedgerRecord, RecordContext, RecordKind, WalletLedger};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

/// Fresh ids tried by `submit` before giving up on a collision
const SUBMIT_ATTEMPTS: usize = 3;

/// Configuration for the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    /// Ceiling on the sum of all allocations, across every vendor
    pub budget_ceiling: Amount,
}

/// Errors from the request lifecycle
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cannot {action} request {request_id} in state {from}")]
    InvalidTransition {
        request_id: RequestId,
        from: RequestState,
        action: &'static str,
    },

    #[error("Request not found: {0}")]
    NotFound(RequestId),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Request lock table poisoned")]
    Poisoned,
}

/// Request counts per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStats {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub allocated: usize,
    pub in_progress: usize,
    pub completed: usize,
}

/// Drives budget requests through their lifecycle.
///
/// Every transition on a request runs under that request's lock, from the
/// initial read to the final save, ledger call included.
///
/// The ledger is the record of what was moved. If a ledger commit lands but
/// the request save after it fails, a retry of the same transition (or
/// `reconcile`) picks up the committed record instead of moving funds again.
pub struct BudgetRequestStateMachine {
    store: RequestStore,
    ledger: Arc<WalletLedger>,
    bus: Arc<EventBus>,
    config: MachineConfig,
    locks: StdMutex<HashMap<RequestId, Arc<Mutex<()>>>>,
}

impl BudgetRequestStateMachine {
    pub fn new(
        store: RequestStore,
        ledger: Arc<WalletLedger>,
        bus: Arc<EventBus>,
        config: MachineConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            bus,
            config,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<WalletLedger> {
        &self.ledger
    }

    /// Create a request in `pending`
    pub async fn submit(&self, input: NewRequest) -> Result<BudgetRequest, RequestError> {
        let mut request = BudgetRequest::new(input)?;
        let mut attempt = 1;
        loop {
            match self.store.insert(&request) {
                Ok(()) => break,
                Err(StoreError::Duplicate(taken)) if attempt < SUBMIT_ATTEMPTS => {
                    warn!(request_id = %taken, attempt, "Request id already taken, minting another");
                    request.request_id = RequestId::generate();
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!(
            request_id = %request.request_id,
            amount = %request.amount,
            department = %request.department,
            "Budget request submitted"
        );
        self.bus
            .publish(LifecycleEvent::RequestSubmitted {
                request_id: request.request_id.clone(),
                requester: request.requester.clone(),
                amount: request.amount,
                timestamp: request.created_at,
            })
            .await;
        Ok(request)
    }

    /// `pending -> approved`
    pub async fn approve(
        &self,
        request_id: &RequestId,
        approver: &str,
    ) -> Result<BudgetRequest, RequestError> {
        let approver = non_empty(approver, "approver")?;
        let _guard = self.lock(request_id).await?;
        let mut request = self.load(request_id)?;
        expect_state(&request, &[RequestState::Pending], "approve")?;

        let now = Utc::now();
        request.state = RequestState::Approved;
        request.approver = Some(approver.clone());
        request.approved_at = Some(now);
        request.updated_at = now;
        self.store.update(&request)?;

        info!(request_id = %request_id, approver = %approver, "Budget request approved");
        self.bus
            .publish(LifecycleEvent::RequestApproved {
                request_id: request_id.clone(),
                approver,
                timestamp: now,
            })
            .await;
        Ok(request)
    }

    /// `pending -> rejected`. The reason is kept for audit.
    pub async fn reject(
        &self,
        request_id: &RequestId,
        approver: &str,
        reason: &str,
    ) -> Result<BudgetRequest, RequestError> {
        let approver = non_empty(approver, "approver")?;
        let reason = non_empty(reason, "rejection reason")?;
        let _guard = self.lock(request_id).await?;
        let mut request = self.load(request_id)?;
        expect_state(&request, &[RequestState::Pending], "reject")?;

        let now = Utc::now();
        request.state = RequestState::Rejected;
        request.approver = Some(approver.clone());
        request.rejection_reason = Some(reason.clone());
        request.updated_at = now;
        self.store.update(&request)?;

        info!(request_id = %request_id, approver = %approver, reason = %reason, "Budget request rejected");
        self.bus
            .publish(LifecycleEvent::RequestRejected {
                request_id: request_id.clone(),
                approver,
                reason,
                timestamp: now,
            })
            .await;
        Ok(request)
    }

    /// `approved -> allocated`, moving `amount` from the pool to the vendor.
    ///
    /// On a ledger failure the request stays `approved`. If the ledger already
    /// holds an allocation for this request, that record is adopted and no
    /// funds move.
    pub async fn allocate(
        &self,
        request_id: &RequestId,
        vendor_id: &VendorId,
        amount: Decimal,
    ) -> Result<BudgetRequest, RequestError> {
        let amount = Amount::positive(amount).map_err(|e| RequestError::Validation(e.to_string()))?;
        let _guard = self.lock(request_id).await?;
        let mut request = self.load(request_id)?;
        expect_state(&request, &[RequestState::Approved], "allocate")?;

        if amount > request.amount {
            return Err(RequestError::Validation(format!(
                "allocation {} exceeds requested amount {}",
                amount, request.amount
            )));
        }

        let record = match self.committed(request_id, &RecordKind::Allocation)? {
            Some(record) => {
                warn!(
                    request_id = %request_id,
                    record_id = %record.record_id,
                    "Allocation already in the ledger, adopting it"
                );
                record
            }
            None => {
                let authority = request.approver.clone().unwrap_or_default();
                let context = RecordContext::new(authority.clone())
                    .request(request_id.clone())
                    .department(request.department.clone())
                    .project(request.project.clone())
                    .category(request.category.clone())
                    .approved_by(authority);
                self.ledger
                    .allocate(vendor_id, amount, &context, self.config.budget_ceiling)
                    .await?
            }
        };

        mark_allocated(&mut request, &record);
        let now = request.updated_at;
        if let Err(err) = self.store.update(&request) {
            error!(
                request_id = %request_id,
                record_id = %record.record_id,
                error = %err,
                "Allocation committed to the ledger but request state was not saved"
            );
            return Err(err.into());
        }

        info!(
            request_id = %request_id,
            vendor_id = %record.vendor_id,
            amount = %record.amount,
            record_id = %record.record_id,
            "Funds allocated"
        );
        self.bus
            .publish(LifecycleEvent::FundsAllocated {
                request_id: request_id.clone(),
                vendor_id: record.vendor_id,
                amount: record.amount,
                record_id: record.record_id,
                timestamp: now,
            })
            .await;
        Ok(request)
    }

    /// `allocated -> in-progress`
    pub async fn mark_in_progress(
        &self,
        request_id: &RequestId,
    ) -> Result<BudgetRequest, RequestError> {
        let _guard = self.lock(request_id).await?;
        let mut request = self.load(request_id)?;
        expect_state(&request, &[RequestState::Allocated], "start")?;

        let now = Utc::now();
        request.state = RequestState::InProgress;
        request.updated_at = now;
        self.store.update(&request)?;

        info!(request_id = %request_id, "Work started");
        self.bus
            .publish(LifecycleEvent::WorkStarted {
                request_id: request_id.clone(),
                timestamp: now,
            })
            .await;
        Ok(request)
    }

    /// `allocated | in-progress -> completed`, releasing the full allocation
    pub async fn complete(
        &self,
        request_id: &RequestId,
        actor: &str,
    ) -> Result<BudgetRequest, RequestError> {
        let actor = non_empty(actor, "actor")?;
        let _guard = self.lock(request_id).await?;
        let mut request = self.load(request_id)?;
        expect_state(
            &request,
            &[RequestState::Allocated, RequestState::InProgress],
            "complete",
        )?;

        let (vendor_id, amount) = match (&request.assigned_vendor, request.allocated_amount) {
            (Some(vendor_id), Some(amount)) => (vendor_id.clone(), amount),
            _ => {
                return Err(RequestError::Validation(format!(
                    "request {request_id} has no recorded allocation"
                )))
            }
        };

        if let Some(record) = self.committed(request_id, &RecordKind::Release)? {
            warn!(
                request_id = %request_id,
                record_id = %record.record_id,
                "Release already in the ledger, adopting it"
            );
        } else {
            let context = RecordContext::new(actor)
                .request(request_id.clone())
                .department(request.department.clone())
                .project(request.project.clone())
                .category(request.category.clone())
                .approved_by(request.approver.clone().unwrap_or_default());
            self.ledger.release(&vendor_id, amount, &context).await?;
        }

        let now = Utc::now();
        request.state = RequestState::Completed;
        request.updated_at = now;
        if let Err(err) = self.store.update(&request) {
            error!(
                request_id = %request_id,
                error = %err,
                "Release committed to the ledger but request state was not saved"
            );
            return Err(err.into());
        }

        info!(request_id = %request_id, vendor_id = %vendor_id, amount = %amount, "Budget request completed");
        self.bus
            .publish(LifecycleEvent::RequestCompleted {
                request_id: request_id.clone(),
                vendor_id,
                amount,
                timestamp: now,
            })
            .await;
        Ok(request)
    }

    /// Bring request states in line with the ledger.
    ///
    /// Walks every ledger record tagged with a request and applies the
    /// transition the record implies where the request still lags behind:
    /// an allocation moves an `approved` request to `allocated`, a release
    /// moves an `allocated` or `in-progress` one to `completed`. Returns the
    /// number of requests updated. Meant to run at startup, before any
    /// transition is served.
    pub fn reconcile(&self) -> Result<usize, RequestError> {
        let records = self.ledger.store().records().map_err(LedgerError::from)?;
        let mut updated = 0;

        for record in &records {
            let Some(request_id) = &record.request_id else {
                continue;
            };
            let mut request = match self.load(request_id) {
                Ok(request) => request,
                Err(RequestError::NotFound(_)) => {
                    warn!(request_id = %request_id, record_id = %record.record_id, "Ledger record for unknown request");
                    continue;
                }
                Err(err) => return Err(err),
            };

            match (&record.kind, request.state) {
                (RecordKind::Allocation, RequestState::Approved) => {
                    mark_allocated(&mut request, record);
                }
                (RecordKind::Release, RequestState::Allocated | RequestState::InProgress) => {
                    request.state = RequestState::Completed;
                    request.updated_at = Utc::now();
                }
                _ => continue,
            }

            self.store.update(&request)?;
            updated += 1;
            warn!(
                request_id = %request_id,
                record_id = %record.record_id,
                state = %request.state,
                "Request state recovered from the ledger"
            );
        }

        if updated > 0 {
            info!(updated, "Request reconciliation finished");
        }
        Ok(updated)
    }

    /// Get a request by ID
    pub fn get(&self, request_id: &RequestId) -> Result<BudgetRequest, RequestError> {
        self.load(request_id)
    }

    /// List requests, optionally filtered by state
    pub fn list(&self, state: Option<RequestState>) -> Result<Vec<BudgetRequest>, RequestError> {
        Ok(match state {
            Some(state) => self.store.list_by_state(state)?,
            None => self.store.list_all()?,
        })
    }

    /// Get statistics about requests
    pub fn stats(&self) -> Result<RequestStats, RequestError> {
        Ok(RequestStats {
            pending: self.store.count_by_state(RequestState::Pending)?,
            approved: self.store.count_by_state(RequestState::Approved)?,
            rejected: self.store.count_by_state(RequestState::Rejected)?,
            allocated: self.store.count_by_state(RequestState::Allocated)?,
            in_progress: self.store.count_by_state(RequestState::InProgress)?,
            completed: self.store.count_by_state(RequestState::Completed)?,
        })
    }

    fn load(&self, request_id: &RequestId) -> Result<BudgetRequest, RequestError> {
        self.store.get(request_id).map_err(|e| match e {
            StoreError::NotFound(id) => RequestError::NotFound(id),
            other => RequestError::Store(other),
        })
    }

    /// First ledger record of `kind` already committed for the request
    fn committed(
        &self,
        request_id: &RequestId,
        kind: &RecordKind,
    ) -> Result<Option<LedgerRecord>, RequestError> {
        Ok(self
            .ledger
            .records_for_request(request_id)?
            .into_iter()
            .find(|record| &record.kind == kind))
    }

    async fn lock(&self, request_id: &RequestId) -> Result<OwnedMutexGuard<()>, RequestError> {
        let slot = {
            let mut locks = self.locks.lock().map_err(|_| RequestError::Poisoned)?;
            // Slots nobody holds or waits on
            locks.retain(|_, slot| Arc::strong_count(slot) > 1);
            locks
                .entry(request_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        Ok(slot.lock_owned().await)
    }
}

fn mark_allocated(request: &mut BudgetRequest, record: &LedgerRecord) {
    request.state = RequestState::Allocated;
    request.assigned_vendor = Some(record.vendor_id.clone());
    request.allocated_amount = Some(record.amount);
    request.allocation_record = Some(record.record_id.clone());
    request.updated_at = Utc::now();
}

fn non_empty(value: &str, field: &str) -> Result<String, RequestError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RequestError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn expect_state(
    request: &BudgetRequest,
    allowed: &[RequestState],
    action: &'static str,
) -> Result<(), RequestError> {
    if allowed.contains(&request.state) {
        Ok(())
    } else {
        Err(RequestError::InvalidTransition {
            request_id: request.request_id.clone(),
            from: request.state,
            action,
        })
    }
}
