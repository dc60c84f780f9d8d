//! Lifecycle events for notification delivery

use chrono::{DateTime, Utc};
use fundtrail_core::{Amount, RecordId, RequestId, VendorId};
use serde::{Deserialize, Serialize};

/// Events emitted by the request state machine, the wallet ledger and the
/// verification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A budget request entered `pending`
    RequestSubmitted {
        request_id: RequestId,
        requester: String,
        amount: Amount,
        timestamp: DateTime<Utc>,
    },

    /// A request moved `pending` -> `approved`
    RequestApproved {
        request_id: RequestId,
        approver: String,
        timestamp: DateTime<Utc>,
    },

    /// A request moved `pending` -> `rejected`
    RequestRejected {
        request_id: RequestId,
        approver: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A request moved `approved` -> `allocated`
    FundsAllocated {
        request_id: RequestId,
        vendor_id: VendorId,
        amount: Amount,
        record_id: RecordId,
        timestamp: DateTime<Utc>,
    },

    /// A request moved `allocated` -> `in-progress`
    WorkStarted {
        request_id: RequestId,
        timestamp: DateTime<Utc>,
    },

    /// A request reached `completed` and its allocation was released
    RequestCompleted {
        request_id: RequestId,
        vendor_id: VendorId,
        amount: Amount,
        timestamp: DateTime<Utc>,
    },

    /// A wallet was opened for a vendor
    VendorOnboarded {
        vendor_id: VendorId,
        display_name: String,
        timestamp: DateTime<Utc>,
    },

    /// A ledger record was committed
    LedgerMutation {
        sequence: u64,
        record_id: RecordId,
        kind: String,
        vendor_id: VendorId,
        amount: Amount,
        timestamp: DateTime<Utc>,
    },

    /// A ledger record was verified (matching or not)
    RecordVerified {
        record_id: RecordId,
        status: String,
        mismatch_location: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// The conservation invariant failed; the mutation was not committed
    InvariantBreached {
        vendor_id: VendorId,
        detail: String,
        timestamp: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    /// Stable event type string handed to notification ports
    pub fn event_type(&self) -> &'static str {
        match self {
            LifecycleEvent::RequestSubmitted { .. } => "request.submitted",
            LifecycleEvent::RequestApproved { .. } => "request.approved",
            LifecycleEvent::RequestRejected { .. } => "request.rejected",
            LifecycleEvent::FundsAllocated { .. } => "request.allocated",
            LifecycleEvent::WorkStarted { .. } => "request.in_progress",
            LifecycleEvent::RequestCompleted { .. } => "request.completed",
            LifecycleEvent::VendorOnboarded { .. } => "vendor.onboarded",
            LifecycleEvent::LedgerMutation { .. } => "ledger.mutation",
            LifecycleEvent::RecordVerified { .. } => "record.verified",
            LifecycleEvent::InvariantBreached { .. } => "ledger.invariant_breached",
        }
    }

    /// When the event happened
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LifecycleEvent::RequestSubmitted { timestamp, .. }
            | LifecycleEvent::RequestApproved { timestamp, .. }
            | LifecycleEvent::RequestRejected { timestamp, .. }
            | LifecycleEvent::FundsAllocated { timestamp, .. }
            | LifecycleEvent::WorkStarted { timestamp, .. }
            | LifecycleEvent::RequestCompleted { timestamp, .. }
            | LifecycleEvent::VendorOnboarded { timestamp, .. }
            | LifecycleEvent::LedgerMutation { timestamp, .. }
            | LifecycleEvent::RecordVerified { timestamp, .. }
            | LifecycleEvent::InvariantBreached { timestamp, .. } => *timestamp,
        }
    }

    /// True for events that indicate a broken ledger guarantee
    pub fn is_escalation(&self) -> bool {
        matches!(self, LifecycleEvent::InvariantBreached { .. })
    }

    /// JSON payload as delivered to ports that forward over the wire
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
