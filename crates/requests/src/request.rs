//! Budget request data structures

use crate::machine::RequestError;
use chrono::{DateTime, Utc};
use fundtrail_core::{Amount, RecordId, RequestId, VendorId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Lifecycle state of a budget request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RequestState {
    /// Submitted, awaiting a decision
    Pending,
    /// Approved, awaiting allocation
    Approved,
    /// Declined by an approver
    Rejected,
    /// Funds moved into the vendor's pending bucket
    Allocated,
    /// Vendor is working on it
    InProgress,
    /// Allocation released to the vendor
    Completed,
}

impl RequestState {
    pub const ALL: [RequestState; 6] = [
        RequestState::Pending,
        RequestState::Approved,
        RequestState::Rejected,
        RequestState::Allocated,
        RequestState::InProgress,
        RequestState::Completed,
    ];

    /// Terminal states are absorbing
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Rejected | RequestState::Completed)
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Input for `submit`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub amount: Decimal,
    pub department: String,
    pub project: String,
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub description: String,
    pub requester: String,
}

/// A budget request and its lifecycle fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRequest {
    pub request_id: RequestId,
    pub amount: Amount,
    pub department: String,
    pub project: String,
    pub category: String,
    pub priority: Priority,
    pub description: String,
    pub requester: String,
    pub state: RequestState,

    /// Set on approval or rejection
    pub approver: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,

    /// Unset until the request is allocated; never above `amount`
    pub assigned_vendor: Option<VendorId>,
    pub allocated_amount: Option<Amount>,
    /// Ledger record produced by the allocation
    pub allocation_record: Option<RecordId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn required(value: &str, field: &str) -> Result<String, RequestError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RequestError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

impl BudgetRequest {
    /// Validate input and build a `pending` request with a fresh id
    pub fn new(input: NewRequest) -> Result<Self, RequestError> {
        let amount = Amount::positive(input.amount)
            .map_err(|e| RequestError::Validation(e.to_string()))?;
        let now = Utc::now();

        Ok(Self {
            request_id: RequestId::generate(),
            amount,
            department: required(&input.department, "department")?,
            project: required(&input.project, "project")?,
            category: required(&input.category, "category")?,
            priority: input.priority,
            description: input.description.trim().to_string(),
            requester: required(&input.requester, "requester")?,
            state: RequestState::Pending,
            approver: None,
            approved_at: None,
            rejection_reason: None,
            assigned_vendor: None,
            allocated_amount: None,
            allocation_record: None,
            created_at: now,
            updated_at: now,
        })
    }
}
