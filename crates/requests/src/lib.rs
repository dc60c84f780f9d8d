//! # Fundtrail Requests
//!
//! Budget request lifecycle, from submission to a paid vendor.
//!
//! ```text
//! pending -> approved -> allocated -> in-progress -> completed
//!        \-> rejected
//! ```
//!
//! ## Features
//! - The state machine is the single authority on whether a request has
//!   consumed its allocation
//! - Allocation and completion drive the wallet ledger
//! - SQLite storage for request state

mod machine;
mod request;
mod store;

pub use machine::{BudgetRequestStateMachine, MachineConfig, RequestError, RequestStats};
pub use request::{BudgetRequest, NewRequest, Priority, RequestState};
pub use store::{RequestStore, StoreError};
