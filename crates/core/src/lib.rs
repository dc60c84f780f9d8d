//! Fundtrail Core - Domain types
//!
//! This crate contains the fundamental types used across Fundtrail:
//! - `Amount`: Non-negative decimal wrapper for financial amounts
//! - `RequestId`, `RecordId`, `VendorId`: Typed identifiers

pub mod amount;
pub mod ids;

pub use amount::{Amount, AmountError};
pub use ids::{IdError, RecordId, RequestId, VendorId};
