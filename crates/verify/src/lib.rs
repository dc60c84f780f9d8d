//! Fundtrail Verify - record integrity checks
//!
//! A record's stored `data_hash` is compared against digests recomputed by
//! independent layers:
//! - layer A: the creating layer (the ledger's own hash engine)
//! - layer B: the stored hash itself
//! - layer C: an optional downstream reader of the persisted copy
//!
//! Mismatches are results, not errors.

pub mod audit;
pub mod error;
pub mod layer;
pub mod service;

pub use audit::{AuditIssue, AuditReport};
pub use error::VerifyError;
pub use layer::{EngineLayer, HashLayer};
pub use service::{ComputedHashes, HashMismatch, MismatchLocation, Verification, VerificationService};
