//! Fundtrail Events - JSONL ledger journal
//!
//! The journal is the source of truth for the ledger: vendor registrations,
//! committed records and verification status changes are appended as JSON
//! lines, one file per UTC day. Wallet balances are rebuilt from it on startup.

pub mod error;
pub mod line;
pub mod reader;
pub mod store;

pub use error::EventError;
pub use line::JournalLine;
pub use reader::{JournalReader, JournalSnapshot};
pub use store::JournalStore;
