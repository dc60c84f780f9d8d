//! Fundtrail Ledger - vendor wallets and the records that move them
//!
//! Every change to a vendor balance goes through [`WalletLedger`], which
//! writes exactly one [`LedgerRecord`] per successful operation.
//!
//! # Key Types
//! - `VendorWallet`: five balance buckets with the conservation invariant
//! - `LedgerRecord`: immutable entry carrying a canonical `data_hash`
//! - `HashEngine`: versioned canonical hashing shared by every layer
//! - `LedgerStore`: persistence port (in-memory here, JSONL in `fundtrail-events`)

pub mod engine;
pub mod error;
pub mod hash;
pub mod record;
pub mod store;
pub mod wallet;

pub use engine::{LedgerConfig, WalletLedger};
pub use error::{BalanceSource, LedgerError};
pub use hash::{canonical_timestamp, compute_hash, CanonicalFields, HashAlgorithm, HashEngine};
pub use record::{HoldBucket, LedgerRecord, RecordContext, RecordKind, VerificationStatus};
pub use store::{LedgerStore, MemoryLedgerStore, StoreError};
pub use wallet::{VendorProfile, VendorWallet};
