//! Canonical hashing for ledger record integrity
//!
//! A record's `data_hash` is SHA-256 over a fixed, ordered projection of its
//! financial fields. Every layer that recomputes the hash must produce the
//! same bytes, so serialization is spelled out here once:
//!
//! ```text
//! <algorithm tag>|<len>:<request id>|<len>:<amount>|<len>:<timestamp>|...
//! ```
//!
//! Field order and selection belong to the algorithm version. Changing either
//! means adding a new [`HashAlgorithm`] variant, never editing an existing one.

use chrono::{DateTime, SecondsFormat, Utc};
use fundtrail_core::Amount;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum_macros::{Display, EnumString};

/// Length of a hex-encoded SHA-256 digest
pub const DIGEST_HEX_LEN: usize = 64;

/// Versioned canonical hashing scheme, stored on every record
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
pub enum HashAlgorithm {
    /// SHA-256 over the nine v1 fields, length-prefixed, `|`-separated
    #[default]
    #[strum(serialize = "sha256-canon-v1")]
    #[serde(rename = "sha256-canon-v1")]
    Sha256CanonV1,
}

impl HashAlgorithm {
    /// Tag written into the payload and onto the record
    pub fn tag(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256CanonV1 => "sha256-canon-v1",
        }
    }
}

/// The fields covered by the canonical hash, in contract order.
///
/// Absent values (a withdrawal has no request) are empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalFields<'a> {
    pub request_id: &'a str,
    pub amount: Amount,
    pub timestamp: DateTime<Utc>,
    pub department: &'a str,
    pub project: &'a str,
    pub vendor_id: &'a str,
    /// Allocating authority (approver) id
    pub authority: &'a str,
    pub category: &'a str,
    /// Vendor display name as snapshotted when the record was created
    pub vendor_name: &'a str,
}

impl CanonicalFields<'_> {
    /// Field values in contract order
    pub fn ordered(&self) -> [String; 9] {
        [
            self.request_id.to_string(),
            self.amount.canonical(),
            canonical_timestamp(self.timestamp),
            self.department.to_string(),
            self.project.to_string(),
            self.vendor_id.to_string(),
            self.authority.to_string(),
            self.category.to_string(),
            self.vendor_name.to_string(),
        ]
    }
}

/// RFC 3339, UTC, microsecond precision, `Z` suffix
pub fn canonical_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Bytes fed to the digest
pub fn canonical_payload(algorithm: HashAlgorithm, fields: &CanonicalFields<'_>) -> Vec<u8> {
    let mut payload = String::from(algorithm.tag());
    for value in fields.ordered() {
        payload.push('|');
        payload.push_str(&value.len().to_string());
        payload.push(':');
        payload.push_str(&value);
    }
    payload.into_bytes()
}

/// Compute the hex digest of the canonical payload
pub fn compute_hash(algorithm: HashAlgorithm, fields: &CanonicalFields<'_>) -> String {
    match algorithm {
        HashAlgorithm::Sha256CanonV1 => {
            let mut hasher = Sha256::new();
            hasher.update(canonical_payload(algorithm, fields));
            hex::encode(hasher.finalize())
        }
    }
}

/// Hash engine bound to one algorithm version.
///
/// The ledger stamps new records with its engine; verifiers recompute with
/// whatever algorithm the record carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HashEngine {
    algorithm: HashAlgorithm,
}

impl HashEngine {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn compute(&self, fields: &CanonicalFields<'_>) -> String {
        compute_hash(self.algorithm, fields)
    }
}
