//! Typed identifiers
//!
//! Requests, ledger records and vendors are all addressed by strings on the
//! wire. The newtypes keep them from being mixed up in signatures.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing identifiers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("Empty {0} identifier")]
    Empty(&'static str),

    #[error("Invalid {kind} identifier: {value}")]
    InvalidFormat { kind: &'static str, value: String },
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse an identifier, trimming surrounding whitespace.
            pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(IdError::Empty($kind));
                }
                if trimmed.chars().any(|c| c.is_control()) {
                    return Err(IdError::InvalidFormat {
                        kind: $kind,
                        value: trimmed.to_string(),
                    });
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Budget request identifier (`REQ-<uuid>` when minted by the system)
    RequestId,
    "request"
);

string_id!(
    /// Ledger record identifier (`TX-...`)
    RecordId,
    "record"
);

string_id!(
    /// Vendor identifier, one wallet per vendor
    VendorId,
    "vendor"
);

fn uuid_hex() -> String {
    uuid::Uuid::new_v4().simple().to_string().to_uppercase()
}

impl RequestId {
    /// Mint a fresh request id from a full v4 uuid
    pub fn generate() -> Self {
        Self(format!("REQ-{}", uuid_hex()))
    }
}

impl RecordId {
    /// Mint a fresh record id
    pub fn generate() -> Self {
        Self(format!("TX-{}", uuid_hex()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_request_id_format() {
        let id = RequestId::generate();
        assert!(id.as_str().starts_with("REQ-"));
        assert_eq!(id.as_str().len(), 36);
        assert!(id.as_str()[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_request_ids_do_not_collide() {
        let ids: std::collections::HashSet<RequestId> =
            (0..50_000).map(|_| RequestId::generate()).collect();
        assert_eq!(ids.len(), 50_000);
    }

    #[test]
    fn test_generated_record_ids_are_unique() {
        let a = RecordId::generate();
        let b = RecordId::generate();
        assert!(a.as_str().starts_with("TX-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_vendor_id_trims() {
        let id: VendorId = "  ACME-01 ".parse().unwrap();
        assert_eq!(id.as_str(), "ACME-01");
    }

    #[test]
    fn test_empty_id_rejected() {
        assert_eq!(VendorId::new("   "), Err(IdError::Empty("vendor")));
        assert!(matches!(
            RequestId::new("REQ\n1"),
            Err(IdError::InvalidFormat { kind: "request", .. })
        ));
    }

    #[test]
    fn test_serde_transparent_string() {
        let id = VendorId::new("V-1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"V-1\"");
        let parsed: VendorId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
        assert!(serde_json::from_str::<VendorId>("\"\"").is_err());
    }
}
