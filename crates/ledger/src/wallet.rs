//! Vendor wallets - five balance buckets per vendor
//!
//! # Invariant
//! `allocated == available + pending + withdrawn + frozen`, checked on every
//! state a wallet moves into. No bucket can go below zero because every bucket
//! is an [`Amount`].

use crate::error::{BalanceSource, LedgerError};
use crate::record::{HoldBucket, RecordKind};
use chrono::{DateTime, Utc};
use fundtrail_core::{Amount, VendorId};
use serde::{Deserialize, Serialize};

/// A vendor as registered at onboarding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorProfile {
    pub vendor_id: VendorId,
    pub display_name: String,
    pub onboarded_at: DateTime<Utc>,
}

/// Balance buckets for one vendor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorWallet {
    vendor_id: VendorId,
    display_name: String,
    allocated: Amount,
    available: Amount,
    pending: Amount,
    withdrawn: Amount,
    frozen: Amount,
    updated_at: DateTime<Utc>,
}

impl VendorWallet {
    /// Empty wallet for a freshly onboarded vendor
    pub fn open(profile: &VendorProfile) -> Self {
        Self {
            vendor_id: profile.vendor_id.clone(),
            display_name: profile.display_name.clone(),
            allocated: Amount::ZERO,
            available: Amount::ZERO,
            pending: Amount::ZERO,
            withdrawn: Amount::ZERO,
            frozen: Amount::ZERO,
            updated_at: profile.onboarded_at,
        }
    }

    pub fn vendor_id(&self) -> &VendorId {
        &self.vendor_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn allocated(&self) -> Amount {
        self.allocated
    }

    pub fn available(&self) -> Amount {
        self.available
    }

    pub fn pending(&self) -> Amount {
        self.pending
    }

    pub fn withdrawn(&self) -> Amount {
        self.withdrawn
    }

    pub fn frozen(&self) -> Amount {
        self.frozen
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Sum of the four sub-buckets
    pub fn sub_total(&self) -> Option<Amount> {
        self.available
            .checked_add(&self.pending)?
            .checked_add(&self.withdrawn)?
            .checked_add(&self.frozen)
    }

    /// Verify `allocated == available + pending + withdrawn + frozen`
    pub fn check_conservation(&self) -> Result<(), LedgerError> {
        match self.sub_total() {
            Some(total) if total == self.allocated => Ok(()),
            Some(total) => Err(LedgerError::InvariantViolation {
                vendor_id: self.vendor_id.clone(),
                detail: format!(
                    "allocated {} != available {} + pending {} + withdrawn {} + frozen {} = {}",
                    self.allocated, self.available, self.pending, self.withdrawn, self.frozen, total
                ),
            }),
            None => Err(LedgerError::InvariantViolation {
                vendor_id: self.vendor_id.clone(),
                detail: "bucket sum overflowed".to_string(),
            }),
        }
    }

    /// Compute the wallet state after applying `kind` for `amount`.
    ///
    /// `self` is never modified; the caller swaps the result in once the
    /// ledger record has been committed.
    pub fn apply(
        &self,
        kind: &RecordKind,
        amount: Amount,
        at: DateTime<Utc>,
    ) -> Result<VendorWallet, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }

        let mut next = self.clone();
        match kind {
            RecordKind::Allocation => {
                next.allocated = add(self.allocated, amount)?;
                next.pending = add(self.pending, amount)?;
            }
            RecordKind::Release => {
                next.pending = take(self.pending, amount, BalanceSource::Pending)?;
                next.available = add(self.available, amount)?;
            }
            RecordKind::Withdrawal => {
                next.available = take(self.available, amount, BalanceSource::Available)?;
                next.withdrawn = add(self.withdrawn, amount)?;
            }
            RecordKind::Freeze { source, .. } => {
                match source {
                    HoldBucket::Available => {
                        next.available = take(self.available, amount, BalanceSource::Available)?
                    }
                    HoldBucket::Pending => {
                        next.pending = take(self.pending, amount, BalanceSource::Pending)?
                    }
                }
                next.frozen = add(self.frozen, amount)?;
            }
            RecordKind::Unfreeze { target } => {
                next.frozen = take(self.frozen, amount, BalanceSource::Frozen)?;
                match target {
                    HoldBucket::Available => next.available = add(self.available, amount)?,
                    HoldBucket::Pending => next.pending = add(self.pending, amount)?,
                }
            }
        }
        next.updated_at = at;

        next.check_conservation()?;
        Ok(next)
    }
}

fn add(bucket: Amount, amount: Amount) -> Result<Amount, LedgerError> {
    bucket
        .checked_add(&amount)
        .ok_or_else(|| LedgerError::Validation(format!("amount {amount} overflows balance")))
}

fn take(bucket: Amount, amount: Amount, source: BalanceSource) -> Result<Amount, LedgerError> {
    bucket
        .checked_sub(&amount)
        .ok_or_else(|| LedgerError::insufficient(source, amount.value(), bucket.value()))
}

#[cfg(test)]
impl VendorWallet {
    /// Wallet with arbitrary buckets, including inconsistent ones
    pub(crate) fn with_buckets(
        vendor_id: &str,
        allocated: Amount,
        available: Amount,
        pending: Amount,
        withdrawn: Amount,
        frozen: Amount,
    ) -> Self {
        Self {
            vendor_id: VendorId::new(vendor_id).unwrap(),
            display_name: vendor_id.to_string(),
            allocated,
            available,
            pending,
            withdrawn,
            frozen,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amt(value: rust_decimal::Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    fn wallet() -> VendorWallet {
        VendorWallet::open(&VendorProfile {
            vendor_id: VendorId::new("V-1").unwrap(),
            display_name: "Acme".to_string(),
            onboarded_at: Utc::now(),
        })
    }

    fn freeze(source: HoldBucket) -> RecordKind {
        RecordKind::Freeze {
            source,
            reason: "compliance".to_string(),
        }
    }

    #[test]
    fn test_full_lifecycle_conserves() {
        let now = Utc::now();
        let w = wallet()
            .apply(&RecordKind::Allocation, amt(dec!(1000)), now)
            .unwrap();
        assert_eq!(w.allocated(), amt(dec!(1000)));
        assert_eq!(w.pending(), amt(dec!(1000)));

        let w = w.apply(&RecordKind::Release, amt(dec!(600)), now).unwrap();
        let w = w.apply(&RecordKind::Withdrawal, amt(dec!(250)), now).unwrap();
        let w = w.apply(&freeze(HoldBucket::Pending), amt(dec!(100)), now).unwrap();
        let w = w.apply(&freeze(HoldBucket::Available), amt(dec!(50)), now).unwrap();
        let w = w
            .apply(&RecordKind::Unfreeze { target: HoldBucket::Available }, amt(dec!(30)), now)
            .unwrap();

        assert_eq!(w.allocated(), amt(dec!(1000)));
        assert_eq!(w.pending(), amt(dec!(300)));
        assert_eq!(w.available(), amt(dec!(330)));
        assert_eq!(w.withdrawn(), amt(dec!(250)));
        assert_eq!(w.frozen(), amt(dec!(120)));
        assert!(w.check_conservation().is_ok());
    }

    #[test]
    fn test_release_more_than_pending_fails_without_mutation() {
        let w = wallet()
            .apply(&RecordKind::Allocation, amt(dec!(100)), Utc::now())
            .unwrap();
        let before = w.clone();

        let err = w
            .apply(&RecordKind::Release, amt(dec!(101)), Utc::now())
            .unwrap_err();

        assert_eq!(
            err,
            LedgerError::insufficient(BalanceSource::Pending, dec!(101), dec!(100))
        );
        assert_eq!(w, before);
    }

    #[test]
    fn test_withdraw_never_partial() {
        let w = wallet()
            .apply(&RecordKind::Allocation, amt(dec!(100)), Utc::now())
            .unwrap()
            .apply(&RecordKind::Release, amt(dec!(40)), Utc::now())
            .unwrap();

        let err = w
            .apply(&RecordKind::Withdrawal, amt(dec!(41)), Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance { bucket: BalanceSource::Available, .. }
        ));
        assert_eq!(w.available(), amt(dec!(40)));
        assert_eq!(w.withdrawn(), Amount::ZERO);
    }

    #[test]
    fn test_freeze_and_unfreeze_bounds() {
        let w = wallet()
            .apply(&RecordKind::Allocation, amt(dec!(10)), Utc::now())
            .unwrap();
        assert!(w.apply(&freeze(HoldBucket::Available), amt(dec!(1)), Utc::now()).is_err());
        assert!(w
            .apply(&RecordKind::Unfreeze { target: HoldBucket::Pending }, amt(dec!(1)), Utc::now())
            .is_err());
    }

    #[test]
    fn test_zero_amount_rejected() {
        let result = wallet().apply(&RecordKind::Allocation, Amount::ZERO, Utc::now());
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_conservation_violation_detected() {
        let broken = VendorWallet::with_buckets(
            "V-BROKEN",
            amt(dec!(100)),
            amt(dec!(50)),
            amt(dec!(40)),
            Amount::ZERO,
            Amount::ZERO,
        );
        let err = broken.check_conservation().unwrap_err();
        assert!(err.is_fatal());

        // Any mutation of an inconsistent wallet is refused
        let result = broken.apply(&RecordKind::Release, amt(dec!(10)), Utc::now());
        assert!(matches!(result, Err(LedgerError::InvariantViolation { .. })));
    }
}
