//! Amount - exact, never-negative money
//!
//! Wallet buckets, request amounts and ledger record amounts are all `Amount`.
//! A negative value cannot be constructed, so no bucket can be stored below
//! zero; arithmetic that would cross zero returns `None` instead.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount cannot be negative: {0}")]
    NegativeAmount(Decimal),

    #[error("Amount must be greater than zero: {0}")]
    NotPositive(Decimal),
}

/// Non-negative decimal amount.
///
/// Serialised as a decimal string (`"50000.00"`), never a float.
///
/// ```
/// use fundtrail_core::Amount;
/// use rust_decimal::Decimal;
///
/// let budget = Amount::new(Decimal::new(50_000, 0)).unwrap();
/// assert_eq!(budget.canonical(), "50000");
///
/// // Balances may be zero, operation amounts may not
/// assert!(Amount::new(Decimal::ZERO).is_ok());
/// assert!(Amount::positive(Decimal::ZERO).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Any value `>= 0`; used for balances
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::NegativeAmount(value));
        }
        Ok(Self(value))
    }

    /// Any value `> 0`; used for request and operation amounts
    pub fn positive(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }
        Ok(Self(value))
    }

    pub const fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `None` on decimal overflow
    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Self)
    }

    /// `None` when `other` is larger than `self`
    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        if other.0 > self.0 {
            return None;
        }
        self.0.checked_sub(other.0).map(Self)
    }

    /// Form used inside hash payloads: scale stripped, no exponent.
    ///
    /// `50000.00`, `50000.0` and `50000` all give `50000`.
    pub fn canonical(&self) -> String {
        self.0.normalize().to_string()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::ZERO
    }
}
