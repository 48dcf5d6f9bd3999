//! Money value object.

use serde::{Deserialize, Serialize};

/// Money amount represented in cents to avoid floating point issues.
///
/// Serializes as a bare integer number of cents.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a whole dollar value.
    pub fn from_dollars(dollars: i64) -> Self {
        Self {
            cents: dollars * 100,
        }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the amount as a fractional dollar value, as remote services expect it.
    pub fn as_dollars(&self) -> f64 {
        self.cents as f64 / 100.0
    }

    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity, saturating at the representable bounds.
    pub fn multiply(&self, quantity: u32) -> Self {
        Self {
            cents: self.cents.saturating_mul(i64::from(quantity)),
        }
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    pub fn checked_mul(&self, quantity: u32) -> Option<Self> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(Self::from_cents)
    }

    /// Adds two amounts, returning `None` on overflow.
    pub fn checked_add(&self, rhs: Self) -> Option<Self> {
        self.cents.checked_add(rhs.cents).map(Self::from_cents)
    }
}

impl std::ops::Add for Money {
    type Output = Self;

    /// Saturates instead of overflowing; use [`Money::checked_add`] to detect it.
    fn add(self, rhs: Self) -> Self {
        Self {
            cents: self.cents.saturating_add(rhs.cents),
        }
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, m| acc + m)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}
