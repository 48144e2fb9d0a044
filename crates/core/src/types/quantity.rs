//! Cart line quantity.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityError {
    /// Quantity below one. Callers treat this as a no-op, not a failure.
    #[error("quantity must be at least {min} (got {got})")]
    TooSmall { min: u32, got: i64 },
    /// Quantity above the per-line cap.
    #[error("quantity must be at most {max} (got {got})")]
    TooLarge { max: u32, got: i64 },
}

/// Number of units on a cart line, always within `1..=99`.
///
/// Deserialization goes through the same bounds check, so a hand-edited or
/// corrupt persisted cart cannot smuggle in a zero or oversized line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Smallest quantity a line can hold.
    pub const MIN: u32 = 1;
    /// Largest quantity a line can hold.
    pub const MAX: u32 = 99;

    /// A single unit.
    pub const ONE: Self = Self(1);

    /// Validate a raw quantity.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError`] when `raw` is outside `1..=99`.
    pub fn new(raw: i64) -> Result<Self, QuantityError> {
        if raw < i64::from(Self::MIN) {
            return Err(QuantityError::TooSmall {
                min: Self::MIN,
                got: raw,
            });
        }
        if raw > i64::from(Self::MAX) {
            return Err(QuantityError::TooLarge {
                max: Self::MAX,
                got: raw,
            });
        }
        // Bounds checked above
        Ok(Self(u32::try_from(raw).unwrap_or(Self::MIN)))
    }

    /// The quantity as a plain integer.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// One more unit, saturating at [`Quantity::MAX`].
    #[must_use]
    pub fn incremented(self) -> Self {
        Self(self.0.saturating_add(1).min(Self::MAX))
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::ONE
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
