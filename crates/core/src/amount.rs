//! Fixed-point on-chain amounts.

use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("empty amount")]
    Empty,
    #[error("invalid amount: {0:?}")]
    Invalid(String),
}

/// Fixed-point integer with 18 decimal places (wei-style).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeiAmount(pub u128);

impl WeiAmount {
    /// Scale factor: 10^18.
    pub const SCALE: u128 = 1_000_000_000_000_000_000;

    pub const ZERO: WeiAmount = WeiAmount(0);

    /// Convert to a human-readable decimal value.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Ratio `self / other`, or `None` when the denominator is zero.
    ///
    /// Both sides share the same scale, so the ratio is scale-free.
    pub fn ratio(self, other: WeiAmount) -> Option<f64> {
        if other.is_zero() {
            return None;
        }
        Some(self.0 as f64 / other.0 as f64)
    }
}

impl FromStr for WeiAmount {
    type Err = AmountError;

    /// Accepts plain integers (`"60000000000000000000"`) and, for payloads that
    /// arrive in scientific notation, non-negative finite floats (`"6e19"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        if let Ok(raw) = s.parse::<u128>() {
            return Ok(Self(raw));
        }
        match s.parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => Ok(Self(v as u128)),
            _ => Err(AmountError::Invalid(s.to_string())),
        }
    }
}
