//! Fixed-point representation for prices and sizes.
//!
//! Exchanges quote prices and sizes as decimal strings with a per-instrument
//! precision (tick size, lot precision). Internally everything is carried as
//! integer "points": the raw value times `10^decimals`. Integer points keep
//! candle arithmetic exact and cheaply comparable; the decimal string only
//! exists at the wire and display boundaries.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::error::{ErrorCategory, ErrorClassification};

/// Fixed-point errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FixedPointError {
    /// The string is not a valid decimal number
    #[error("invalid decimal '{0}'")]
    Parse(String),

    /// Market data values are unsigned
    #[error("negative value '{0}'")]
    Negative(String),

    /// The value has more fractional digits than the instrument precision
    #[error("value '{value}' does not fit {decimals} decimals")]
    PrecisionLoss { value: String, decimals: u32 },

    /// Arithmetic between values of different precision
    #[error("scale mismatch: {left} decimals vs {right} decimals")]
    ScaleMismatch { left: u32, right: u32 },

    /// Value exceeds the representable range
    #[error("value out of range")]
    Overflow,
}

impl ErrorClassification for FixedPointError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Permanent
    }
}

/// An unsigned fixed-point number: `points * 10^-decimals`.
#[derive(Debug, Clone, Copy, Eq)]
pub struct FixedPoint {
    points: u64,
    decimals: u32,
}

impl FixedPoint {
    /// Build from raw integer points.
    pub const fn from_points(points: u64, decimals: u32) -> Self {
        Self { points, decimals }
    }

    /// Number of fractional digits in a precision spec string.
    ///
    /// Exchanges publish precision as a decimal sample ("0.01" means two
    /// fractional digits); the digit count is what seeds instrument scales.
    pub fn precision_of(spec: &str) -> Result<u32, FixedPointError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(FixedPointError::Parse(spec.to_string()));
        }
        Decimal::from_str(spec).map_err(|_| FixedPointError::Parse(spec.to_string()))?;
        match spec.split_once('.') {
            Some((_, frac)) => Ok(frac.len() as u32),
            None => Ok(0),
        }
    }

    /// Parse a decimal string at the given precision.
    ///
    /// The value must be non-negative and must not carry more fractional
    /// digits than `decimals`.
    pub fn parse(s: &str, decimals: u32) -> Result<Self, FixedPointError> {
        let value =
            Decimal::from_str(s.trim()).map_err(|_| FixedPointError::Parse(s.to_string()))?;

        if value.is_sign_negative() {
            return Err(FixedPointError::Negative(s.to_string()));
        }

        let scale = Decimal::from(10u64.checked_pow(decimals).ok_or(FixedPointError::Overflow)?);
        let scaled = value.checked_mul(scale).ok_or(FixedPointError::Overflow)?;

        if scaled.fract() != Decimal::ZERO {
            return Err(FixedPointError::PrecisionLoss {
                value: s.to_string(),
                decimals,
            });
        }

        let points = scaled.to_u64().ok_or(FixedPointError::Overflow)?;
        Ok(Self { points, decimals })
    }

    /// Raw integer points.
    pub fn points(&self) -> u64 {
        self.points
    }

    /// Number of fractional decimal digits.
    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// The value as a `Decimal`.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::from_i128_with_scale(self.points as i128, self.decimals)
    }

    /// Add a value of the same precision.
    pub fn checked_add(&self, other: &Self) -> Result<Self, FixedPointError> {
        if self.decimals != other.decimals {
            return Err(FixedPointError::ScaleMismatch {
                left: self.decimals,
                right: other.decimals,
            });
        }
        let points = self
            .points
            .checked_add(other.points)
            .ok_or(FixedPointError::Overflow)?;
        Ok(Self {
            points,
            decimals: self.decimals,
        })
    }

    /// Subtract a value of the same precision.
    pub fn checked_sub(&self, other: &Self) -> Result<Self, FixedPointError> {
        if self.decimals != other.decimals {
            return Err(FixedPointError::ScaleMismatch {
                left: self.decimals,
                right: other.decimals,
            });
        }
        let points = self
            .points
            .checked_sub(other.points)
            .ok_or(FixedPointError::Overflow)?;
        Ok(Self {
            points,
            decimals: self.decimals,
        })
    }

    // Rescale both sides to a common precision for comparison.
    fn common_points(&self, other: &Self) -> (u128, u128) {
        let decimals = self.decimals.max(other.decimals);
        let left = self.points as u128 * 10u128.pow(decimals - self.decimals);
        let right = other.points as u128 * 10u128.pow(decimals - other.decimals);
        (left, right)
    }
}

impl PartialEq for FixedPoint {
    fn eq(&self, other: &Self) -> bool {
        let (left, right) = self.common_points(other);
        left == right
    }
}

impl PartialOrd for FixedPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FixedPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        let (left, right) = self.common_points(other);
        left.cmp(&right)
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}
