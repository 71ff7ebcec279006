//! Fixed-point USDC amount arithmetic — no floating point, ever.
//!
//! 1 USDC = 1_000_000 micro-USDC (6 decimal places), matching the
//! on-chain ERC-20 decimals. Stored as `u64`: the per-toss cap is
//! 10 USDC, so the full pot of any toss fits with enormous headroom.

use std::fmt;
use std::iter::Sum;

use serde::{Deserialize, Serialize};

use crate::error::TossError;

/// USDC amount stored as micro-USDC (6 decimal places).
///
/// # Examples
///
/// ```
/// use tossbot_types::UsdcAmount;
///
/// let stake = UsdcAmount::from_decimal_str("1.5").unwrap();
/// assert_eq!(stake.micros(), 1_500_000);
/// assert_eq!(stake.to_display_string(), "1.5 USDC");
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsdcAmount(u64);

impl UsdcAmount {
    /// Zero USDC.
    pub const ZERO: Self = UsdcAmount(0);
    /// Exactly 1.000000 USDC.
    pub const ONE: Self = UsdcAmount(1_000_000);
    /// The largest stake a toss may carry (10 USDC).
    pub const MAX_STAKE: Self = UsdcAmount(10_000_000);
    /// Stake used when the creator names none (0.1 USDC).
    pub const DEFAULT_STAKE: Self = UsdcAmount(100_000);

    /// Number of decimal places (6).
    const DECIMALS: u32 = 6;
    /// Micro-USDC per USDC.
    const SCALE: u64 = 1_000_000;

    /// Create from raw micro-USDC.
    #[inline]
    pub fn from_micros(micros: u64) -> Self {
        UsdcAmount(micros)
    }

    /// Parse a decimal string like `"0.25"` or `"10"`.
    ///
    /// Up to 6 decimal places accepted; more is an error.
    pub fn from_decimal_str(s: &str) -> Result<Self, TossError> {
        let s = s.trim();
        let invalid = || TossError::InvalidAmount {
            message: format!("'{s}' is not a valid USDC amount"),
        };
        if let Some((whole, frac)) = s.split_once('.') {
            if frac.is_empty() || frac.len() > Self::DECIMALS as usize {
                return Err(invalid());
            }
            let whole_val: u64 = whole.parse().map_err(|_| invalid())?;
            let frac_str = format!("{frac:0<6}");
            let frac_val: u64 = frac_str.parse().map_err(|_| invalid())?;
            whole_val
                .checked_mul(Self::SCALE)
                .and_then(|w| w.checked_add(frac_val))
                .map(UsdcAmount)
                .ok_or_else(invalid)
        } else {
            let whole_val: u64 = s.parse().map_err(|_| invalid())?;
            whole_val
                .checked_mul(Self::SCALE)
                .map(UsdcAmount)
                .ok_or_else(invalid)
        }
    }

    /// Raw micro-USDC value.
    #[inline]
    pub fn micros(&self) -> u64 {
        self.0
    }

    /// Format as `"1.500000"` (always 6 decimal places).
    pub fn to_decimal_string(&self) -> String {
        format!("{}.{:06}", self.0 / Self::SCALE, self.0 % Self::SCALE)
    }

    /// Format as `"1.5 USDC"` (trailing zeros stripped).
    pub fn to_display_string(&self) -> String {
        let s = self.to_decimal_string();
        let s = s.trim_end_matches('0');
        let s = s.trim_end_matches('.');
        format!("{s} USDC")
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition — `None` on overflow.
    #[inline]
    pub fn checked_add(&self, rhs: &Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(UsdcAmount)
    }

    /// Checked subtraction — `None` if the result would be negative.
    #[inline]
    pub fn checked_sub(&self, rhs: &Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(UsdcAmount)
    }

    /// Checked multiplication by a count (e.g. stake × participants).
    #[inline]
    pub fn checked_mul(&self, factor: u64) -> Option<Self> {
        self.0.checked_mul(factor).map(UsdcAmount)
    }

    /// Checked division by a count (e.g. pot ÷ winners). Truncates.
    #[inline]
    pub fn checked_div(&self, divisor: u64) -> Option<Self> {
        if divisor == 0 {
            None
        } else {
            Some(UsdcAmount(self.0 / divisor))
        }
    }
}

impl fmt::Display for UsdcAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl Default for UsdcAmount {
    fn default() -> Self {
        UsdcAmount::ZERO
    }
}

impl Sum for UsdcAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(UsdcAmount::ZERO, |acc, x| {
            acc.checked_add(&x).expect("UsdcAmount sum overflow")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whole_and_fractional() {
        assert_eq!(UsdcAmount::from_decimal_str("10").unwrap().micros(), 10_000_000);
        assert_eq!(UsdcAmount::from_decimal_str("0.1").unwrap(), UsdcAmount::DEFAULT_STAKE);
        assert_eq!(UsdcAmount::from_decimal_str("1.000001").unwrap().micros(), 1_000_001);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "abc", "1.2345678", "1.", "-1", "1,5"] {
            assert!(UsdcAmount::from_decimal_str(bad).is_err(), "accepted '{bad}'");
        }
    }

    #[test]
    fn test_decimal_roundtrip() {
        for s in ["0.25", "0.000001", "10", "0", "9.999999"] {
            let parsed = UsdcAmount::from_decimal_str(s).unwrap();
            let reparsed = UsdcAmount::from_decimal_str(&parsed.to_decimal_string()).unwrap();
            assert_eq!(parsed, reparsed, "roundtrip failed for '{s}'");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(UsdcAmount::from_micros(1_500_000).to_display_string(), "1.5 USDC");
        assert_eq!(UsdcAmount::MAX_STAKE.to_display_string(), "10 USDC");
        assert_eq!(UsdcAmount::ZERO.to_display_string(), "0 USDC");
    }

    #[test]
    fn test_pot_arithmetic() {
        let stake = UsdcAmount::ONE;
        let pot = stake.checked_mul(3).unwrap();
        assert_eq!(pot.micros(), 3_000_000);
        let per_winner = pot.checked_div(2).unwrap();
        assert_eq!(per_winner.micros(), 1_500_000);
        assert!(pot.checked_div(0).is_none());
    }

    #[test]
    fn test_checked_sub_underflow() {
        assert!(UsdcAmount::ZERO.checked_sub(&UsdcAmount::ONE).is_none());
    }
}
