//! Exact money amounts
//!
//! Charge amounts are held as integer cents so that summing many charge
//! lines is exact and a rebuild from identical input produces identical
//! totals.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A money amount in cents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Amount(i64);

impl Amount {
    /// Zero
    pub const ZERO: Amount = Amount(0);

    /// Creates an amount from cents
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Converts a floating point amount (as produced by CSV loaders) to cents,
    /// rounding half away from zero
    pub fn from_f64(value: f64) -> Result<Self, String> {
        if !value.is_finite() {
            return Err(format!("amount is not a finite number: {value}"));
        }
        let cents = (value * 100.0).round();
        if cents.abs() > i64::MAX as f64 {
            return Err(format!("amount out of range: {value}"));
        }
        Ok(Self(cents as i64))
    }

    /// Returns the amount in cents
    pub fn cents(&self) -> i64 {
        self.0
    }

    /// True if the amount is below zero
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Adds two amounts; `None` if the sum leaves the cent range
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl FromStr for Amount {
    type Err = String;

    /// Parses a plain decimal such as `150`, `-5.5` or `1234.56`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };

        if (whole.is_empty() && frac.is_empty())
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(format!("invalid amount: '{s}'"));
        }

        if frac.len() > 2 {
            // Sub-cent precision: fall back to rounding through f64
            let value: f64 = s.parse().map_err(|_| format!("invalid amount: '{s}'"))?;
            return Amount::from_f64(value);
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| format!("amount out of range: '{s}'"))?
        };
        let frac_cents: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|e| e.to_string())? * 10,
            _ => frac.parse::<i64>().map_err(|e| e.to_string())?,
        };

        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac_cents))
            .ok_or_else(|| format!("amount out of range: '{s}'"))?;

        Ok(Amount(if negative { -cents } else { cents }))
    }
}
