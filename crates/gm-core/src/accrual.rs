//! Exact loyalty-point amounts.
//!
//! Amounts are held as an `i64` count of minor units (hundredths). Nothing in
//! this crate converts through floating point: decimal text is parsed digit by
//! digit and rendered back with exactly two fractional digits. Sums therefore
//! accumulate without rounding drift.
//!
//! There is intentionally no `From<i64>`; use [`Accrual::from_minor`] so the
//! scale is explicit at the call site.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use thiserror::Error;

/// Minor units per whole point.
pub const MINOR_PER_UNIT: i64 = 100;

/// A monetary amount at 1e-2 scale.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Accrual(i64);

impl Accrual {
    pub const ZERO: Accrual = Accrual(0);

    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Accrual(minor)
    }

    /// Whole units, e.g. `Accrual::from_units(5) == "5.00"`.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Accrual(units * MINOR_PER_UNIT)
    }

    #[inline]
    pub const fn minor(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub fn saturating_add(self, rhs: Accrual) -> Accrual {
        Accrual(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Accrual) -> Accrual {
        Accrual(self.0.saturating_sub(rhs.0))
    }

    /// Lossy view for wire encodings that insist on a JSON number.
    /// Never feed the result back into arithmetic.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / MINOR_PER_UNIT as f64
    }

    /// Parse a decimal such as `"500"`, `"5.5"`, `"729.98"` or `"-1.25"`.
    ///
    /// At most two fractional digits are accepted; `"1.005"` is an error
    /// rather than a silent rounding. Exponent notation is rejected.
    pub fn parse_decimal(s: &str) -> Result<Self, AccrualParseError> {
        let t = s.trim();
        let err = || AccrualParseError::Malformed(t.to_string());

        let (negative, body) = match t.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, t),
        };

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };

        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        if body.contains('.') && frac_part.is_empty() {
            return Err(err());
        }
        if frac_part.len() > 2 {
            return Err(AccrualParseError::TooPrecise(t.to_string()));
        }

        let units: i64 = int_part
            .parse()
            .map_err(|_| AccrualParseError::OutOfRange(t.to_string()))?;

        let mut frac: i64 = 0;
        for (i, b) in frac_part.bytes().enumerate() {
            let digit = i64::from(b - b'0');
            frac += if i == 0 { digit * 10 } else { digit };
        }

        let minor = units
            .checked_mul(MINOR_PER_UNIT)
            .and_then(|m| m.checked_add(frac))
            .ok_or_else(|| AccrualParseError::OutOfRange(t.to_string()))?;

        Ok(Accrual(if negative { -minor } else { minor }))
    }
}

impl fmt::Display for Accrual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MINOR_PER_UNIT as u64;
        write!(f, "{sign}{}.{:02}", abs / per, abs % per)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccrualParseError {
    #[error("not a decimal amount: {0:?}")]
    Malformed(String),
    #[error("amount has more than two fractional digits: {0:?}")]
    TooPrecise(String),
    #[error("amount out of range: {0:?}")]
    OutOfRange(String),
}

// ---------------------------------------------------------------------------
// Arithmetic (closed over Accrual)
// ---------------------------------------------------------------------------

impl Add for Accrual {
    type Output = Accrual;
    #[inline]
    fn add(self, rhs: Accrual) -> Accrual {
        Accrual(self.0 + rhs.0)
    }
}

impl Sub for Accrual {
    type Output = Accrual;
    #[inline]
    fn sub(self, rhs: Accrual) -> Accrual {
        Accrual(self.0 - rhs.0)
    }
}

impl Neg for Accrual {
    type Output = Accrual;
    #[inline]
    fn neg(self) -> Accrual {
        Accrual(-self.0)
    }
}

impl AddAssign for Accrual {
    #[inline]
    fn add_assign(&mut self, rhs: Accrual) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Accrual {
    #[inline]
    fn sub_assign(&mut self, rhs: Accrual) {
        self.0 -= rhs.0;
    }
}

impl Sum for Accrual {
    fn sum<I: Iterator<Item = Accrual>>(iter: I) -> Accrual {
        iter.fold(Accrual::ZERO, |acc, x| acc.saturating_add(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_whole_and_fractional() {
        assert_eq!(Accrual::parse_decimal("500").unwrap(), Accrual::from_minor(50_000));
        assert_eq!(Accrual::parse_decimal("5.5").unwrap(), Accrual::from_minor(550));
        assert_eq!(Accrual::parse_decimal("729.98").unwrap(), Accrual::from_minor(72_998));
        assert_eq!(Accrual::parse_decimal("0.01").unwrap(), Accrual::from_minor(1));
        assert_eq!(Accrual::parse_decimal("-1.25").unwrap(), Accrual::from_minor(-125));
    }

    #[test]
    fn parse_is_exact_where_floats_are_not() {
        // 0.29 * 100.0 == 28.999999999999996 in f64
        assert_eq!(Accrual::parse_decimal("0.29").unwrap().minor(), 29);
    }

    #[test]
    fn parse_rejects_junk_and_excess_precision() {
        for bad in ["", "abc", ".5", "5.", "1e3", "1,5", "--1", "1.2.3"] {
            assert!(
                matches!(Accrual::parse_decimal(bad), Err(AccrualParseError::Malformed(_))),
                "expected malformed for {bad:?}"
            );
        }
        assert!(matches!(
            Accrual::parse_decimal("1.005"),
            Err(AccrualParseError::TooPrecise(_))
        ));
        assert!(matches!(
            Accrual::parse_decimal("99999999999999999999"),
            Err(AccrualParseError::OutOfRange(_))
        ));
    }

    #[test]
    fn display_always_two_decimals() {
        assert_eq!(Accrual::from_minor(500).to_string(), "5.00");
        assert_eq!(Accrual::from_minor(1).to_string(), "0.01");
        assert_eq!(Accrual::from_minor(-125).to_string(), "-1.25");
        assert_eq!(Accrual::ZERO.to_string(), "0.00");
    }

    #[test]
    fn sum_is_exact() {
        let total: Accrual = std::iter::repeat(Accrual::from_minor(10)).take(1_000).sum();
        assert_eq!(total, Accrual::from_units(100));
    }
}
