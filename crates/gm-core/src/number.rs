//! Order numbers and the mod-10 (Luhn) checksum.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A purchase or withdrawal reference as submitted by the user.
///
/// Any `u64` is representable; whether it is *acceptable* is decided by
/// [`is_valid_luhn`]. Parsing and validation are kept apart so callers can
/// report "not a number" and "bad checksum" as different outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderNumber(u64);

impl OrderNumber {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        OrderNumber(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// `true` when the number passes the Luhn checksum.
    #[inline]
    pub fn is_valid(self) -> bool {
        is_valid_luhn(self.0)
    }

    /// Parse the textual form. Surrounding whitespace is ignored; signs,
    /// separators and anything beyond `u64::MAX` are rejected.
    pub fn parse(s: &str) -> Result<Self, NumberError> {
        let t = s.trim();
        if t.is_empty() || !t.bytes().all(|b| b.is_ascii_digit()) {
            return Err(NumberError::Malformed(t.to_string()));
        }
        t.parse::<u64>()
            .map(OrderNumber)
            .map_err(|_| NumberError::Malformed(t.to_string()))
    }

    /// Parse, then require a valid checksum.
    pub fn parse_valid(s: &str) -> Result<Self, NumberError> {
        let n = Self::parse(s)?;
        if !n.is_valid() {
            return Err(NumberError::Checksum(n));
        }
        Ok(n)
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrderNumber {
    type Err = NumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NumberError {
    #[error("order number is not numeric: {0:?}")]
    Malformed(String),
    #[error("order number {0} fails the Luhn checksum")]
    Checksum(OrderNumber),
}

/// Luhn checksum over the decimal digits of `number`.
///
/// Walking from the rightmost digit, every second digit is doubled (minus 9
/// when the product exceeds 9) and all digits are summed; the number is valid
/// iff the sum is a multiple of 10. `0` sums to 0 and is therefore valid.
pub fn is_valid_luhn(number: u64) -> bool {
    let mut n = number;
    let mut sum: u64 = 0;
    let mut double = false;

    while n > 0 {
        let mut d = n % 10;
        if double {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
        double = !double;
        n /= 10;
    }

    sum % 10 == 0
}

/// Check digit that makes `payload * 10 + digit` Luhn-valid.
///
/// Returns `None` when appending a digit would overflow `u64`.
pub fn luhn_check_digit(payload: u64) -> Option<u8> {
    let base = payload.checked_mul(10)?;
    (0u8..10).find(|d| {
        base.checked_add(u64::from(*d))
            .map(is_valid_luhn)
            .unwrap_or(false)
    })
}
