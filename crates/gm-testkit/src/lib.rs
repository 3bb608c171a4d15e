//! gm-testkit
//!
//! Deterministic in-memory doubles for [`gm_core::OrderRepository`] and
//! [`gm_core::AccrualSource`]. No I/O, no randomness. Scenario tests under
//! `tests/` wire them into the real service and reconciler.

mod repo;
mod source;

pub use repo::InMemoryOrderRepository;
pub use source::ScriptedAccrualSource;

use gm_core::{luhn_check_digit, OrderNumber};

/// Append the Luhn check digit to `payload`.
///
/// Panics if the result would not fit in a `u64`; fixtures only.
pub fn valid_number(payload: u64) -> OrderNumber {
    let digit = luhn_check_digit(payload)
        .unwrap_or_else(|| panic!("payload {payload} too large for a check digit"));
    OrderNumber::new(payload * 10 + u64::from(digit))
}
