//! Scenario: Luhn construction round-trips through the validator.
//!
//! # Invariants under test
//!
//! 1. Appending the computed check digit to any digit sequence yields a
//!    number the validator accepts.
//! 2. Bumping that check digit by one (no carry into the payload) yields a
//!    number the validator rejects.
//! 3. Parsing the decimal text of a constructed number gives back the same
//!    number and passes `parse_valid`.

use gm_core::{is_valid_luhn, luhn_check_digit, OrderNumber};
use proptest::prelude::*;

const MAX_PAYLOAD: u64 = 100_000_000_000_000_000; // 1e17, leaves room for a digit

fn construct(payload: u64) -> (u64, u8) {
    let digit = luhn_check_digit(payload).expect("payload below 1e17 cannot overflow");
    (payload * 10 + u64::from(digit), digit)
}

proptest! {
    #[test]
    fn constructed_numbers_validate(payload in 0u64..MAX_PAYLOAD) {
        let (n, _) = construct(payload);
        prop_assert!(is_valid_luhn(n));
    }

    #[test]
    fn check_digit_off_by_one_fails(payload in 0u64..MAX_PAYLOAD) {
        let (n, digit) = construct(payload);
        prop_assume!(digit < 9);
        prop_assert!(!is_valid_luhn(n + 1));
    }

    #[test]
    fn text_form_parses_valid(payload in 0u64..MAX_PAYLOAD) {
        let (n, _) = construct(payload);
        let parsed = OrderNumber::parse_valid(&n.to_string()).unwrap();
        prop_assert_eq!(parsed.get(), n);
    }
}

#[test]
fn published_reference_number() {
    let (n, digit) = construct(7_992_739_871);
    assert_eq!(digit, 3);
    assert_eq!(n, 79_927_398_713);
}
