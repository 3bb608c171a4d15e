//! Balance derivation.
//!
//! A balance is never stored. It is folded from the user's terminal orders on
//! every read:
//!
//! - gross earned  = Σ accrual of `Processed` orders
//! - withdrawn     = Σ accrual of `Withdraw` orders
//! - current       = gross earned − withdrawn
//!
//! Orders in any other status are ignored. A `Processed`/`Withdraw` order
//! without an amount is a data-integrity violation: it contributes zero and is
//! logged, the rest of the fold proceeds.

use tracing::warn;

use crate::{Accrual, Order, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Balance {
    /// Spendable: earned minus withdrawn.
    pub current: Accrual,
    /// Lifetime total of withdrawals.
    pub withdrawn: Accrual,
}

impl Balance {
    /// Gross earned before withdrawals.
    pub fn earned(&self) -> Accrual {
        self.current.saturating_add(self.withdrawn)
    }

    /// Whether `amount` can be withdrawn. Equality is allowed.
    pub fn covers(&self, amount: Accrual) -> bool {
        amount <= self.current
    }

    /// How much is missing to cover `amount` (zero when covered).
    pub fn shortfall(&self, amount: Accrual) -> Accrual {
        if self.covers(amount) {
            Accrual::ZERO
        } else {
            amount.saturating_sub(self.current)
        }
    }
}

/// Fold a user's orders into a [`Balance`].
pub fn compute_balance<'a, I>(orders: I) -> Balance
where
    I: IntoIterator<Item = &'a Order>,
{
    let mut earned = Accrual::ZERO;
    let mut withdrawn = Accrual::ZERO;

    for order in orders {
        let status = order.status();
        if !matches!(status, Status::Processed | Status::Withdraw) {
            continue;
        }

        let Some(amount) = order.info().accrual() else {
            warn!(
                order_id = %order.id(),
                user_id = %order.user_id(),
                status = %status,
                "terminal order without accrual; counted as zero"
            );
            continue;
        };

        match status {
            Status::Processed => earned = earned.saturating_add(amount),
            Status::Withdraw => withdrawn = withdrawn.saturating_add(amount),
            _ => {}
        }
    }

    Balance {
        current: earned.saturating_sub(withdrawn),
        withdrawn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Info, OrderId, OrderNumber, UserId};

    fn order(user: UserId, status: Status, minor: Option<i64>) -> Order {
        Order::from_parts(
            OrderId::new(),
            user,
            Info::new(OrderNumber::new(18), status, minor.map(Accrual::from_minor)),
        )
    }

    #[test]
    fn empty_ledger_is_zero() {
        let b = compute_balance(&Vec::<Order>::new());
        assert_eq!(b, Balance::default());
    }

    #[test]
    fn processed_amounts_accumulate_separately_from_withdrawals() {
        let u = UserId::new();
        let orders = vec![
            order(u, Status::Processed, Some(500)),
            order(u, Status::Withdraw, Some(100)),
            order(u, Status::Processed, Some(250)),
        ];

        let b = compute_balance(&orders);

        assert_eq!(b.earned(), Accrual::from_minor(750));
        assert_eq!(b.withdrawn, Accrual::from_minor(100));
        assert_eq!(b.current, Accrual::from_minor(650));
    }

    #[test]
    fn non_ledger_statuses_are_ignored() {
        let u = UserId::new();
        let orders = vec![
            order(u, Status::New, None),
            order(u, Status::Processing, None),
            order(u, Status::Invalid, None),
            order(u, Status::Processed, Some(300)),
        ];
        assert_eq!(compute_balance(&orders).current, Accrual::from_minor(300));
    }

    #[test]
    fn missing_accrual_counts_as_zero() {
        let u = UserId::new();
        let orders = vec![
            order(u, Status::Processed, None),
            order(u, Status::Processed, Some(300)),
            order(u, Status::Withdraw, None),
        ];
        let b = compute_balance(&orders);
        assert_eq!(b.current, Accrual::from_minor(300));
        assert_eq!(b.withdrawn, Accrual::ZERO);
    }

    #[test]
    fn adding_orders_is_linear() {
        let u = UserId::new();
        let mut orders = vec![order(u, Status::Processed, Some(1_000))];
        let before = compute_balance(&orders);

        orders.push(order(u, Status::Processed, Some(123)));
        let after_earn = compute_balance(&orders);
        assert_eq!(after_earn.current - before.current, Accrual::from_minor(123));
        assert_eq!(after_earn.withdrawn, before.withdrawn);

        orders.push(order(u, Status::Withdraw, Some(77)));
        let after_spend = compute_balance(&orders);
        assert_eq!(after_earn.current - after_spend.current, Accrual::from_minor(77));
        assert_eq!(after_spend.withdrawn - after_earn.withdrawn, Accrual::from_minor(77));
    }

    #[test]
    fn covers_is_inclusive() {
        let b = Balance {
            current: Accrual::from_units(100),
            withdrawn: Accrual::ZERO,
        };
        assert!(b.covers(Accrual::from_units(100)));
        assert!(!b.covers(Accrual::from_minor(10_001)));
        assert_eq!(b.shortfall(Accrual::from_minor(10_001)), Accrual::from_minor(1));
        assert_eq!(b.shortfall(Accrual::from_units(50)), Accrual::ZERO);
    }
}
