//! Orders and their replaceable `Info` payload.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{Accrual, OrderId, OrderNumber, Status, UserId};

// ---------------------------------------------------------------------------
// Info
// ---------------------------------------------------------------------------

/// What is known about an order number at a point in time.
///
/// `Info` is a value: the reconciler never edits one in place, it swaps in a
/// fresh `Info` from the accrual source. The status is normalized on
/// construction so `Registered` is never observable downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    number: OrderNumber,
    status: Status,
    accrual: Option<Accrual>,
    uploaded_at: DateTime<Utc>,
}

impl Info {
    /// Stamped with the current time.
    pub fn new(number: OrderNumber, status: Status, accrual: Option<Accrual>) -> Self {
        Self::at(number, status, accrual, Utc::now())
    }

    /// Rehydrate with an explicit timestamp (storage rows, tests).
    pub fn at(
        number: OrderNumber,
        status: Status,
        accrual: Option<Accrual>,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            number,
            status: status.normalized(),
            accrual,
            uploaded_at,
        }
    }

    /// Info for a number the accrual source has never heard of.
    pub fn unregistered(number: OrderNumber) -> Self {
        Self::new(number, Status::New, None)
    }

    pub fn number(&self) -> OrderNumber {
        self.number
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// `None` means "not yet determined", which is distinct from zero.
    pub fn accrual(&self) -> Option<Accrual> {
        self.accrual
    }

    pub fn uploaded_at(&self) -> DateTime<Utc> {
        self.uploaded_at
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// A user-owned order: either a purchase tracked through accrual or a
/// synthetic withdrawal. The id and owner are fixed for life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    info: Info,
}

/// Result of offering a fresh `Info` to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    /// Status differs and the transition is legal; the info was replaced.
    Applied { from: Status, to: Status },
    /// Same status as stored; nothing was touched.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("illegal status transition {from} -> {to} for order {order_id}")]
    Illegal {
        order_id: OrderId,
        from: Status,
        to: Status,
    },
    #[error("update for number {got} offered to order {order_id} with number {expected}")]
    NumberMismatch {
        order_id: OrderId,
        expected: OrderNumber,
        got: OrderNumber,
    },
    #[error("status {status} for order {order_id} arrived without an accrual amount")]
    MissingAccrual { order_id: OrderId, status: Status },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WithdrawalOrderError {
    #[error("withdrawal amount must be positive, got {0}")]
    NonPositive(Accrual),
}

impl Order {
    /// Create a fresh purchase order with a newly generated id.
    pub fn new(user_id: UserId, info: Info) -> Self {
        Self::from_parts(OrderId::new(), user_id, info)
    }

    /// Rehydrate an order whose id already exists (storage rows, tests).
    pub fn from_parts(id: OrderId, user_id: UserId, info: Info) -> Self {
        Self { id, user_id, info }
    }

    /// A `Withdraw` order for `amount`. Always carries its amount.
    pub fn withdrawal(
        user_id: UserId,
        number: OrderNumber,
        amount: Accrual,
    ) -> Result<Self, WithdrawalOrderError> {
        if !amount.is_positive() {
            return Err(WithdrawalOrderError::NonPositive(amount));
        }
        Ok(Self::new(
            user_id,
            Info::new(number, Status::Withdraw, Some(amount)),
        ))
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn info(&self) -> &Info {
        &self.info
    }

    pub fn number(&self) -> OrderNumber {
        self.info.number
    }

    pub fn status(&self) -> Status {
        self.info.status
    }

    pub fn is_withdrawal(&self) -> bool {
        self.info.status == Status::Withdraw
    }

    /// Offer a freshly fetched `Info`.
    ///
    /// Same status: [`Update::Unchanged`], the stored info (and its
    /// timestamp) stay as they are. Different status: the transition must be
    /// legal, value-bearing statuses must carry an amount, and the whole
    /// `Info` is replaced.
    pub fn apply_update(&mut self, fresh: Info) -> Result<Update, TransitionError> {
        if fresh.number != self.info.number {
            return Err(TransitionError::NumberMismatch {
                order_id: self.id,
                expected: self.info.number,
                got: fresh.number,
            });
        }

        let from = self.info.status;
        let to = fresh.status;
        if from == to {
            return Ok(Update::Unchanged);
        }
        if !from.can_transition_to(to) {
            return Err(TransitionError::Illegal {
                order_id: self.id,
                from,
                to,
            });
        }
        if to.requires_accrual() && fresh.accrual.is_none() {
            return Err(TransitionError::MissingAccrual {
                order_id: self.id,
                status: to,
            });
        }

        self.info = fresh;
        Ok(Update::Applied { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number() -> OrderNumber {
        OrderNumber::new(79_927_398_713)
    }

    fn pending(status: Status) -> Order {
        Order::new(UserId::new(), Info::new(number(), status, None))
    }

    #[test]
    fn info_normalizes_registered() {
        let info = Info::new(number(), Status::Registered, None);
        assert_eq!(info.status(), Status::New);
    }

    #[test]
    fn same_status_is_unchanged_and_keeps_timestamp() {
        let mut order = pending(Status::Processing);
        let before = order.info().clone();

        let out = order
            .apply_update(Info::new(number(), Status::Processing, None))
            .unwrap();

        assert_eq!(out, Update::Unchanged);
        assert_eq!(order.info(), &before);
    }

    #[test]
    fn registered_from_source_is_unchanged_for_new_order() {
        let mut order = pending(Status::New);
        let out = order
            .apply_update(Info::new(number(), Status::Registered, None))
            .unwrap();
        assert_eq!(out, Update::Unchanged);
    }

    #[test]
    fn processed_replaces_info_wholesale() {
        let mut order = pending(Status::Processing);
        let fresh = Info::new(number(), Status::Processed, Some(Accrual::from_minor(500)));

        let out = order.apply_update(fresh.clone()).unwrap();

        assert_eq!(
            out,
            Update::Applied {
                from: Status::Processing,
                to: Status::Processed
            }
        );
        assert_eq!(order.info(), &fresh);
    }

    #[test]
    fn processed_without_accrual_is_rejected() {
        let mut order = pending(Status::New);
        let err = order
            .apply_update(Info::new(number(), Status::Processed, None))
            .unwrap_err();
        assert!(matches!(err, TransitionError::MissingAccrual { .. }));
        assert_eq!(order.status(), Status::New);
    }

    #[test]
    fn backwards_move_is_rejected() {
        let mut order = pending(Status::Processing);
        let err = order
            .apply_update(Info::new(number(), Status::New, None))
            .unwrap_err();
        assert!(matches!(err, TransitionError::Illegal { .. }));
    }

    #[test]
    fn foreign_number_is_rejected() {
        let mut order = pending(Status::New);
        let err = order
            .apply_update(Info::new(OrderNumber::new(18), Status::Processing, None))
            .unwrap_err();
        assert!(matches!(err, TransitionError::NumberMismatch { .. }));
    }

    #[test]
    fn withdrawal_requires_positive_amount() {
        let user = UserId::new();
        let w = Order::withdrawal(user, number(), Accrual::from_minor(1)).unwrap();
        assert!(w.is_withdrawal());
        assert_eq!(w.info().accrual(), Some(Accrual::from_minor(1)));

        assert!(Order::withdrawal(user, number(), Accrual::ZERO).is_err());
        assert!(Order::withdrawal(user, number(), Accrual::from_minor(-5)).is_err());
    }
}
