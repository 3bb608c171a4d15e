//! Capability traits the service and reconciler depend on.
//!
//! Neither the service nor the reconciler know about Postgres or HTTP; they
//! hold `Arc<dyn OrderRepository>` / `Arc<dyn AccrualSource>`. Production
//! adapters live in `gm-db` and `gm-accrual`, test doubles in `gm-testkit`.

use crate::{Info, Order, OrderNumber, SaveOrderError, SourceError, Status, StorageError, UserId};

/// Durable owner of orders.
///
/// Every method that writes is atomic: it either commits completely or has no
/// visible effect.
#[async_trait::async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a new order.
    ///
    /// Purchase-order numbers are unique across all users. Withdrawal orders
    /// live outside that uniqueness domain. On a purchase-number collision the
    /// adapter reports which [`crate::OrderConflict`] applies.
    ///
    /// A withdrawal is written only if the owner's balance, read inside the
    /// same write and serialized against every other withdrawal of that
    /// owner, still covers it; otherwise the save fails with
    /// [`crate::OrderConflict::InsufficientFunds`].
    async fn save_order(&self, order: &Order) -> Result<(), SaveOrderError>;

    /// A single user's orders whose status is in `statuses`, oldest first.
    async fn orders_by_statuses(
        &self,
        user_id: UserId,
        statuses: &[Status],
    ) -> Result<Vec<Order>, StorageError>;

    /// Every user's orders whose status is in `statuses`.
    async fn orders_batch(&self, statuses: &[Status]) -> Result<Vec<Order>, StorageError>;

    /// Replace the stored `Info` of each order, all in one transaction.
    async fn orders_update(&self, orders: &[Order]) -> Result<(), StorageError>;
}

/// The external authority on order outcomes.
#[async_trait::async_trait]
pub trait AccrualSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Current outcome for `number`. An unregistered number is not an error:
    /// it comes back as `New` without an accrual.
    async fn load(&self, number: OrderNumber) -> Result<Info, SourceError>;
}
