use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use gm_core::{
    compute_balance, Accrual, Order, OrderConflict, OrderId, OrderRepository, SaveOrderError,
    Status, StorageError, UserId,
};

/// Vec-backed repository with the same rules as the Postgres adapter:
/// purchase numbers are unique across users, withdrawals share numbers
/// freely but must fit the owner's balance at write time, and order ids are
/// unique.
///
/// Writes can be made to fail on demand to exercise error paths.
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<Vec<Order>>,
    fail_writes: AtomicBool,
    update_calls: AtomicUsize,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `order` as-is, bypassing every uniqueness check. For seeding
    /// states the public API cannot reach.
    pub fn seed(&self, order: Order) {
        self.lock().push(order);
    }

    /// Every stored order, in insertion order.
    pub fn snapshot(&self) -> Vec<Order> {
        self.lock().clone()
    }

    pub fn get(&self, id: OrderId) -> Option<Order> {
        self.lock().iter().find(|o| o.id() == id).cloned()
    }

    /// While set, `save_order` and `orders_update` fail with a storage error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `orders_update` calls, including failed ones.
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Order>> {
        self.orders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StorageError::msg("injected write failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save_order(&self, order: &Order) -> Result<(), SaveOrderError> {
        self.check_writable()?;
        let mut orders = self.lock();

        if orders.iter().any(|o| o.id() == order.id()) {
            return Err(OrderConflict::IdentityMismatch(order.id()).into());
        }

        if order.is_withdrawal() {
            let ledger = orders.iter().filter(|o| {
                o.user_id() == order.user_id() && Status::LEDGER.contains(&o.status())
            });
            let balance = compute_balance(ledger);
            let requested = order.info().accrual().unwrap_or(Accrual::ZERO);
            if !balance.covers(requested) {
                return Err(OrderConflict::InsufficientFunds {
                    available: balance.current,
                    requested,
                }
                .into());
            }
        } else {
            let existing = orders
                .iter()
                .find(|o| !o.is_withdrawal() && o.number() == order.number());
            if let Some(existing) = existing {
                let conflict = if existing.user_id() != order.user_id() {
                    OrderConflict::OwnerMismatch(existing.id())
                } else {
                    OrderConflict::DuplicateSameOwner
                };
                return Err(conflict.into());
            }
        }

        orders.push(order.clone());
        Ok(())
    }

    async fn orders_by_statuses(
        &self,
        user_id: UserId,
        statuses: &[Status],
    ) -> Result<Vec<Order>, StorageError> {
        let mut out: Vec<Order> = self
            .lock()
            .iter()
            .filter(|o| o.user_id() == user_id && statuses.contains(&o.status()))
            .cloned()
            .collect();
        out.sort_by_key(|o| o.info().uploaded_at());
        Ok(out)
    }

    async fn orders_batch(&self, statuses: &[Status]) -> Result<Vec<Order>, StorageError> {
        let mut out: Vec<Order> = self
            .lock()
            .iter()
            .filter(|o| statuses.contains(&o.status()))
            .cloned()
            .collect();
        out.sort_by_key(|o| o.info().uploaded_at());
        Ok(out)
    }

    async fn orders_update(&self, updates: &[Order]) -> Result<(), StorageError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        let mut orders = self.lock();

        // Resolve every slot before writing any, so a miss leaves nothing applied.
        let mut slots = Vec::with_capacity(updates.len());
        for update in updates {
            let idx = orders
                .iter()
                .position(|o| o.id() == update.id())
                .ok_or_else(|| StorageError::msg(format!("order {} not found", update.id())))?;
            slots.push(idx);
        }

        for (idx, update) in slots.into_iter().zip(updates) {
            orders[idx] = update.clone();
        }
        Ok(())
    }
}
