use std::sync::Arc;

use gm_core::{
    compute_balance, Accrual, AccrualParseError, AccrualSource, Balance, Order, OrderConflict,
    OrderNumber, OrderRepository, SaveOrderError, Status, StorageError, UserId,
};
use tracing::{debug, info, warn};

use crate::{SubmitError, WithdrawError};

/// Successful outcomes of [`OrderService::load_order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A new order row was written.
    Accepted,
    /// This user had already registered the number; nothing was written.
    AlreadyExists,
}

/// Submission, withdrawal and read operations.
///
/// Holds no per-user state: the repository decides whether a withdrawal
/// still fits the balance at the moment it is written, so any number of
/// services may share one repository.
pub struct OrderService {
    repo: Arc<dyn OrderRepository>,
    source: Arc<dyn AccrualSource>,
}

impl OrderService {
    pub fn new(repo: Arc<dyn OrderRepository>, source: Arc<dyn AccrualSource>) -> Self {
        Self { repo, source }
    }

    pub fn repository(&self) -> &Arc<dyn OrderRepository> {
        &self.repo
    }

    pub fn source(&self) -> &Arc<dyn AccrualSource> {
        &self.source
    }

    /// Register `number_text` for `user_id`.
    ///
    /// The accrual source is asked for the current outcome first so the
    /// stored order starts from whatever the source already knows.
    pub async fn load_order(
        &self,
        user_id: UserId,
        number_text: &str,
    ) -> Result<LoadOutcome, SubmitError> {
        let number = OrderNumber::parse_valid(number_text)?;
        let info = self.source.load(number).await?;
        let order = Order::new(user_id, info);

        match self.repo.save_order(&order).await {
            Ok(()) => {
                info!(
                    order_id = %order.id(),
                    %user_id,
                    %number,
                    status = %order.status(),
                    "order accepted"
                );
                Ok(LoadOutcome::Accepted)
            }
            Err(SaveOrderError::Conflict(OrderConflict::DuplicateSameOwner)) => {
                debug!(%user_id, %number, "order already registered by this user");
                Ok(LoadOutcome::AlreadyExists)
            }
            Err(SaveOrderError::Conflict(OrderConflict::OwnerMismatch(existing))) => {
                debug!(%user_id, %number, %existing, "order number owned by another user");
                Err(SubmitError::OwnedByAnother { existing })
            }
            Err(SaveOrderError::Conflict(OrderConflict::IdentityMismatch(id))) => {
                warn!(order_id = %id, %number, "storage did not echo order id");
                Err(SubmitError::IdentityMismatch(id))
            }
            Err(SaveOrderError::Conflict(c @ OrderConflict::InsufficientFunds { .. })) => {
                Err(SubmitError::Storage(StorageError::from(
                    anyhow::Error::new(c).context("saving purchase order"),
                )))
            }
            Err(SaveOrderError::Storage(e)) => Err(SubmitError::Storage(e)),
        }
    }

    /// Persist `order` (status `Withdraw`, amount in its accrual) if its owner
    /// can afford it. Succeeds when the amount equals the spendable balance.
    pub async fn withdraw(&self, order: &Order) -> Result<(), WithdrawError> {
        let amount = match (order.is_withdrawal(), order.info().accrual()) {
            (true, Some(a)) if a.is_positive() => a,
            (true, _) => {
                return Err(WithdrawError::InvalidAmount(
                    "withdrawal must carry a positive amount".to_string(),
                ))
            }
            (false, _) => return Err(WithdrawError::NotWithdrawal(order.id())),
        };

        let user_id = order.user_id();

        // Early refusal without a write; the repository re-checks under its
        // own serialization when the order is saved.
        let balance = self.balance(user_id).await?;
        if !balance.covers(amount) {
            return Err(refuse(user_id, balance.current, amount));
        }

        self.repo.save_order(order).await.map_err(|e| match e {
            SaveOrderError::Conflict(OrderConflict::InsufficientFunds {
                available,
                requested,
            }) => refuse(user_id, available, requested),
            SaveOrderError::Conflict(c) => WithdrawError::Storage(StorageError::from(
                anyhow::Error::new(c).context("saving withdrawal order"),
            )),
            SaveOrderError::Storage(e) => WithdrawError::Storage(e),
        })?;

        info!(
            order_id = %order.id(),
            %user_id,
            number = %order.number(),
            amount = %amount,
            "withdrawal recorded"
        );
        Ok(())
    }

    /// Parse a withdrawal request and hand it to [`OrderService::withdraw`].
    pub async fn request_withdrawal(
        &self,
        user_id: UserId,
        number_text: &str,
        amount_text: &str,
    ) -> Result<(), WithdrawError> {
        let number = OrderNumber::parse_valid(number_text)?;
        let amount = Accrual::parse_decimal(amount_text)
            .map_err(|e: AccrualParseError| WithdrawError::InvalidAmount(e.to_string()))?;
        let order = Order::withdrawal(user_id, number, amount)
            .map_err(|e| WithdrawError::InvalidAmount(e.to_string()))?;
        self.withdraw(&order).await
    }

    /// Balance folded from the user's `Processed` and `Withdraw` orders.
    pub async fn balance(&self, user_id: UserId) -> Result<Balance, StorageError> {
        let ledger = self.repo.orders_by_statuses(user_id, &Status::LEDGER).await?;
        Ok(compute_balance(&ledger))
    }

    /// The user's purchase orders, oldest first.
    pub async fn orders(&self, user_id: UserId) -> Result<Vec<Order>, StorageError> {
        self.repo.orders_by_statuses(user_id, &Status::PURCHASE).await
    }

    /// The user's withdrawals, oldest first.
    pub async fn withdrawals(&self, user_id: UserId) -> Result<Vec<Order>, StorageError> {
        self.repo.orders_by_statuses(user_id, &[Status::Withdraw]).await
    }
}

fn refuse(user_id: UserId, available: Accrual, requested: Accrual) -> WithdrawError {
    info!(
        %user_id,
        %requested,
        %available,
        "withdrawal refused: insufficient funds"
    );
    WithdrawError::InsufficientFunds {
        available,
        requested,
        shortfall: requested - available,
    }
}
