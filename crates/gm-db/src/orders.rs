use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use gm_core::{
    compute_balance, Accrual, Info, Order, OrderConflict, OrderId, OrderNumber, OrderRepository,
    SaveOrderError, Status, StorageError, UserId,
};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::debug;
use uuid::Uuid;

const PKEY: &str = "orders_pkey";

const SELECT_COLUMNS: &str =
    "select order_id, user_id, number, status, accrual_minor, uploaded_at from orders";

/// [`OrderRepository`] over a shared [`PgPool`].
///
/// Purchase-number uniqueness is enforced by the partial index
/// `uq_orders_purchase_number`; withdrawals are excluded from it. Withdrawals
/// of one user are serialized by a transaction-scoped advisory lock on that
/// user, under which the balance is re-read before the insert.
#[derive(Debug, Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_purchase(&self, order: &Order) -> Result<(), SaveOrderError> {
        let mut tx = self.pool.begin().await.map_err(storage("begin save_order"))?;

        // The no-op update makes RETURNING yield the existing row on a
        // number collision, so the caller learns who owns it.
        let row = sqlx::query(
            r#"
            insert into orders (order_id, user_id, number, status, accrual_minor, uploaded_at)
            values ($1, $2, $3, $4, $5, $6)
            on conflict (number) where status <> 'WITHDRAW'
            do update set number = excluded.number
            returning order_id, user_id
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.user_id().as_uuid())
        .bind(order.number().to_string())
        .bind(order.status().as_str())
        .bind(order.info().accrual().map(Accrual::minor))
        .bind(order.info().uploaded_at())
        .fetch_one(&mut *tx)
        .await;

        let row = match row {
            Ok(r) => r,
            Err(e) if is_unique_constraint_violation(&e, PKEY) => {
                return Err(OrderConflict::IdentityMismatch(order.id()).into());
            }
            Err(e) => return Err(storage("insert purchase order")(e).into()),
        };

        let stored_id: Uuid = row.try_get("order_id").map_err(storage("read order_id"))?;
        let stored_user: Uuid = row.try_get("user_id").map_err(storage("read user_id"))?;

        let conflict = if stored_user != *order.user_id().as_uuid() {
            Some(OrderConflict::OwnerMismatch(OrderId::from_uuid(stored_id)))
        } else if stored_id != *order.id().as_uuid() {
            Some(OrderConflict::DuplicateSameOwner)
        } else {
            None
        };

        if let Some(conflict) = conflict {
            tx.rollback().await.map_err(storage("rollback save_order"))?;
            debug!(number = %order.number(), ?conflict, "purchase number already registered");
            return Err(conflict.into());
        }

        tx.commit().await.map_err(storage("commit save_order"))?;
        Ok(())
    }

    async fn insert_withdrawal(&self, order: &Order) -> Result<(), SaveOrderError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("begin save_withdrawal"))?;

        // Held until commit or rollback.
        sqlx::query("select pg_advisory_xact_lock($1)")
            .bind(ledger_lock_key(order.user_id()))
            .execute(&mut *tx)
            .await
            .map_err(storage("lock user ledger"))?;

        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} where user_id = $1 and status = any($2)"
        ))
        .bind(order.user_id().as_uuid())
        .bind(status_texts(&Status::LEDGER))
        .fetch_all(&mut *tx)
        .await
        .map_err(storage("read user ledger"))?;
        let ledger = rows.iter().map(row_to_order).collect::<Result<Vec<_>, _>>()?;

        let balance = compute_balance(&ledger);
        let requested = order.info().accrual().unwrap_or(Accrual::ZERO);
        if !balance.covers(requested) {
            tx.rollback().await.map_err(storage("rollback save_withdrawal"))?;
            debug!(
                user_id = %order.user_id(),
                %requested,
                available = %balance.current,
                "withdrawal no longer covered"
            );
            return Err(OrderConflict::InsufficientFunds {
                available: balance.current,
                requested,
            }
            .into());
        }

        let res = sqlx::query(
            r#"
            insert into orders (order_id, user_id, number, status, accrual_minor, uploaded_at)
            values ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.user_id().as_uuid())
        .bind(order.number().to_string())
        .bind(order.status().as_str())
        .bind(order.info().accrual().map(Accrual::minor))
        .bind(order.info().uploaded_at())
        .execute(&mut *tx)
        .await;

        match res {
            Ok(_) => {}
            Err(e) if is_unique_constraint_violation(&e, PKEY) => {
                return Err(OrderConflict::IdentityMismatch(order.id()).into());
            }
            Err(e) => return Err(storage("insert withdrawal order")(e).into()),
        }

        tx.commit().await.map_err(storage("commit save_withdrawal"))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl OrderRepository for PgOrderRepository {
    async fn save_order(&self, order: &Order) -> Result<(), SaveOrderError> {
        if order.is_withdrawal() {
            self.insert_withdrawal(order).await
        } else {
            self.insert_purchase(order).await
        }
    }

    async fn orders_by_statuses(
        &self,
        user_id: UserId,
        statuses: &[Status],
    ) -> Result<Vec<Order>, StorageError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} where user_id = $1 and status = any($2) order by uploaded_at, order_id"
        ))
        .bind(user_id.as_uuid())
        .bind(status_texts(statuses))
        .fetch_all(&self.pool)
        .await
        .map_err(storage("orders_by_statuses"))?;

        rows.iter().map(row_to_order).collect()
    }

    async fn orders_batch(&self, statuses: &[Status]) -> Result<Vec<Order>, StorageError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} where status = any($1) order by uploaded_at, order_id"
        ))
        .bind(status_texts(statuses))
        .fetch_all(&self.pool)
        .await
        .map_err(storage("orders_batch"))?;

        rows.iter().map(row_to_order).collect()
    }

    async fn orders_update(&self, orders: &[Order]) -> Result<(), StorageError> {
        if orders.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(storage("begin orders_update"))?;

        for order in orders {
            let res = sqlx::query(
                r#"
                update orders
                   set status = $2,
                       accrual_minor = $3,
                       uploaded_at = $4
                 where order_id = $1
                "#,
            )
            .bind(order.id().as_uuid())
            .bind(order.status().as_str())
            .bind(order.info().accrual().map(Accrual::minor))
            .bind(order.info().uploaded_at())
            .execute(&mut *tx)
            .await
            .map_err(storage("orders_update"))?;

            if res.rows_affected() != 1 {
                // Dropping the transaction rolls it back.
                return Err(StorageError::from(anyhow!(
                    "orders_update: order {} not found",
                    order.id()
                )));
            }
        }

        tx.commit().await.map_err(storage("commit orders_update"))?;
        Ok(())
    }
}

/// Advisory-lock key for a user's ledger: the high 64 bits of the user id.
fn ledger_lock_key(user_id: UserId) -> i64 {
    (user_id.as_uuid().as_u128() >> 64) as i64
}

fn status_texts(statuses: &[Status]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

fn row_to_order(row: &PgRow) -> Result<Order, StorageError> {
    let decode = || -> anyhow::Result<Order> {
        let order_id: Uuid = row.try_get("order_id")?;
        let user_id: Uuid = row.try_get("user_id")?;
        let number: String = row.try_get("number")?;
        let status: String = row.try_get("status")?;
        let accrual_minor: Option<i64> = row.try_get("accrual_minor")?;
        let uploaded_at: DateTime<Utc> = row.try_get("uploaded_at")?;

        let number = OrderNumber::parse(&number).context("stored order number")?;
        let status = Status::parse(&status).context("stored order status")?;

        Ok(Order::from_parts(
            OrderId::from_uuid(order_id),
            UserId::from_uuid(user_id),
            Info::at(number, status, accrual_minor.map(Accrual::from_minor), uploaded_at),
        ))
    };
    decode().map_err(StorageError::from)
}

fn storage(ctx: &'static str) -> impl Fn(sqlx::Error) -> StorageError {
    move |e| StorageError::from(anyhow::Error::new(e).context(ctx))
}

/// Detect a Postgres unique constraint violation by name.
fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}
