use async_trait::async_trait;
use chrono::Utc;
use common::{CustomerId, LineItem, Money, ShippingAddress};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    NewOrder, Order, OrderId, OrderStatus, OrderStore, Result, StepId, StepRecord, StepUpdate,
    StoreError,
};

const STEP_COLUMNS: &str = "id, order_id, step_name, execution_order, status, reference_id, \
     error_message, failure_kind, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, customer_id, total_amount_cents, status, payment_method, \
     payment_id, transaction_id, shipping_address, created_at, updated_at";

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_step(row: &PgRow) -> Result<StepRecord> {
        let status: String = row.try_get("status")?;
        let failure_kind: Option<String> = row.try_get("failure_kind")?;
        let execution_order: i32 = row.try_get("execution_order")?;

        Ok(StepRecord {
            id: StepId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            step_name: row.try_get("step_name")?,
            execution_order: u32::try_from(execution_order).map_err(|_| {
                StoreError::InvalidData(format!("negative execution order {execution_order}"))
            })?,
            status: status.parse()?,
            reference_id: row.try_get("reference_id")?,
            error_message: row.try_get("error_message")?,
            failure_kind: failure_kind.map(|k| k.parse()).transpose()?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<LineItem> {
        let quantity: i32 = row.try_get("quantity")?;
        Ok(LineItem {
            product_id: row.try_get::<String, _>("product_id")?.into(),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            quantity: u32::try_from(quantity)
                .map_err(|_| StoreError::InvalidData(format!("negative quantity {quantity}")))?,
        })
    }

    /// Builds an order from its row; items and steps are loaded separately.
    fn row_to_order(row: &PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let address: serde_json::Value = row.try_get("shipping_address")?;
        let shipping_address: ShippingAddress = serde_json::from_value(address)?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            customer_id: CustomerId::new(row.try_get::<String, _>("customer_id")?),
            total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
            status: status.parse()?,
            items: Vec::new(),
            shipping_address,
            payment_method: row.try_get("payment_method")?,
            payment_id: row.try_get("payment_id")?,
            transaction_id: row.try_get("transaction_id")?,
            steps: Vec::new(),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn load_children(&self, mut order: Order) -> Result<Order> {
        let item_rows = sqlx::query(
            "SELECT product_id, name, price_cents, quantity FROM order_items \
             WHERE order_id = $1 ORDER BY position ASC",
        )
        .bind(order.id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        order.items = item_rows
            .iter()
            .map(Self::row_to_item)
            .collect::<Result<_>>()?;

        let step_rows = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM order_steps WHERE order_id = $1 ORDER BY execution_order ASC"
        ))
        .bind(order.id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        order.steps = step_rows
            .iter()
            .map(Self::row_to_step)
            .collect::<Result<_>>()?;

        Ok(order)
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create_order(&self, new: NewOrder) -> Result<Order> {
        let order = Order::from_new(OrderId::new(), new);
        let address = serde_json::to_value(&order.shipping_address)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, total_amount_cents, status, payment_method, shipping_address, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_str())
        .bind(order.total_amount.cents())
        .bind(order.status.as_str())
        .bind(&order.payment_method)
        .bind(address)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, name, price_cents, quantity)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_str())
            .bind(&item.name)
            .bind(item.price.cents())
            .bind(item.quantity as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn create_step(
        &self,
        order_id: OrderId,
        step_name: &str,
        execution_order: u32,
    ) -> Result<StepRecord> {
        let record = StepRecord::pending(order_id, step_name, execution_order);

        sqlx::query(
            r#"
            INSERT INTO order_steps (id, order_id, step_name, execution_order, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(order_id.as_uuid())
        .bind(&record.step_name)
        .bind(execution_order as i32)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint() == Some("unique_order_execution_order") {
                    return StoreError::DuplicateExecutionOrder {
                        order_id,
                        execution_order,
                    };
                }
                if db_err.is_foreign_key_violation() {
                    return StoreError::OrderNotFound(order_id);
                }
            }
            StoreError::Database(e)
        })?;

        Ok(record)
    }

    async fn update_step(&self, step_id: StepId, update: StepUpdate) -> Result<StepRecord> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE order_steps
            SET status = $2,
                reference_id = COALESCE($3, reference_id),
                error_message = COALESCE($4, error_message),
                failure_kind = COALESCE($5, failure_kind),
                updated_at = $6
            WHERE id = $1
            RETURNING {STEP_COLUMNS}
            "#
        ))
        .bind(step_id.as_uuid())
        .bind(update.status.as_str())
        .bind(update.reference_id)
        .bind(update.error_message)
        .bind(update.failure_kind.map(|k| k.as_str()))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::StepNotFound(step_id))?;

        Self::row_to_step(&row)
    }

    async fn update_order_status(&self, order_id: OrderId, status: OrderStatus) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order_id.as_uuid())
            .bind(status.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(order_id));
        }
        Ok(())
    }

    async fn record_payment(
        &self,
        order_id: OrderId,
        payment_id: &str,
        transaction_id: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET payment_id = $2, transaction_id = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(order_id.as_uuid())
        .bind(payment_id)
        .bind(transaction_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(order_id));
        }
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let order = Self::row_to_order(&row)?;
                Ok(Some(self.load_children(order).await?))
            }
            None => Ok(None),
        }
    }

    async fn get_step(&self, step_id: StepId) -> Result<Option<StepRecord>> {
        let row = sqlx::query(&format!("SELECT {STEP_COLUMNS} FROM order_steps WHERE id = $1"))
            .bind(step_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_step).transpose()
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            let order = Self::row_to_order(row)?;
            orders.push(self.load_children(order).await?);
        }
        Ok(orders)
    }
}
