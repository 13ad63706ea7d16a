use std::time::Duration;

use async_trait::async_trait;
use common::{
    AddressId, OrderId, OrderStatus, PaymentId, PaymentStatus, ProductId, UserId,
};
use sqlx::{PgConnection, PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AddressRecord, DeliveryAddressRecord, OrderItemRecord, OrderRecord, PaymentRecord,
    ProductRecord, Result, StoreError, UserRecord,
    store::{Store, Transaction, lock_sequence},
};

const ORDER_COLUMNS: &str = r#"
    id, user_id, role, guest_email,
    delivery_full_address, delivery_city, delivery_district, delivery_postal_code,
    delivery_recipient_name, delivery_phone_number, delivery_title, delivery_email,
    created_at, status, total_cents, notes
"#;

/// PostgreSQL-backed store implementation.
///
/// Transactions run at `READ COMMITTED`. Combined with `FOR UPDATE` row locks
/// this makes a second checkout on the same product wait for the first to
/// finish and then re-read the committed stock.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Option<Duration>,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: None,
        }
    }

    /// Bounds how long a transaction waits for a row lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;

        if let Some(timeout) = self.lock_timeout {
            // SET does not accept bind parameters.
            sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", timeout.as_millis()))
                .execute(&mut *tx)
                .await?;
        }

        Ok(PostgresTransaction { tx })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_db_error)?;

        match row {
            Some(row) => Ok(Some(load_order(&mut conn, row).await?)),
            None => Ok(None),
        }
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<OrderRecord>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id.as_i64())
        .fetch_all(&mut *conn)
        .await
        .map_err(map_db_error)?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            orders.push(load_order(&mut conn, row).await?);
        }
        Ok(orders)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<ProductRecord>> {
        let row = sqlx::query(
            "SELECT id, name, image_url, price_cents, stock FROM products WHERE id = $1",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(row_to_product).transpose()
    }
}

/// Transaction over a [`PostgresStore`].
///
/// Dropping it without committing rolls back.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<ProductRecord>> {
        let keys: Vec<i64> = lock_sequence(ids).iter().map(ProductId::as_i64).collect();

        // Rows are locked in the order the sort emits them.
        let rows = sqlx::query(
            r#"
            SELECT id, name, image_url, price_cents, stock
            FROM products
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(&keys)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        rows.into_iter().map(row_to_product).collect()
    }

    async fn decrement_stock(&mut self, id: ProductId, quantity: i32) -> Result<()> {
        let result = sqlx::query("UPDATE products SET stock = stock - $2 WHERE id = $1")
            .bind(id.as_i64())
            .bind(quantity)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("products", id));
        }
        Ok(())
    }

    async fn restock(&mut self, id: ProductId, quantity: i32) -> Result<()> {
        let result = sqlx::query("UPDATE products SET stock = stock + $2 WHERE id = $1")
            .bind(id.as_i64())
            .bind(quantity)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("products", id));
        }
        Ok(())
    }

    async fn find_user(&mut self, id: UserId) -> Result<Option<UserRecord>> {
        fetch_user(&mut self.tx, id).await
    }

    async fn user_addresses(&mut self, user_id: UserId) -> Result<Vec<AddressRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, full_address, city, district, postal_code,
                   recipient_name, phone_number
            FROM user_addresses
            WHERE user_id = $1
            ORDER BY id
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        rows.into_iter()
            .map(|row| -> Result<AddressRecord> {
                Ok(AddressRecord {
                    id: AddressId::new(row.try_get("id")?),
                    user_id: UserId::new(row.try_get("user_id")?),
                    title: row.try_get("title")?,
                    full_address: row.try_get("full_address")?,
                    city: row.try_get("city")?,
                    district: row.try_get("district")?,
                    postal_code: row.try_get("postal_code")?,
                    recipient_name: row.try_get("recipient_name")?,
                    phone_number: row.try_get("phone_number")?,
                })
            })
            .collect()
    }

    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()> {
        let address = &order.address;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, role, guest_email,
                delivery_full_address, delivery_city, delivery_district, delivery_postal_code,
                delivery_recipient_name, delivery_phone_number, delivery_title, delivery_email,
                created_at, status, total_cents, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.map(|id| id.as_i64()))
        .bind(order.role.as_str())
        .bind(&order.guest_email)
        .bind(&address.full_address)
        .bind(&address.city)
        .bind(&address.district)
        .bind(&address.postal_code)
        .bind(&address.recipient_name)
        .bind(&address.phone_number)
        .bind(&address.title)
        .bind(&address.email)
        .bind(order.created_at)
        .bind(order.status.as_str())
        .bind(order.total_cents)
        .bind(&order.notes)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    order_id, position, product_id, product_name, image_url,
                    quantity, unit_price_cents
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_i64())
            .bind(&item.product_name)
            .bind(&item.image_url)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        }

        if let Some(payment) = &order.payment {
            sqlx::query(
                r#"
                INSERT INTO payments (
                    id, order_id, amount_cents, method, status,
                    transaction_id, error_message, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(payment.id.as_uuid())
            .bind(payment.order_id.as_uuid())
            .bind(payment.amount_cents)
            .bind(payment.method.as_str())
            .bind(payment.status.as_str())
            .bind(&payment.transaction_id)
            .bind(&payment.error_message)
            .bind(payment.created_at)
            .bind(payment.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        }

        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        match row {
            Some(row) => Ok(Some(load_order(&mut self.tx, row).await?)),
            None => Ok(None),
        }
    }

    async fn update_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("orders", id));
        }
        Ok(())
    }

    async fn update_payment_status(
        &mut self,
        id: PaymentId,
        status: PaymentStatus,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE payments SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id.as_uuid())
                .bind(status.as_str())
                .execute(&mut *self.tx)
                .await
                .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("payments", id));
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(map_db_error)
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(map_db_error)
    }
}

/// Maps lock timeouts and unique violations to their store errors.
fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        match db_err.code().as_deref() {
            // lock_not_available
            Some("55P03") => return StoreError::LockTimeout,
            // unique_violation
            Some("23505") => {
                return StoreError::Duplicate {
                    table: "constraint",
                    id: db_err.constraint().unwrap_or("unknown").to_string(),
                };
            }
            _ => {}
        }
    }
    StoreError::Database(e)
}

fn row_to_product(row: PgRow) -> Result<ProductRecord> {
    Ok(ProductRecord {
        id: ProductId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        image_url: row.try_get("image_url")?,
        price_cents: row.try_get("price_cents")?,
        stock: row.try_get("stock")?,
    })
}

async fn fetch_user(conn: &mut PgConnection, id: UserId) -> Result<Option<UserRecord>> {
    let row = sqlx::query("SELECT id, name, email FROM users WHERE id = $1")
        .bind(id.as_i64())
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_db_error)?;

    row.map(|row| -> Result<UserRecord> {
        Ok(UserRecord {
            id: UserId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            email: row.try_get("email")?,
        })
    })
    .transpose()
}

/// Completes an order header row with its items, payment and owning user.
async fn load_order(conn: &mut PgConnection, row: PgRow) -> Result<OrderRecord> {
    let id = OrderId::from_uuid(row.try_get::<Uuid, _>("id")?);
    let user_id = row.try_get::<Option<i64>, _>("user_id")?.map(UserId::new);

    let item_rows = sqlx::query(
        r#"
        SELECT product_id, product_name, image_url, quantity, unit_price_cents
        FROM order_items
        WHERE order_id = $1
        ORDER BY position
        "#,
    )
    .bind(id.as_uuid())
    .fetch_all(&mut *conn)
    .await
    .map_err(map_db_error)?;

    let items = item_rows
        .into_iter()
        .map(|item| -> Result<OrderItemRecord> {
            Ok(OrderItemRecord {
                product_id: ProductId::new(item.try_get("product_id")?),
                product_name: item.try_get("product_name")?,
                image_url: item.try_get("image_url")?,
                quantity: item.try_get("quantity")?,
                unit_price_cents: item.try_get("unit_price_cents")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let payment = sqlx::query(
        r#"
        SELECT id, order_id, amount_cents, method, status, transaction_id,
               error_message, created_at, updated_at
        FROM payments
        WHERE order_id = $1
        "#,
    )
    .bind(id.as_uuid())
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_db_error)?
    .map(|payment| -> Result<PaymentRecord> {
        Ok(PaymentRecord {
            id: PaymentId::from_uuid(payment.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(payment.try_get::<Uuid, _>("order_id")?),
            amount_cents: payment.try_get("amount_cents")?,
            method: payment.try_get::<String, _>("method")?.parse()?,
            status: payment.try_get::<String, _>("status")?.parse()?,
            transaction_id: payment.try_get("transaction_id")?,
            error_message: payment.try_get("error_message")?,
            created_at: payment.try_get("created_at")?,
            updated_at: payment.try_get("updated_at")?,
        })
    })
    .transpose()?;

    let customer = match user_id {
        Some(user_id) => fetch_user(conn, user_id).await?,
        None => None,
    };

    Ok(OrderRecord {
        id,
        user_id,
        role: row.try_get::<String, _>("role")?.parse()?,
        guest_email: row.try_get("guest_email")?,
        address: DeliveryAddressRecord {
            full_address: row.try_get("delivery_full_address")?,
            city: row.try_get("delivery_city")?,
            district: row.try_get("delivery_district")?,
            postal_code: row.try_get("delivery_postal_code")?,
            recipient_name: row.try_get("delivery_recipient_name")?,
            phone_number: row.try_get("delivery_phone_number")?,
            title: row.try_get("delivery_title")?,
            email: row.try_get("delivery_email")?,
        },
        created_at: row.try_get("created_at")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        total_cents: row.try_get("total_cents")?,
        notes: row.try_get("notes")?,
        items,
        payment,
        customer,
    })
}
