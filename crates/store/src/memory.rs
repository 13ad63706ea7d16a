use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, OrderStatus, PaymentId, PaymentStatus, ProductId, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    AddressRecord, OrderRecord, ProductRecord, Result, StoreError, UserRecord,
    store::{Store, Transaction, lock_sequence},
};

type Row<T> = Arc<Mutex<T>>;

#[derive(Default)]
struct Tables {
    products: RwLock<BTreeMap<ProductId, Row<ProductRecord>>>,
    orders: RwLock<HashMap<OrderId, Row<OrderRecord>>>,
    users: RwLock<HashMap<UserId, UserRecord>>,
    addresses: RwLock<HashMap<UserId, Vec<AddressRecord>>>,
    fail_on_insert: AtomicBool,
}

/// In-memory store implementation for testing.
///
/// Every product and order row sits behind its own async mutex, so a
/// transaction holding a row blocks every other transaction and reader of
/// that row until it commits or rolls back. This gives the same observable
/// behavior as `SELECT ... FOR UPDATE` under `READ COMMITTED`.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Tables>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a product.
    pub async fn insert_product(&self, product: ProductRecord) {
        self.tables
            .products
            .write()
            .await
            .insert(product.id, Arc::new(Mutex::new(product)));
    }

    /// Changes the catalog price of a product.
    pub async fn set_price(&self, id: ProductId, price_cents: i64) {
        let row = self.tables.products.read().await.get(&id).cloned();
        if let Some(row) = row {
            row.lock().await.price_cents = price_cents;
        }
    }

    /// Inserts or replaces a user.
    pub async fn insert_user(&self, user: UserRecord) {
        self.tables.users.write().await.insert(user.id, user);
    }

    /// Appends a saved address to its user's address book.
    pub async fn insert_address(&self, address: AddressRecord) {
        self.tables
            .addresses
            .write()
            .await
            .entry(address.user_id)
            .or_default()
            .push(address);
    }

    /// Returns the committed stock of a product.
    pub async fn stock_of(&self, id: ProductId) -> Option<i32> {
        let row = self.tables.products.read().await.get(&id).cloned()?;
        let stock = row.lock().await.stock;
        Some(stock)
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.tables.orders.read().await.len()
    }

    /// Overwrites the payment status of an order, as payment settlement would.
    pub async fn settle_payment(&self, order_id: OrderId, status: PaymentStatus) -> Result<()> {
        let row = self
            .tables
            .orders
            .read()
            .await
            .get(&order_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("orders", order_id))?;
        let mut order = row.lock().await;
        let payment = order
            .payment
            .as_mut()
            .ok_or_else(|| StoreError::not_found("payments", order_id))?;
        payment.status = status;
        payment.updated_at = Utc::now();
        Ok(())
    }

    /// Configures the store to fail every order insert.
    pub fn set_fail_on_insert(&self, fail: bool) {
        self.tables.fail_on_insert.store(fail, Ordering::SeqCst);
    }

    async fn with_customer(&self, mut order: OrderRecord) -> OrderRecord {
        if let Some(user_id) = order.user_id {
            order.customer = self.tables.users.read().await.get(&user_id).cloned();
        }
        order
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        Ok(InMemoryTransaction {
            store: self.clone(),
            products: BTreeMap::new(),
            orders: HashMap::new(),
            new_orders: Vec::new(),
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>> {
        let row = self.tables.orders.read().await.get(&id).cloned();
        match row {
            Some(row) => {
                let order = row.lock().await.clone();
                Ok(Some(self.with_customer(order).await))
            }
            None => Ok(None),
        }
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<OrderRecord>> {
        let rows: Vec<Row<OrderRecord>> =
            self.tables.orders.read().await.values().cloned().collect();

        let mut orders = Vec::new();
        for row in rows {
            let order = row.lock().await;
            if order.user_id == Some(user_id) {
                orders.push(order.clone());
            }
        }
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut joined = Vec::with_capacity(orders.len());
        for order in orders {
            joined.push(self.with_customer(order).await);
        }
        Ok(joined)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<ProductRecord>> {
        let row = self.tables.products.read().await.get(&id).cloned();
        match row {
            Some(row) => Ok(Some(row.lock().await.clone())),
            None => Ok(None),
        }
    }
}

/// A held row lock plus the transaction's working copy of the row.
struct Locked<T> {
    guard: OwnedMutexGuard<T>,
    working: T,
}

impl<T: Clone> Locked<T> {
    fn new(guard: OwnedMutexGuard<T>) -> Self {
        let working = guard.clone();
        Self { guard, working }
    }

    fn publish(mut self) {
        *self.guard = self.working;
    }
}

/// Transaction over an [`InMemoryStore`].
///
/// Writes go to working copies of locked rows and are published on commit.
/// Dropping the transaction discards the copies and releases the locks.
pub struct InMemoryTransaction {
    store: InMemoryStore,
    products: BTreeMap<ProductId, Locked<ProductRecord>>,
    orders: HashMap<OrderId, Locked<OrderRecord>>,
    new_orders: Vec<OrderRecord>,
}

impl InMemoryTransaction {
    fn locked_product(&mut self, id: ProductId) -> Result<&mut ProductRecord> {
        self.products
            .get_mut(&id)
            .map(|row| &mut row.working)
            .ok_or_else(|| StoreError::not_locked("products", id))
    }

    fn locked_order(&mut self, id: OrderId) -> Result<&mut OrderRecord> {
        self.orders
            .get_mut(&id)
            .map(|row| &mut row.working)
            .ok_or_else(|| StoreError::not_locked("orders", id))
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<ProductRecord>> {
        let wanted = lock_sequence(ids);

        for id in &wanted {
            if self.products.contains_key(id) {
                continue;
            }
            let row = self.store.tables.products.read().await.get(id).cloned();
            if let Some(row) = row {
                let guard = row.lock_owned().await;
                self.products.insert(*id, Locked::new(guard));
            }
        }

        Ok(wanted
            .iter()
            .filter_map(|id| self.products.get(id).map(|row| row.working.clone()))
            .collect())
    }

    async fn decrement_stock(&mut self, id: ProductId, quantity: i32) -> Result<()> {
        let product = self.locked_product(id)?;
        product.stock -= quantity;
        Ok(())
    }

    async fn restock(&mut self, id: ProductId, quantity: i32) -> Result<()> {
        let product = self.locked_product(id)?;
        product.stock += quantity;
        Ok(())
    }

    async fn find_user(&mut self, id: UserId) -> Result<Option<UserRecord>> {
        Ok(self.store.tables.users.read().await.get(&id).cloned())
    }

    async fn user_addresses(&mut self, user_id: UserId) -> Result<Vec<AddressRecord>> {
        Ok(self
            .store
            .tables
            .addresses
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()> {
        if self.store.tables.fail_on_insert.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "order insert rejected".to_string(),
            ));
        }

        let exists = self.store.tables.orders.read().await.contains_key(&order.id)
            || self.new_orders.iter().any(|o| o.id == order.id);
        if exists {
            return Err(StoreError::Duplicate {
                table: "orders",
                id: order.id.to_string(),
            });
        }

        let mut order = order.clone();
        order.customer = None;
        self.new_orders.push(order);
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        if !self.orders.contains_key(&id) {
            let row = self.store.tables.orders.read().await.get(&id).cloned();
            let Some(row) = row else {
                return Ok(None);
            };
            let guard = row.lock_owned().await;
            self.orders.insert(id, Locked::new(guard));
        }

        let order = self.locked_order(id)?.clone();
        Ok(Some(self.store.with_customer(order).await))
    }

    async fn update_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<()> {
        self.locked_order(id)?.status = status;
        Ok(())
    }

    async fn update_payment_status(
        &mut self,
        id: PaymentId,
        status: PaymentStatus,
    ) -> Result<()> {
        let payment = self
            .orders
            .values_mut()
            .filter_map(|row| row.working.payment.as_mut())
            .find(|payment| payment.id == id)
            .ok_or_else(|| StoreError::not_locked("payments", id))?;
        payment.status = status;
        payment.updated_at = Utc::now();
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let InMemoryTransaction {
            store,
            products,
            orders,
            new_orders,
        } = self;

        // New orders and the stock they consumed become visible together:
        // product rows stay locked until the order map is updated.
        let mut table = store.tables.orders.write().await;
        for order in new_orders {
            table.insert(order.id, Arc::new(Mutex::new(order)));
        }
        for (_, row) in products {
            row.publish();
        }
        for (_, row) in orders {
            row.publish();
        }
        drop(table);

        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        tracing::debug!(
            locked_products = self.products.len(),
            locked_orders = self.orders.len(),
            "rolling back in-memory transaction"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::{OrderRole, PaymentMethod};

    use super::*;
    use crate::{DeliveryAddressRecord, OrderItemRecord, PaymentRecord};

    fn product(id: i64, stock: i32) -> ProductRecord {
        ProductRecord {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            image_url: None,
            price_cents: 1000,
            stock,
        }
    }

    fn order(id: OrderId, user_id: Option<UserId>) -> OrderRecord {
        let now = Utc::now();
        OrderRecord {
            id,
            user_id,
            role: if user_id.is_some() {
                OrderRole::Customer
            } else {
                OrderRole::Guest
            },
            guest_email: user_id.is_none().then(|| "guest@example.com".to_string()),
            address: DeliveryAddressRecord {
                full_address: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                district: "Center".to_string(),
                postal_code: "12345".to_string(),
                recipient_name: "Sam".to_string(),
                phone_number: "555-0100".to_string(),
                title: None,
                email: None,
            },
            created_at: now,
            status: OrderStatus::Pending,
            total_cents: 2000,
            notes: None,
            items: vec![OrderItemRecord {
                product_id: ProductId::new(1),
                product_name: "Product 1".to_string(),
                image_url: None,
                quantity: 2,
                unit_price_cents: 1000,
            }],
            payment: Some(PaymentRecord {
                id: PaymentId::new(),
                order_id: id,
                amount_cents: 2000,
                method: PaymentMethod::Cash,
                status: PaymentStatus::Pending,
                transaction_id: None,
                error_message: None,
                created_at: now,
                updated_at: now,
            }),
            customer: None,
        }
    }

    #[tokio::test]
    async fn test_lock_products_returns_sorted_found_rows() {
        let store = InMemoryStore::new();
        store.insert_product(product(3, 5)).await;
        store.insert_product(product(1, 2)).await;

        let mut tx = store.begin().await.unwrap();
        let rows = tx
            .lock_products(&[ProductId::new(3), ProductId::new(99), ProductId::new(1)])
            .await
            .unwrap();

        let ids: Vec<i64> = rows.iter().map(|p| p.id.as_i64()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_commit_publishes_stock_changes() {
        let store = InMemoryStore::new();
        store.insert_product(product(1, 5)).await;

        let mut tx = store.begin().await.unwrap();
        tx.lock_products(&[ProductId::new(1)]).await.unwrap();
        tx.decrement_stock(ProductId::new(1), 3).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.stock_of(ProductId::new(1)).await, Some(2));
    }

    #[tokio::test]
    async fn test_drop_discards_stock_changes() {
        let store = InMemoryStore::new();
        store.insert_product(product(1, 5)).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.lock_products(&[ProductId::new(1)]).await.unwrap();
            tx.decrement_stock(ProductId::new(1), 3).await.unwrap();
        }

        assert_eq!(store.stock_of(ProductId::new(1)).await, Some(5));
    }

    #[tokio::test]
    async fn test_decrement_requires_lock() {
        let store = InMemoryStore::new();
        store.insert_product(product(1, 5)).await;

        let mut tx = store.begin().await.unwrap();
        let result = tx.decrement_stock(ProductId::new(1), 1).await;
        assert!(matches!(result, Err(StoreError::RowNotLocked { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_locker_waits_for_commit() {
        let store = InMemoryStore::new();
        store.insert_product(product(1, 5)).await;

        let mut first = store.begin().await.unwrap();
        first.lock_products(&[ProductId::new(1)]).await.unwrap();
        first.decrement_stock(ProductId::new(1), 3).await.unwrap();

        let contender = store.clone();
        let waiter = tokio::spawn(async move {
            let mut second = contender.begin().await.unwrap();
            let rows = second.lock_products(&[ProductId::new(1)]).await.unwrap();
            rows[0].stock
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        first.commit().await.unwrap();
        assert_eq!(waiter.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_inserted_order_visible_only_after_commit() {
        let store = InMemoryStore::new();
        let id = OrderId::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order(id, None)).await.unwrap();
        assert!(store.get_order(id).await.unwrap().is_none());

        tx.commit().await.unwrap();
        assert!(store.get_order(id).await.unwrap().is_some());
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_order_rejected() {
        let store = InMemoryStore::new();
        let id = OrderId::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order(id, None)).await.unwrap();
        let result = tx.insert_order(&order(id, None)).await;
        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_fail_on_insert() {
        let store = InMemoryStore::new();
        store.set_fail_on_insert(true);

        let mut tx = store.begin().await.unwrap();
        let result = tx.insert_order(&order(OrderId::new(), None)).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_status_and_payment_updates_on_locked_order() {
        let store = InMemoryStore::new();
        let id = OrderId::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order(id, None)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let locked = tx.lock_order(id).await.unwrap().unwrap();
        let payment_id = locked.payment.unwrap().id;
        tx.update_order_status(id, OrderStatus::Cancelled)
            .await
            .unwrap();
        tx.update_payment_status(payment_id, PaymentStatus::Refunded)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let stored = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert_eq!(stored.payment.unwrap().status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn test_orders_for_user_joins_customer_newest_first() {
        let store = InMemoryStore::new();
        let user = UserRecord {
            id: UserId::new(1),
            name: "Alex".to_string(),
            email: "alex@example.com".to_string(),
        };
        store.insert_user(user.clone()).await;

        let mut older = order(OrderId::new(), Some(user.id));
        older.created_at -= chrono::Duration::minutes(5);
        let newer = order(OrderId::new(), Some(user.id));

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&older).await.unwrap();
        tx.insert_order(&newer).await.unwrap();
        tx.insert_order(&order(OrderId::new(), None)).await.unwrap();
        tx.commit().await.unwrap();

        let orders = store.orders_for_user(user.id).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id, newer.id);
        assert_eq!(orders[0].customer.as_ref(), Some(&user));
    }
}
