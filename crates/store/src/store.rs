use async_trait::async_trait;
use common::{OrderId, OrderStatus, PaymentId, PaymentStatus, ProductId, UserId};

use crate::{AddressRecord, OrderRecord, ProductRecord, Result, UserRecord};

/// Core trait for store implementations.
///
/// Reads through the store see committed data only. Reads of a row that is
/// locked by an open [`Transaction`] wait until that transaction finishes.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    /// The transaction type handed out by [`Store::begin`].
    type Tx: Transaction + 'static;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Loads an order with its items, payment and owning user.
    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>>;

    /// Loads every order placed by a user, newest first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<OrderRecord>>;

    /// Loads a product with its committed stock.
    async fn get_product(&self, id: ProductId) -> Result<Option<ProductRecord>>;
}

/// A unit of work over the store.
///
/// Writes become visible to other transactions only on [`Transaction::commit`].
/// Dropping a transaction without committing rolls it back and releases
/// every lock it holds.
#[async_trait]
pub trait Transaction: Send {
    /// Exclusively locks the product rows for `ids` in one batch.
    ///
    /// Locks are acquired in ascending id order regardless of the order of
    /// `ids`, so two transactions locking overlapping product sets cannot
    /// deadlock. Duplicates are ignored. Ids without a row are absent from
    /// the result, which is sorted by id.
    ///
    /// Blocks while another transaction holds any of the rows.
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<ProductRecord>>;

    /// Decrements the stock of a product locked by this transaction.
    async fn decrement_stock(&mut self, id: ProductId, quantity: i32) -> Result<()>;

    /// Returns stock to a product locked by this transaction.
    async fn restock(&mut self, id: ProductId, quantity: i32) -> Result<()>;

    /// Reads a user row.
    async fn find_user(&mut self, id: UserId) -> Result<Option<UserRecord>>;

    /// Reads a user's saved addresses from the backing store.
    async fn user_addresses(&mut self, user_id: UserId) -> Result<Vec<AddressRecord>>;

    /// Inserts an order with its items and payment.
    async fn insert_order(&mut self, order: &OrderRecord) -> Result<()>;

    /// Exclusively locks an order row and loads it.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<OrderRecord>>;

    /// Sets the status of an order locked by this transaction.
    async fn update_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<()>;

    /// Sets the status of the payment of an order locked by this transaction.
    async fn update_payment_status(&mut self, id: PaymentId, status: PaymentStatus)
    -> Result<()>;

    /// Makes every write of this transaction visible and releases its locks.
    async fn commit(self) -> Result<()>;

    /// Discards every write of this transaction and releases its locks.
    async fn rollback(self) -> Result<()>;
}

/// Returns `ids` sorted ascending with duplicates removed.
///
/// This is the order in which product rows must be locked.
pub fn lock_sequence(ids: &[ProductId]) -> Vec<ProductId> {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_sequence_sorts_and_dedups() {
        let ids = [
            ProductId::new(7),
            ProductId::new(3),
            ProductId::new(7),
            ProductId::new(1),
        ];
        assert_eq!(
            lock_sequence(&ids),
            vec![ProductId::new(1), ProductId::new(3), ProductId::new(7)]
        );
    }

    #[test]
    fn test_lock_sequence_is_independent_of_input_order() {
        let a = [ProductId::new(2), ProductId::new(9), ProductId::new(4)];
        let b = [ProductId::new(9), ProductId::new(4), ProductId::new(2)];
        assert_eq!(lock_sequence(&a), lock_sequence(&b));
    }
}
