//! Transactional storage for orders, payments and product inventory.
//!
//! The store exposes a [`Store`] for plain reads and a [`Transaction`] for
//! the locked read-modify-write cycles of checkout and order status changes.
//! Two implementations share the same semantics:
//! - [`InMemoryStore`] for tests and local runs
//! - [`PostgresStore`] backed by `SELECT ... FOR UPDATE` row locks

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use records::{
    AddressRecord, DeliveryAddressRecord, OrderItemRecord, OrderRecord, PaymentRecord,
    ProductRecord, UserRecord,
};
pub use store::{Store, Transaction, lock_sequence};
