//! Domain layer of the order pipeline.
//!
//! This crate turns a cart into a durable order and drives it through its
//! lifecycle:
//! - `OrderValidator` rejects malformed checkouts before anything is touched
//! - `AddressResolver` and `InventoryLedger` resolve the delivery address and
//!   reserve stock under row locks
//! - `Order::assemble` and `Payment::pending_for` build the aggregate
//! - `LifecycleManager` guards status changes and cancellation
//! - `OrderService` runs all of it inside store transactions and publishes
//!   `OrderEvent`s after commit

pub mod caller;
pub mod error;
pub mod order;

pub use caller::Caller;
pub use error::DomainError;
pub use order::{
    AddressResolver, CancelOrder, CheckoutItem, CheckoutRequest, Customer, DeliveryAddress,
    EventPublisher, InventoryLedger, LifecycleConfig, LifecycleManager, Money, NewAddress,
    NoopPublisher, Order, OrderError, OrderEvent, OrderItem, OrderService, OrderValidator,
    Payment, ReservedLine, Transition, TransitionPolicy, UpdateStatus,
};
