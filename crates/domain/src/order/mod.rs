//! Order aggregate and the checkout pipeline around it.

mod address;
mod aggregate;
mod commands;
mod events;
mod inventory;
mod lifecycle;
mod payment;
mod service;
mod state;
mod validator;
mod value_objects;

pub use address::AddressResolver;
pub use aggregate::{Customer, Order};
pub use commands::*;
pub use events::{EventPublisher, NoopPublisher, OrderEvent};
pub use inventory::{InventoryLedger, ReservedLine};
pub use lifecycle::{LifecycleConfig, LifecycleManager, Transition};
pub use payment::Payment;
pub use service::OrderService;
pub use state::TransitionPolicy;
pub use validator::{MAX_NOTES_CHARS, OrderValidator, QUANTITY_RANGE};
pub use value_objects::{DeliveryAddress, Money, OrderItem};

use common::OrderStatus;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The request is malformed or contradictory.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced product, address or order does not exist.
    #[error("{resource} not found: {id}")]
    ResourceNotFound { resource: &'static str, id: String },

    /// A product does not have enough stock for the requested quantity.
    #[error("Insufficient stock for {product_name}: {available} available, {requested} requested")]
    InsufficientStock {
        product_name: String,
        available: i32,
        requested: u32,
    },

    /// The status change is not permitted from the current status.
    #[error("Cannot change order status from {from} to {to}")]
    IllegalStateTransition { from: OrderStatus, to: OrderStatus },

    /// The caller may not act on this order.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// An unexpected failure while assembling or committing an order.
    #[error("Order creation failed: {0}")]
    OrderCreation(String),
}

impl OrderError {
    /// Short, stable label used for the failure metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            OrderError::Validation(_) => "validation",
            OrderError::ResourceNotFound { .. } => "not_found",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::IllegalStateTransition { .. } => "illegal_transition",
            OrderError::AccessDenied(_) => "access_denied",
            OrderError::OrderCreation(_) => "order_creation",
        }
    }
}
