//! Side-effect messages emitted after an order transaction commits.

use std::sync::Arc;

use common::OrderStatus;
use serde::{Deserialize, Serialize};

use super::Order;

/// Something that happened to an order, announced after commit.
///
/// Consumers (notification, search indexing) run off the critical path. A
/// failure on their side never affects the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// A checkout committed.
    Placed(Order),
    /// An order moved to a new status, cancellation included.
    StatusChanged {
        order: Order,
        previous: OrderStatus,
    },
}

impl OrderEvent {
    /// The order as committed.
    pub fn order(&self) -> &Order {
        match self {
            OrderEvent::Placed(order) => order,
            OrderEvent::StatusChanged { order, .. } => order,
        }
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "placed",
            OrderEvent::StatusChanged { .. } => "status_changed",
        }
    }
}

/// Hands committed order events to the side-effect pipeline.
///
/// `publish` must not block: implementations enqueue and return.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: OrderEvent);
}

impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    fn publish(&self, event: OrderEvent) {
        (**self).publish(event)
    }
}

/// Publisher that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, event: OrderEvent) {
        tracing::trace!(kind = event.kind(), order_id = %event.order().id(), "event dropped");
    }
}
