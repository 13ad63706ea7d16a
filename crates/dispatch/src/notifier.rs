//! Notification contract and in-memory implementation.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use common::{OrderId, OrderStatus};
use domain::Order;

use crate::{DispatchError, Result};

/// Outbound customer notifications.
///
/// Rendering and transport belong to the notification module; the order
/// pipeline only says what happened to which order.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Confirms a freshly placed order.
    async fn send_order_confirmation(&self, order: &Order) -> Result<()>;

    /// Tells the customer their order moved to `status`.
    async fn send_status_update(&self, order: &Order, status: OrderStatus) -> Result<()>;
}

/// Where a notification for `order` goes.
///
/// The joined customer email wins over the guest contact email.
pub fn recipient_of(order: &Order) -> Result<String> {
    order
        .customer()
        .map(|c| c.email.clone())
        .or_else(|| order.guest_email().map(str::to_string))
        .or_else(|| order.address().email.clone())
        .ok_or_else(|| DispatchError::NoRecipient(order.id().to_string()))
}

/// A notification recorded by [`InMemoryNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Confirmation {
        order_id: OrderId,
        recipient: String,
    },
    StatusUpdate {
        order_id: OrderId,
        recipient: String,
        status: OrderStatus,
    },
}

/// Notifier that logs each message and keeps nothing.
///
/// Stands in for the notification module when none is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send_order_confirmation(&self, order: &Order) -> Result<()> {
        let recipient = recipient_of(order)?;
        tracing::info!(order_id = %order.id(), %recipient, "order confirmation");
        Ok(())
    }

    async fn send_status_update(&self, order: &Order, status: OrderStatus) -> Result<()> {
        let recipient = recipient_of(order)?;
        tracing::info!(order_id = %order.id(), %recipient, %status, "order status update");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<Notification>,
    fail_on_send: bool,
}

/// In-memory notifier for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<Mutex<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state().fail_on_send = fail;
    }

    /// Returns every notification sent so far.
    pub fn sent(&self) -> Vec<Notification> {
        self.state().sent.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, InMemoryNotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, notification: Notification) -> Result<()> {
        let mut state = self.state();
        if state.fail_on_send {
            return Err(DispatchError::Notification(
                "notification transport unavailable".to_string(),
            ));
        }
        tracing::debug!(?notification, "notification sent");
        state.sent.push(notification);
        Ok(())
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send_order_confirmation(&self, order: &Order) -> Result<()> {
        self.record(Notification::Confirmation {
            order_id: order.id(),
            recipient: recipient_of(order)?,
        })
    }

    async fn send_status_update(&self, order: &Order, status: OrderStatus) -> Result<()> {
        self.record(Notification::StatusUpdate {
            order_id: order.id(),
            recipient: recipient_of(order)?,
            status,
        })
    }
}
