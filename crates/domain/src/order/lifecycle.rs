//! Order lifecycle manager.

use chrono::Utc;
use common::{OrderId, OrderStatus};
use store::Transaction;

use crate::{Caller, DomainError};

use super::{InventoryLedger, Order, OrderError, TransitionPolicy};

/// Tunables of the order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LifecycleConfig {
    /// Which status changes are accepted.
    pub policy: TransitionPolicy,
    /// Whether cancelling an order returns its quantities to stock.
    pub restock_on_cancel: bool,
}

/// The outcome of a committed-to-be status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub order: Order,
    pub previous: OrderStatus,
}

/// Applies status changes to orders inside a store transaction.
///
/// Every change starts by locking the order row, so changes to one order are
/// serialized. Nothing is committed here.
#[derive(Debug, Clone, Default)]
pub struct LifecycleManager {
    config: LifecycleConfig,
}

impl LifecycleManager {
    pub fn new(config: LifecycleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> LifecycleConfig {
        self.config
    }

    /// Moves an order to `target`.
    ///
    /// Only operators may change a status. A move to `CANCELLED` is handed to
    /// [`LifecycleManager::cancel`] so the payment side effect always applies.
    pub async fn change_status<T: Transaction>(
        &self,
        tx: &mut T,
        order_id: OrderId,
        target: OrderStatus,
        caller: &Caller,
    ) -> Result<Transition, DomainError> {
        if target == OrderStatus::Cancelled {
            return self.cancel(tx, order_id, caller).await;
        }
        if !caller.is_operator() {
            return Err(OrderError::AccessDenied(
                "only operators can change an order status".to_string(),
            )
            .into());
        }

        let mut order = Self::lock(tx, order_id).await?;
        let previous = order.status();
        self.config.policy.check(previous, target)?;

        tx.update_order_status(order_id, target).await?;
        order.set_status(target);

        Ok(Transition { order, previous })
    }

    /// Cancels an order.
    ///
    /// The caller must own the order or be an operator. A settled payment is
    /// flagged as refunded. Quantities go back to stock only when
    /// `restock_on_cancel` is set.
    pub async fn cancel<T: Transaction>(
        &self,
        tx: &mut T,
        order_id: OrderId,
        caller: &Caller,
    ) -> Result<Transition, DomainError> {
        let mut order = Self::lock(tx, order_id).await?;
        if !caller.can_manage(order.user_id()) {
            return Err(OrderError::AccessDenied(format!(
                "caller may not cancel order {order_id}"
            ))
            .into());
        }

        let previous = order.status();
        if previous.is_terminal() {
            return Err(OrderError::IllegalStateTransition {
                from: previous,
                to: OrderStatus::Cancelled,
            }
            .into());
        }

        tx.update_order_status(order_id, OrderStatus::Cancelled)
            .await?;
        order.set_status(OrderStatus::Cancelled);

        if let Some(payment) = order.payment_mut() {
            if let Some(next) = payment.status_on_cancel() {
                tx.update_payment_status(payment.id, next).await?;
                tracing::info!(%order_id, payment_id = %payment.id, status = %next, "payment flagged");
                payment.status = next;
                payment.updated_at = Utc::now();
            }
        }

        if self.config.restock_on_cancel {
            InventoryLedger::restock(tx, order.items()).await?;
        }

        Ok(Transition { order, previous })
    }

    async fn lock<T: Transaction>(tx: &mut T, order_id: OrderId) -> Result<Order, DomainError> {
        tx.lock_order(order_id)
            .await?
            .map(Order::from)
            .ok_or_else(|| {
                OrderError::ResourceNotFound {
                    resource: "order",
                    id: order_id.to_string(),
                }
                .into()
            })
    }
}
