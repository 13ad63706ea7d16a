//! Order service running the checkout pipeline and status changes.

use std::time::Instant;

use common::{OrderId, OrderStatus, UserId};
use store::{Store, Transaction};

use crate::{Caller, DomainError};

use super::{
    AddressResolver, CancelOrder, CheckoutRequest, Customer, EventPublisher, InventoryLedger,
    LifecycleConfig, LifecycleManager, NoopPublisher, Order, OrderError, OrderEvent,
    OrderValidator, Payment, ReservedLine, Transition, UpdateStatus,
};

/// Message returned to callers when checkout fails unexpectedly.
const CREATION_FAILED: &str = "unable to create order, please try again";

/// Service for placing and managing orders.
///
/// Each operation runs in its own store transaction. Events are published
/// only after the transaction commits, and publishing never fails the
/// operation.
pub struct OrderService<S: Store, P: EventPublisher = NoopPublisher> {
    store: S,
    publisher: P,
    lifecycle: LifecycleManager,
}

impl<S: Store> OrderService<S> {
    /// Creates a new order service that publishes nothing.
    pub fn new(store: S) -> Self {
        Self::with_publisher(store, NoopPublisher)
    }
}

impl<S: Store, P: EventPublisher> OrderService<S, P> {
    /// Creates a new order service publishing committed events to `publisher`.
    pub fn with_publisher(store: S, publisher: P) -> Self {
        Self {
            store,
            publisher,
            lifecycle: LifecycleManager::default(),
        }
    }

    /// Replaces the lifecycle configuration.
    pub fn with_lifecycle(mut self, config: LifecycleConfig) -> Self {
        self.lifecycle = LifecycleManager::new(config);
        self
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn lifecycle_config(&self) -> LifecycleConfig {
        self.lifecycle.config()
    }

    /// Places an order.
    ///
    /// Validation runs before the transaction opens. The address, the stock
    /// decrements, the order and its payment stub are then written in one
    /// transaction: either all of them commit or none does.
    #[tracing::instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn checkout(
        &self,
        request: CheckoutRequest,
        caller: &Caller,
    ) -> Result<Order, DomainError> {
        metrics::counter!("checkout_total").increment(1);
        let started = Instant::now();

        let result = self.try_checkout(&request, caller).await;
        match &result {
            Ok(order) => {
                metrics::histogram!("checkout_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(
                    order_id = %order.id(),
                    total = %order.total(),
                    role = %order.role(),
                    "order placed"
                );
                self.publisher.publish(OrderEvent::Placed(order.clone()));
            }
            Err(e) => {
                metrics::counter!("checkout_failures_total", "reason" => e.reason()).increment(1);
                tracing::debug!(error = %e, "checkout rejected");
            }
        }
        result
    }

    async fn try_checkout(
        &self,
        request: &CheckoutRequest,
        caller: &Caller,
    ) -> Result<Order, DomainError> {
        OrderValidator::validate(request, caller)?;

        let mut tx = self.store.begin().await.map_err(|e| creation_failure(e.into()))?;
        let order = match self.assemble(&mut tx, request, caller).await {
            Ok(order) => order,
            Err(e) => {
                rollback(tx).await;
                return Err(creation_failure(e));
            }
        };
        tx.commit().await.map_err(|e| creation_failure(e.into()))?;

        Ok(order)
    }

    /// Address resolution, stock reservation, assembly and payment stub,
    /// all inside `tx`.
    async fn assemble(
        &self,
        tx: &mut S::Tx,
        request: &CheckoutRequest,
        caller: &Caller,
    ) -> Result<Order, DomainError> {
        let method = request
            .payment_method
            .ok_or_else(|| OrderError::Validation("Payment method is required".to_string()))?;

        // The order row references the user, so a missing user is rejected
        // here rather than by the store on insert.
        let customer = match caller.user_id() {
            Some(user_id) => {
                let user = tx.find_user(user_id).await?.ok_or_else(|| {
                    OrderError::ResourceNotFound {
                        resource: "user",
                        id: user_id.to_string(),
                    }
                })?;
                Some(Customer::from(user))
            }
            None => None,
        };

        let address = AddressResolver::resolve(tx, request, caller).await?;
        let reserved = InventoryLedger::reserve(tx, &request.items).await?;

        let mut order = Order::assemble(
            OrderId::new(),
            caller,
            address,
            reserved.iter().map(ReservedLine::to_order_item).collect(),
            request.notes.clone(),
        )?;
        order.attach_payment(Payment::pending_for(order.id(), order.total(), method))?;

        tx.insert_order(&order.to_record()).await?;
        order.set_customer(customer);

        Ok(order)
    }

    /// Moves an order to another status.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        cmd: UpdateStatus,
        caller: &Caller,
    ) -> Result<Order, DomainError> {
        let mut tx = self.store.begin().await?;
        let transition = match self
            .lifecycle
            .change_status(&mut tx, cmd.order_id, cmd.status, caller)
            .await
        {
            Ok(transition) => transition,
            Err(e) => {
                rollback(tx).await;
                tracing::debug!(error = %e, "status change rejected");
                return Err(e);
            }
        };
        tx.commit().await?;

        Ok(self.announce(transition))
    }

    /// Cancels an order.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        cmd: CancelOrder,
        caller: &Caller,
    ) -> Result<Order, DomainError> {
        let mut tx = self.store.begin().await?;
        let transition = match self.lifecycle.cancel(&mut tx, cmd.order_id, caller).await {
            Ok(transition) => transition,
            Err(e) => {
                rollback(tx).await;
                tracing::debug!(error = %e, "cancellation rejected");
                return Err(e);
            }
        };
        tx.commit().await?;

        Ok(self.announce(transition))
    }

    /// Loads an order the caller may see.
    ///
    /// Owners see their orders, operators see every order. Guest orders have
    /// no owner and are visible to operators only.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId, caller: &Caller) -> Result<Order, DomainError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .map(Order::from)
            .ok_or_else(|| OrderError::ResourceNotFound {
                resource: "order",
                id: order_id.to_string(),
            })?;

        if !caller.can_manage(order.user_id()) {
            return Err(OrderError::AccessDenied(format!(
                "caller may not view order {order_id}"
            ))
            .into());
        }
        Ok(order)
    }

    /// Loads every order of a user, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, DomainError> {
        let records = self.store.orders_for_user(user_id).await?;
        Ok(records.into_iter().map(Order::from).collect())
    }

    /// Records and publishes a committed transition.
    fn announce(&self, transition: Transition) -> Order {
        let Transition { order, previous } = transition;
        let status = order.status();

        metrics::counter!("order_status_transitions_total", "to" => status.as_str()).increment(1);
        if status == OrderStatus::Cancelled {
            metrics::counter!("order_cancellations_total").increment(1);
        }
        tracing::info!(order_id = %order.id(), from = %previous, to = %status, "order status changed");

        self.publisher.publish(OrderEvent::StatusChanged {
            order: order.clone(),
            previous,
        });
        order
    }
}

async fn rollback<T: Transaction>(tx: T) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "rollback failed, relying on drop");
    }
}

/// Hides unexpected checkout failures behind a generic creation error.
///
/// Business errors pass through unchanged. Store failures and assembly
/// invariant violations are logged in full and replaced.
fn creation_failure(err: DomainError) -> DomainError {
    match err {
        DomainError::Store(e) => {
            tracing::error!(error = %e, "order creation failed in the store");
            OrderError::OrderCreation(CREATION_FAILED.to_string()).into()
        }
        DomainError::Order(OrderError::OrderCreation(detail)) => {
            tracing::error!(%detail, "order assembly invariant violated");
            OrderError::OrderCreation(CREATION_FAILED.to_string()).into()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use common::{PaymentMethod, PaymentStatus, ProductId};
    use store::{InMemoryStore, ProductRecord, UserRecord};

    use super::*;
    use crate::order::{CheckoutItem, NewAddress};

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<OrderEvent>>,
    }

    impl EventPublisher for RecordingPublisher {
        fn publish(&self, event: OrderEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    async fn setup() -> (
        OrderService<InMemoryStore, Arc<RecordingPublisher>>,
        Arc<RecordingPublisher>,
    ) {
        let store = InMemoryStore::new();
        store
            .insert_product(ProductRecord {
                id: ProductId::new(1),
                name: "Widget".to_string(),
                image_url: Some("https://img.example.com/widget.png".to_string()),
                price_cents: 1250,
                stock: 10,
            })
            .await;
        store
            .insert_user(UserRecord {
                id: UserId::new(1),
                name: "Alex".to_string(),
                email: "alex@example.com".to_string(),
            })
            .await;

        let publisher = Arc::new(RecordingPublisher::default());
        (
            OrderService::with_publisher(store, publisher.clone()),
            publisher,
        )
    }

    fn request(quantity: i32) -> CheckoutRequest {
        CheckoutRequest {
            items: vec![CheckoutItem::new(1, quantity)],
            address_id: None,
            new_address: Some(NewAddress {
                full_address: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                district: "Center".to_string(),
                postal_code: "12345".to_string(),
                phone_number: "555-0100".to_string(),
                recipient_name: "Alex".to_string(),
                address_title: None,
                email: Some("alex@example.com".to_string()),
            }),
            payment_method: Some(PaymentMethod::OnlineCreditCard),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_checkout_builds_order_and_publishes() {
        let (service, publisher) = setup().await;
        let caller = Caller::customer(UserId::new(1));

        let order = service.checkout(request(2), &caller).await.unwrap();

        assert_eq!(order.total().cents(), 2500);
        assert_eq!(order.items()[0].image_url.as_deref(), Some("https://img.example.com/widget.png"));
        let payment = order.payment().unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount, order.total());
        assert_eq!(order.customer().unwrap().name, "Alex");

        let events = publisher.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "placed");
    }

    #[tokio::test]
    async fn test_unknown_user_is_rejected_before_insert() {
        let (service, publisher) = setup().await;

        let result = service
            .checkout(request(2), &Caller::customer(UserId::new(404)))
            .await;

        assert!(matches!(
            result,
            Err(DomainError::Order(OrderError::ResourceNotFound { resource: "user", .. }))
        ));
        assert_eq!(service.store().order_count().await, 0);
        assert_eq!(service.store().stock_of(ProductId::new(1)).await, Some(10));
        assert!(publisher.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_checkout_publishes_nothing() {
        let (service, publisher) = setup().await;

        let result = service.checkout(request(11), &Caller::guest()).await;

        assert!(matches!(
            result,
            Err(DomainError::Order(OrderError::InsufficientStock { .. }))
        ));
        assert!(publisher.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_becomes_generic_creation_error() {
        let (service, _) = setup().await;
        service.store().set_fail_on_insert(true);

        let err = service
            .checkout(request(2), &Caller::guest())
            .await
            .unwrap_err();

        match err {
            DomainError::Order(OrderError::OrderCreation(msg)) => {
                assert_eq!(msg, CREATION_FAILED);
            }
            other => panic!("expected order creation error, got {other:?}"),
        }
        assert_eq!(service.store().stock_of(ProductId::new(1)).await, Some(10));
    }

    #[tokio::test]
    async fn test_status_update_publishes_transition() {
        let (service, publisher) = setup().await;
        let order = service
            .checkout(request(1), &Caller::customer(UserId::new(1)))
            .await
            .unwrap();

        let updated = service
            .update_status(
                UpdateStatus::new(order.id(), OrderStatus::Confirmed),
                &Caller::operator(UserId::new(50)),
            )
            .await
            .unwrap();

        assert_eq!(updated.status(), OrderStatus::Confirmed);
        let events = publisher.events.lock().unwrap();
        assert!(matches!(
            &events[1],
            OrderEvent::StatusChanged { previous: OrderStatus::Pending, .. }
        ));
    }

    #[tokio::test]
    async fn test_guest_order_visible_to_operators_only() {
        let (service, _) = setup().await;
        let order = service.checkout(request(1), &Caller::guest()).await.unwrap();

        assert!(matches!(
            service.get_order(order.id(), &Caller::customer(UserId::new(1))).await,
            Err(DomainError::Order(OrderError::AccessDenied(_)))
        ));
        assert!(matches!(
            service.get_order(order.id(), &Caller::guest()).await,
            Err(DomainError::Order(OrderError::AccessDenied(_)))
        ));
        let seen = service
            .get_order(order.id(), &Caller::operator(UserId::new(50)))
            .await
            .unwrap();
        assert_eq!(seen.id(), order.id());
    }

    #[tokio::test]
    async fn test_missing_order_is_not_found() {
        let (service, _) = setup().await;
        let result = service
            .get_order(OrderId::new(), &Caller::operator(UserId::new(50)))
            .await;
        assert!(matches!(
            result,
            Err(DomainError::Order(OrderError::ResourceNotFound { .. }))
        ));
    }
}
