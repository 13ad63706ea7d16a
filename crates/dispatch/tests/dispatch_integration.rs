//! End-to-end tests: order service publishing into the dispatcher.

use std::sync::Arc;

use common::{AddressId, OrderStatus, PaymentMethod, ProductId, UserId};
use dispatch::{Dispatcher, DispatcherConfig, InMemoryNotifier, InMemorySearchIndex, Notification};
use domain::{CancelOrder, Caller, CheckoutItem, CheckoutRequest, OrderService, UpdateStatus};
use store::{AddressRecord, InMemoryStore, ProductRecord, UserRecord};

const CUSTOMER: UserId = UserId::new(1);
const OPERATOR: UserId = UserId::new(100);

struct Harness {
    service: OrderService<InMemoryStore, Arc<Dispatcher>>,
    dispatcher: Arc<Dispatcher>,
    notifier: InMemoryNotifier,
    index: InMemorySearchIndex,
}

async fn setup() -> Harness {
    let store = InMemoryStore::new();
    store
        .insert_product(ProductRecord {
            id: ProductId::new(1),
            name: "Burger".to_string(),
            image_url: None,
            price_cents: 1299,
            stock: 10,
        })
        .await;
    store
        .insert_user(UserRecord {
            id: CUSTOMER,
            name: "Alex".to_string(),
            email: "alex@example.com".to_string(),
        })
        .await;
    store
        .insert_address(AddressRecord {
            id: AddressId::new(10),
            user_id: CUSTOMER,
            title: None,
            full_address: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            district: "Center".to_string(),
            postal_code: "12345".to_string(),
            recipient_name: "Alex".to_string(),
            phone_number: "555-0100".to_string(),
        })
        .await;

    let notifier = InMemoryNotifier::new();
    let index = InMemorySearchIndex::new();
    let dispatcher = Arc::new(Dispatcher::start(
        DispatcherConfig::default(),
        Arc::new(notifier.clone()),
        Arc::new(index.clone()),
    ));

    Harness {
        service: OrderService::with_publisher(store, Arc::clone(&dispatcher)),
        dispatcher,
        notifier,
        index,
    }
}

fn checkout_request() -> CheckoutRequest {
    CheckoutRequest {
        items: vec![CheckoutItem::new(1, 2)],
        address_id: Some(AddressId::new(10)),
        payment_method: Some(PaymentMethod::CreditCard),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_placed_order_is_confirmed_to_customer_and_indexed() {
    let h = setup().await;

    let order = h
        .service
        .checkout(checkout_request(), &Caller::customer(CUSTOMER))
        .await
        .unwrap();
    h.dispatcher.shutdown().await;

    assert_eq!(
        h.notifier.sent(),
        vec![Notification::Confirmation {
            order_id: order.id(),
            recipient: "alex@example.com".to_string(),
        }]
    );
    let document = h.index.document(order.id()).unwrap();
    assert_eq!(document["status"], "PENDING");
    assert_eq!(document["totalCents"], 2598);
}

#[tokio::test]
async fn test_status_changes_refresh_index_and_notify() {
    let h = setup().await;
    let order = h
        .service
        .checkout(checkout_request(), &Caller::customer(CUSTOMER))
        .await
        .unwrap();

    h.service
        .update_status(
            UpdateStatus::new(order.id(), OrderStatus::Confirmed),
            &Caller::operator(OPERATOR),
        )
        .await
        .unwrap();
    h.dispatcher.shutdown().await;

    assert!(h.notifier.sent().contains(&Notification::StatusUpdate {
        order_id: order.id(),
        recipient: "alex@example.com".to_string(),
        status: OrderStatus::Confirmed,
    }));
    // Workers may finish out of order, but both events were delivered.
    assert_eq!(h.notifier.sent().len(), 2);
    assert!(h.index.document(order.id()).is_some());
}

#[tokio::test]
async fn test_cancelled_order_leaves_the_index() {
    let h = setup().await;
    let order = h
        .service
        .checkout(checkout_request(), &Caller::customer(CUSTOMER))
        .await
        .unwrap();
    // Let the placement be indexed before the removal is queued.
    let wait = async {
        while h.index.document(order.id()).is_none() {
            tokio::task::yield_now().await;
        }
    };
    tokio::time::timeout(std::time::Duration::from_secs(5), wait)
        .await
        .unwrap();

    h.service
        .cancel_order(CancelOrder::new(order.id()), &Caller::customer(CUSTOMER))
        .await
        .unwrap();
    h.dispatcher.shutdown().await;

    assert!(h.index.document(order.id()).is_none());
}

#[tokio::test]
async fn test_side_effect_failures_do_not_fail_checkout() {
    let h = setup().await;
    h.notifier.set_fail_on_send(true);
    h.index.set_fail_on_index(true);

    let result = h
        .service
        .checkout(checkout_request(), &Caller::customer(CUSTOMER))
        .await;
    h.dispatcher.shutdown().await;

    assert!(result.is_ok());
    assert_eq!(h.service.store().order_count().await, 1);
    assert!(h.notifier.sent().is_empty());
    assert!(h.index.is_empty());
}
