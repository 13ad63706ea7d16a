//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::config::Config;
use api::routes::orders::{AppState, ORDER_SUMMARY};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{AddressId, OrderId, ProductId, UserId};
use dispatch::{InMemoryNotifier, InMemorySearchIndex, Notification};
use domain::Caller;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{AddressRecord, InMemoryStore, ProductRecord, UserRecord};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    for (id, name, price_cents, stock) in [(1, "Burger", 1299, 5), (2, "Fries", 399, 1)] {
        store
            .insert_product(ProductRecord {
                id: ProductId::new(id),
                name: name.to_string(),
                image_url: None,
                price_cents,
                stock,
            })
            .await;
    }
    store
        .insert_user(UserRecord {
            id: UserId::new(1),
            name: "Alex".to_string(),
            email: "alex@example.com".to_string(),
        })
        .await;
    store
        .insert_address(AddressRecord {
            id: AddressId::new(10),
            user_id: UserId::new(1),
            title: Some("Home".to_string()),
            full_address: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            district: "Center".to_string(),
            postal_code: "12345".to_string(),
            recipient_name: "Alex".to_string(),
            phone_number: "555-0100".to_string(),
        })
        .await;
    store
}

async fn setup() -> (axum::Router, Arc<AppState<InMemoryStore>>) {
    let store = seeded_store().await;
    let state = api::create_default_state(store, &Config::default());
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

fn request(method: &str, uri: &str, user: Option<(i64, &str)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = user {
        builder = builder
            .header("x-user-id", id.to_string())
            .header("x-user-role", role);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

const CUSTOMER: Option<(i64, &str)> = Some((1, "customer"));
const STRANGER: Option<(i64, &str)> = Some((2, "customer"));
const OPERATOR: Option<(i64, &str)> = Some((100, "operator"));

fn customer_checkout(quantity: i32) -> Value {
    json!({
        "items": [{"productId": 1, "quantity": quantity}],
        "addressId": 10,
        "paymentMethod": "CREDIT_CARD",
        "notes": "ring twice"
    })
}

async fn place_order(app: &axum::Router) -> String {
    let (status, json) = send(app, request("POST", "/orders", CUSTOMER, Some(customer_checkout(2)))).await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup().await;

    let (status, json) = send(&app, request("GET", "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["droppedSideEffects"], 0);
}

#[tokio::test]
async fn test_customer_checkout_returns_full_summary() {
    let (app, state) = setup().await;

    let (status, json) = send(&app, request("POST", "/orders", CUSTOMER, Some(customer_checkout(2)))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "PENDING");
    assert_eq!(json["role"], "CUSTOMER");
    assert_eq!(json["totalCents"], 2598);
    assert_eq!(json["notes"], "ring twice");
    assert_eq!(json["deliveryAddress"]["city"], "Springfield");
    assert_eq!(json["payment"]["method"], "CREDIT_CARD");
    assert_eq!(json["payment"]["status"], "PENDING");
    assert_eq!(json["items"][0]["productName"], "Burger");
    assert_eq!(json["items"][0]["subtotalCents"], 2598);
    assert_eq!(json["user"]["email"], "alex@example.com");
    assert_eq!(
        state.order_service.store().stock_of(ProductId::new(1)).await,
        Some(3)
    );
}

#[tokio::test]
async fn test_guest_checkout_with_inline_address() {
    let (app, _) = setup().await;
    let body = json!({
        "items": [{"productId": 2, "quantity": 1}],
        "newAddress": {
            "fullAddress": "9 Elm St",
            "city": "Shelbyville",
            "district": "North",
            "postalCode": "54321",
            "phoneNumber": "555-0199",
            "recipientName": "Sam",
            "email": "sam@example.com"
        },
        "paymentMethod": "CASH"
    });

    let (status, json) = send(&app, request("POST", "/orders", None, Some(body))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["role"], "GUEST");
    assert_eq!(json["guestEmail"], "sam@example.com");
    assert_eq!(json["user"], Value::Null);
}

#[tokio::test]
async fn test_checkout_error_statuses() {
    let (app, _) = setup().await;

    // Validation: empty cart.
    let (status, json) = send(
        &app,
        request(
            "POST",
            "/orders",
            CUSTOMER,
            Some(json!({"items": [], "addressId": 10, "paymentMethod": "CASH"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().is_some());

    // Unknown product.
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/orders",
            CUSTOMER,
            Some(json!({
                "items": [{"productId": 99, "quantity": 1}],
                "addressId": 10,
                "paymentMethod": "CASH"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Insufficient stock.
    let (status, json) = send(&app, request("POST", "/orders", CUSTOMER, Some(customer_checkout(6)))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("Burger"));

    // Malformed JSON.
    let malformed = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, json) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_get_order_access_rules() {
    let (app, _) = setup().await;
    let id = place_order(&app).await;
    let uri = format!("/orders/{id}");

    let (status, json) = send(&app, request("GET", &uri, CUSTOMER, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], id.as_str());

    // Served from the cache, still checked against the caller.
    let (status, _) = send(&app, request("GET", &uri, STRANGER, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, request("GET", &uri, OPERATOR, None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, request("GET", &uri, None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, request("GET", "/orders/not-a-uuid", CUSTOMER, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = format!("/orders/{}", OrderId::new());
    let (status, _) = send(&app, request("GET", &missing, CUSTOMER, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_my_orders() {
    let (app, _) = setup().await;
    let first = place_order(&app).await;
    let second = place_order(&app).await;

    let (status, json) = send(&app, request("GET", "/orders", CUSTOMER, None)).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first.as_str()));
    assert!(ids.contains(&second.as_str()));

    let (status, _) = send(&app, request("GET", "/orders", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_update_invalidates_cached_summary() {
    let (app, _) = setup().await;
    let id = place_order(&app).await;
    let uri = format!("/orders/{id}");

    let (_, json) = send(&app, request("GET", &uri, CUSTOMER, None)).await;
    assert_eq!(json["status"], "PENDING");

    let status_uri = format!("/orders/{id}/status");
    let (status, json) = send(
        &app,
        request("PUT", &status_uri, OPERATOR, Some(json!({"status": "CONFIRMED"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "CONFIRMED");

    let (_, json) = send(&app, request("GET", &uri, CUSTOMER, None)).await;
    assert_eq!(json["status"], "CONFIRMED");
}

#[tokio::test]
async fn test_status_update_requires_operator() {
    let (app, _) = setup().await;
    let id = place_order(&app).await;
    let status_uri = format!("/orders/{id}/status");

    let (status, _) = send(
        &app,
        request("PUT", &status_uri, CUSTOMER, Some(json!({"status": "CONFIRMED"}))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        request("PUT", &status_uri, None, Some(json!({"status": "CONFIRMED"}))),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        request("PUT", &status_uri, OPERATOR, Some(json!({"status": "TELEPORTED"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_then_terminal_is_conflict() {
    let (app, _) = setup().await;
    let id = place_order(&app).await;
    let cancel_uri = format!("/orders/{id}/cancel");

    let (status, _) = send(&app, request("POST", &cancel_uri, STRANGER, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = send(&app, request("POST", &cancel_uri, CUSTOMER, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "CANCELLED");
    assert_eq!(json["paymentStatus"], "PENDING");

    let (status, _) = send(&app, request("POST", &cancel_uri, CUSTOMER, None)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let status_uri = format!("/orders/{id}/status");
    let (status, _) = send(
        &app,
        request("PUT", &status_uri, OPERATOR, Some(json!({"status": "SHIPPING"}))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_metrics_endpoint_renders() {
    let (app, _) = setup().await;
    place_order(&app).await;

    let response = app
        .oneshot(request("GET", "/metrics", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("checkout_total"));
}

#[tokio::test]
async fn test_read_racing_a_status_change_leaves_no_stale_summary() {
    let (app, state) = setup().await;
    let id = place_order(&app).await;
    let order_id = OrderId::from(uuid::Uuid::parse_str(&id).unwrap());

    // A reader misses and loads the order as it is before the change.
    let seen = state.cache.generation().await;
    let loaded = state
        .order_service
        .get_order(order_id, &Caller::customer(UserId::new(1)))
        .await
        .unwrap();

    // The status change commits and invalidates before the reader stores.
    let (status, _) = send(
        &app,
        request(
            "PUT",
            &format!("/orders/{id}/status"),
            OPERATOR,
            Some(json!({"status": "CONFIRMED"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let stored = state
        .cache
        .insert_if_current(ORDER_SUMMARY, &id, loaded, seen)
        .await;
    assert!(!stored);

    let (_, json) = send(&app, request("GET", &format!("/orders/{id}"), CUSTOMER, None)).await;
    assert_eq!(json["status"], "CONFIRMED");
}

#[tokio::test]
async fn test_explicit_collaborators_receive_side_effects() {
    let notifier = InMemoryNotifier::new();
    let index = InMemorySearchIndex::new();
    let state = api::create_state(
        seeded_store().await,
        &Config::default(),
        Arc::new(notifier.clone()),
        Arc::new(index.clone()),
    );
    let app = api::create_app(state.clone(), get_metrics_handle());

    let id = place_order(&app).await;
    state.dispatcher.shutdown().await;

    let order_id = OrderId::from(uuid::Uuid::parse_str(&id).unwrap());
    assert_eq!(
        notifier.sent(),
        vec![Notification::Confirmation {
            order_id,
            recipient: "alex@example.com".to_string(),
        }]
    );
    assert!(index.document(order_id).is_some());
}
