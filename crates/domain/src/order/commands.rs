//! Requests accepted by the order service.

use common::{AddressId, OrderId, OrderStatus, PaymentMethod, ProductId};
use serde::{Deserialize, Serialize};

/// One requested line of a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub product_id: ProductId,
    /// Signed so that out-of-range values reach validation.
    pub quantity: i32,
}

impl CheckoutItem {
    pub fn new(product_id: impl Into<ProductId>, quantity: i32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// An inline delivery address supplied with the checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAddress {
    pub full_address: String,
    pub city: String,
    pub district: String,
    pub postal_code: String,
    pub phone_number: String,
    pub recipient_name: String,
    #[serde(default)]
    pub address_title: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Command to create an order from a cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub items: Vec<CheckoutItem>,
    #[serde(default)]
    pub address_id: Option<AddressId>,
    #[serde(default)]
    pub new_address: Option<NewAddress>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Command to move an order to another status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

impl UpdateStatus {
    pub fn new(order_id: OrderId, status: OrderStatus) -> Self {
        Self { order_id, status }
    }
}

/// Command to cancel an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
}

impl CancelOrder {
    pub fn new(order_id: OrderId) -> Self {
        Self { order_id }
    }
}
