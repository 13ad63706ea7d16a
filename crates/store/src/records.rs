//! Row-shaped records exchanged between the store and the domain.

use chrono::{DateTime, Utc};
use common::{
    AddressId, OrderId, OrderRole, OrderStatus, PaymentId, PaymentMethod, PaymentStatus,
    ProductId, UserId,
};
use serde::{Deserialize, Serialize};

/// A catalog product with its mutable stock counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub image_url: Option<String>,
    /// Current catalog price in cents.
    pub price_cents: i64,
    pub stock: i32,
}

/// A user as seen by the order pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

/// An entry in a user's saved address book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub id: AddressId,
    pub user_id: UserId,
    pub title: Option<String>,
    pub full_address: String,
    pub city: String,
    pub district: String,
    pub postal_code: String,
    pub recipient_name: String,
    pub phone_number: String,
}

/// Delivery address embedded in an order row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddressRecord {
    pub full_address: String,
    pub city: String,
    pub district: String,
    pub postal_code: String,
    pub recipient_name: String,
    pub phone_number: String,
    pub title: Option<String>,
    pub email: Option<String>,
}

/// A line of an order, with the product name and image captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemRecord {
    pub product_id: ProductId,
    pub product_name: String,
    pub image_url: Option<String>,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

/// The payment row linked 1:1 to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order row together with its items and payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub role: OrderRole,
    pub guest_email: Option<String>,
    pub address: DeliveryAddressRecord,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub notes: Option<String>,
    pub items: Vec<OrderItemRecord>,
    pub payment: Option<PaymentRecord>,
    /// Owning user, joined on read. Ignored on insert.
    pub customer: Option<UserRecord>,
}
