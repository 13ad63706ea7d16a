//! Value objects for the order domain.

use common::ProductId;
use serde::{Deserialize, Serialize};
use store::{AddressRecord, DeliveryAddressRecord, OrderItemRecord};

/// Money amount represented in cents to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the dollar portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents * quantity as i64,
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents + rhs.cents,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents += rhs.cents;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// Delivery address copied by value into an order.
///
/// Later edits to a saved address never reach orders already placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
    pub full_address: String,
    pub city: String,
    pub district: String,
    pub postal_code: String,
    pub recipient_name: String,
    pub phone_number: String,
    pub title: Option<String>,
    /// Contact email, set for guest deliveries.
    pub email: Option<String>,
}

impl From<&AddressRecord> for DeliveryAddress {
    fn from(saved: &AddressRecord) -> Self {
        Self {
            full_address: saved.full_address.clone(),
            city: saved.city.clone(),
            district: saved.district.clone(),
            postal_code: saved.postal_code.clone(),
            recipient_name: saved.recipient_name.clone(),
            phone_number: saved.phone_number.clone(),
            title: saved.title.clone(),
            email: None,
        }
    }
}

impl From<DeliveryAddressRecord> for DeliveryAddress {
    fn from(r: DeliveryAddressRecord) -> Self {
        Self {
            full_address: r.full_address,
            city: r.city,
            district: r.district,
            postal_code: r.postal_code,
            recipient_name: r.recipient_name,
            phone_number: r.phone_number,
            title: r.title,
            email: r.email,
        }
    }
}

impl From<&DeliveryAddress> for DeliveryAddressRecord {
    fn from(a: &DeliveryAddress) -> Self {
        Self {
            full_address: a.full_address.clone(),
            city: a.city.clone(),
            district: a.district.clone(),
            postal_code: a.postal_code.clone(),
            recipient_name: a.recipient_name.clone(),
            phone_number: a.phone_number.clone(),
            title: a.title.clone(),
            email: a.email.clone(),
        }
    }
}

/// A line of an order.
///
/// The unit price is the catalog price at checkout and is never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub image_url: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItem {
    /// Returns the total price for this item (quantity * unit_price).
    pub fn subtotal(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

impl From<OrderItemRecord> for OrderItem {
    fn from(r: OrderItemRecord) -> Self {
        Self {
            product_id: r.product_id,
            product_name: r.product_name,
            image_url: r.image_url,
            quantity: r.quantity.max(0) as u32,
            unit_price: Money::from_cents(r.unit_price_cents),
        }
    }
}

impl From<&OrderItem> for OrderItemRecord {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            image_url: item.image_url.clone(),
            quantity: item.quantity as i32,
            unit_price_cents: item.unit_price.cents(),
        }
    }
}
