//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{OrderId, OrderRole, OrderStatus, UserId};
use serde::{Deserialize, Serialize};
use store::{OrderRecord, UserRecord};

use crate::Caller;

use super::{DeliveryAddress, Money, OrderError, OrderItem, Payment};

/// The user who placed an order, as shown on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl From<UserRecord> for Customer {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

/// Order aggregate root.
///
/// The header, its items and the linked payment form one consistency
/// boundary. The total is computed once, from the item price snapshots, when
/// the order is assembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: OrderId,
    user_id: Option<UserId>,
    role: OrderRole,
    guest_email: Option<String>,
    address: DeliveryAddress,
    created_at: DateTime<Utc>,
    status: OrderStatus,
    total: Money,
    notes: Option<String>,
    items: Vec<OrderItem>,
    payment: Option<Payment>,
    customer: Option<Customer>,
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    /// Returns the owning user, `None` for guest orders.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn role(&self) -> OrderRole {
        self.role
    }

    pub fn guest_email(&self) -> Option<&str> {
        self.guest_email.as_deref()
    }

    pub fn address(&self) -> &DeliveryAddress {
        &self.address
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn payment(&self) -> Option<&Payment> {
        self.payment.as_ref()
    }

    pub fn customer(&self) -> Option<&Customer> {
        self.customer.as_ref()
    }

    /// Returns true if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Assembly and mutation
impl Order {
    /// Builds a new pending order.
    ///
    /// The role follows the caller: an authenticated caller places a
    /// `Customer` order, anyone else a `Guest` order whose contact email comes
    /// from the delivery address. The total is the sum of the item subtotals.
    ///
    /// Fails with [`OrderError::OrderCreation`] if the total is not positive
    /// or a guest order lacks its contact details. Both indicate a bug
    /// upstream, since validation rejects such requests.
    pub fn assemble(
        id: OrderId,
        caller: &Caller,
        address: DeliveryAddress,
        items: Vec<OrderItem>,
        notes: Option<String>,
    ) -> Result<Self, OrderError> {
        let (role, user_id, guest_email) = match caller.user_id() {
            Some(user_id) => (OrderRole::Customer, Some(user_id), None),
            None => (OrderRole::Guest, None, address.email.clone()),
        };

        if role == OrderRole::Guest {
            let has_email = guest_email.as_deref().is_some_and(|e| !e.trim().is_empty());
            if !has_email || address.recipient_name.trim().is_empty() {
                return Err(OrderError::OrderCreation(
                    "guest order is missing contact email or recipient".to_string(),
                ));
            }
        }

        let total: Money = items.iter().map(OrderItem::subtotal).sum();
        if !total.is_positive() {
            return Err(OrderError::OrderCreation(format!(
                "order total must be positive, got {total}"
            )));
        }

        Ok(Self {
            id,
            user_id,
            role,
            guest_email,
            address,
            created_at: Utc::now(),
            status: OrderStatus::Pending,
            total,
            notes: notes.filter(|n| !n.trim().is_empty()),
            items,
            payment: None,
            customer: None,
        })
    }

    /// Links the payment stub to this order.
    ///
    /// An order carries at most one payment, for exactly its total.
    pub fn attach_payment(&mut self, payment: Payment) -> Result<(), OrderError> {
        if self.payment.is_some() {
            return Err(OrderError::OrderCreation(format!(
                "order {} already has a payment",
                self.id
            )));
        }
        if payment.order_id != self.id || payment.amount != self.total {
            return Err(OrderError::OrderCreation(format!(
                "payment {} does not match order {}",
                payment.id, self.id
            )));
        }
        self.payment = Some(payment);
        Ok(())
    }

    pub(crate) fn set_customer(&mut self, customer: Option<Customer>) {
        self.customer = customer;
    }

    pub(crate) fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
    }

    pub(crate) fn payment_mut(&mut self) -> Option<&mut Payment> {
        self.payment.as_mut()
    }

    /// Converts the aggregate to the row shape the store persists.
    pub fn to_record(&self) -> OrderRecord {
        OrderRecord {
            id: self.id,
            user_id: self.user_id,
            role: self.role,
            guest_email: self.guest_email.clone(),
            address: (&self.address).into(),
            created_at: self.created_at,
            status: self.status,
            total_cents: self.total.cents(),
            notes: self.notes.clone(),
            items: self.items.iter().map(Into::into).collect(),
            payment: self.payment.as_ref().map(Into::into),
            customer: None,
        }
    }
}

impl From<OrderRecord> for Order {
    fn from(r: OrderRecord) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            role: r.role,
            guest_email: r.guest_email,
            address: r.address.into(),
            created_at: r.created_at,
            status: r.status,
            total: Money::from_cents(r.total_cents),
            notes: r.notes,
            items: r.items.into_iter().map(Into::into).collect(),
            payment: r.payment.map(Into::into),
            customer: r.customer.map(Into::into),
        }
    }
}
