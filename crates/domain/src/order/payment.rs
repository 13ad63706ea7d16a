//! Payment stub linked 1:1 to an order.

use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId, PaymentMethod, PaymentStatus};
use serde::{Deserialize, Serialize};
use store::PaymentRecord;

use super::Money;

/// The payment record created at checkout.
///
/// Settlement happens in the external payment module, which later moves the
/// status out of `Pending`. The order pipeline only ever creates the stub and,
/// on cancellation, flags a settled payment as refunded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates the pending payment stub for an order total.
    pub fn pending_for(order_id: OrderId, amount: Money, method: PaymentMethod) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            order_id,
            amount,
            method,
            status: PaymentStatus::Pending,
            transaction_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The status this payment takes when its order is cancelled, if any.
    ///
    /// Only a settled payment changes: it is flagged as refunded. Moving the
    /// money back is up to the payment module.
    pub fn status_on_cancel(&self) -> Option<PaymentStatus> {
        match self.status {
            PaymentStatus::Success => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

impl From<PaymentRecord> for Payment {
    fn from(r: PaymentRecord) -> Self {
        Self {
            id: r.id,
            order_id: r.order_id,
            amount: Money::from_cents(r.amount_cents),
            method: r.method,
            status: r.status,
            transaction_id: r.transaction_id,
            error_message: r.error_message,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

impl From<&Payment> for PaymentRecord {
    fn from(p: &Payment) -> Self {
        Self {
            id: p.id,
            order_id: p.order_id,
            amount_cents: p.amount.cents(),
            method: p.method,
            status: p.status,
            transaction_id: p.transaction_id.clone(),
            error_message: p.error_message.clone(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}
