//! Shared types for the order pipeline.
//!
//! Identifiers and status enums live here so the store and the domain speak
//! the same vocabulary without depending on each other's internals.

mod status;
mod types;

pub use status::{OrderRole, OrderStatus, ParseEnumError, PaymentMethod, PaymentStatus};
pub use types::{AddressId, OrderId, PaymentId, ProductId, UserId};
