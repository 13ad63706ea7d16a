//! Domain error types.

use store::StoreError;
use thiserror::Error;

use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A business rule rejected the operation.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl DomainError {
    /// Returns the order error, if this is one.
    pub fn as_order_error(&self) -> Option<&OrderError> {
        match self {
            DomainError::Order(e) => Some(e),
            DomainError::Store(_) => None,
        }
    }

    /// Short, stable label used for the failure metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            DomainError::Order(e) => e.reason(),
            DomainError::Store(_) => "store",
        }
    }
}
