//! Dispatch error types.

use thiserror::Error;

/// Errors raised by the side-effect collaborators.
///
/// They are logged and counted by the dispatcher and never reach the order
/// that triggered them.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The notification module refused or failed a message.
    #[error("Notification failed: {0}")]
    Notification(String),

    /// The search index refused or failed an update.
    #[error("Indexing failed: {0}")]
    Indexing(String),

    /// The order has nobody to notify.
    #[error("No recipient for order {0}")]
    NoRecipient(String),
}

/// Convenience type alias for dispatch results.
pub type Result<T> = std::result::Result<T, DispatchError>;
