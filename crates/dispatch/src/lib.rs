//! Post-commit side effects of the order pipeline.
//!
//! Orders are handed to the notification and search modules after their
//! transaction commits. Failures here are logged and counted; they never
//! undo or fail the order.

pub mod error;
pub mod indexer;
pub mod notifier;
pub mod worker;

pub use error::{DispatchError, Result};
pub use indexer::{InMemorySearchIndex, SearchIndexer, TracingSearchIndex, order_document};
pub use notifier::{InMemoryNotifier, Notification, Notifier, TracingNotifier, recipient_of};
pub use worker::{Dispatcher, DispatcherConfig};
