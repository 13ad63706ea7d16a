//! Search index contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use common::OrderId;
use domain::Order;
use serde_json::{Value, json};

use crate::{DispatchError, Result};

/// Order search index maintained by the search module.
#[async_trait]
pub trait SearchIndexer: Send + Sync {
    /// Adds or refreshes the document of an order.
    async fn index_order(&self, order: &Order) -> Result<()>;

    /// Drops an order from the index.
    async fn remove_order(&self, id: OrderId) -> Result<()>;
}

/// Builds the search document for an order.
pub fn order_document(order: &Order) -> Value {
    json!({
        "id": order.id(),
        "userId": order.user_id(),
        "role": order.role(),
        "status": order.status(),
        "createdAt": order.created_at(),
        "totalCents": order.total().cents(),
        "city": order.address().city,
        "recipientName": order.address().recipient_name,
        "products": order
            .items()
            .iter()
            .map(|item| item.product_name.as_str())
            .collect::<Vec<_>>(),
    })
}

/// Index that logs each update and keeps nothing.
///
/// Stands in for the search module when none is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSearchIndex;

#[async_trait]
impl SearchIndexer for TracingSearchIndex {
    async fn index_order(&self, order: &Order) -> Result<()> {
        let document = order_document(order);
        tracing::debug!(order_id = %order.id(), %document, "order indexed");
        Ok(())
    }

    async fn remove_order(&self, id: OrderId) -> Result<()> {
        tracing::debug!(order_id = %id, "order removed from index");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryIndexState {
    documents: HashMap<OrderId, Value>,
    fail_on_index: bool,
}

/// In-memory search index for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemorySearchIndex {
    state: Arc<Mutex<InMemoryIndexState>>,
}

impl InMemorySearchIndex {
    /// Creates a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the index to fail every update.
    pub fn set_fail_on_index(&self, fail: bool) {
        self.state().fail_on_index = fail;
    }

    /// Returns the indexed document of an order.
    pub fn document(&self, id: OrderId) -> Option<Value> {
        self.state().documents.get(&id).cloned()
    }

    /// Returns the number of indexed orders.
    pub fn len(&self) -> usize {
        self.state().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn state(&self) -> std::sync::MutexGuard<'_, InMemoryIndexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SearchIndexer for InMemorySearchIndex {
    async fn index_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state();
        if state.fail_on_index {
            return Err(DispatchError::Indexing("search index unavailable".to_string()));
        }
        state.documents.insert(order.id(), order_document(order));
        Ok(())
    }

    async fn remove_order(&self, id: OrderId) -> Result<()> {
        let mut state = self.state();
        if state.fail_on_index {
            return Err(DispatchError::Indexing("search index unavailable".to_string()));
        }
        state.documents.remove(&id);
        Ok(())
    }
}
