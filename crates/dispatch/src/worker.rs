//! Background worker pool for order side effects.
//!
//! Committed order events are queued on a bounded channel and handled by a
//! fixed set of workers. Publishing never blocks the caller: when the queue
//! is full the event is dropped and counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use common::OrderStatus;
use domain::{EventPublisher, OrderEvent};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;

use crate::indexer::SearchIndexer;
use crate::notifier::Notifier;

/// Sizing of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Number of worker tasks.
    pub workers: usize,
    /// Events that may wait in the queue before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<OrderEvent>>>;

/// Runs notifications and index updates off the request path.
///
/// Implements [`EventPublisher`] so it can be handed straight to
/// `OrderService::with_publisher`.
pub struct Dispatcher {
    sender: RwLock<Option<mpsc::Sender<OrderEvent>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl Dispatcher {
    /// Spawns the workers on the current runtime.
    pub fn start(
        config: DispatcherConfig,
        notifier: Arc<dyn Notifier>,
        indexer: Arc<dyn SearchIndexer>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver: SharedReceiver = Arc::new(Mutex::new(receiver));

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                let worker_loop = Worker {
                    id: worker,
                    notifier: Arc::clone(&notifier),
                    indexer: Arc::clone(&indexer),
                };
                tokio::spawn(worker_loop.run(Arc::clone(&receiver)))
            })
            .collect();

        tracing::info!(
            workers = config.workers.max(1),
            queue_capacity = config.queue_capacity.max(1),
            "dispatcher started"
        );

        Self {
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(workers),
            dropped: AtomicU64::new(0),
        }
    }

    /// Number of events dropped because the queue was full or closed.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Closes the queue and waits for the workers to drain it.
    ///
    /// Events published after this call are dropped.
    pub async fn shutdown(&self) {
        drop(self.sender.write().await.take());

        let handles = std::mem::take(&mut *self.workers.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "dispatch worker panicked");
            }
        }
        tracing::info!("dispatcher stopped");
    }

    fn drop_event(&self, event: &OrderEvent, cause: &'static str) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("dispatch_dropped_total", "cause" => cause).increment(1);
        tracing::warn!(
            order_id = %event.order().id(),
            kind = event.kind(),
            cause,
            "order event dropped"
        );
    }
}

impl EventPublisher for Dispatcher {
    fn publish(&self, event: OrderEvent) {
        // `try_read` keeps publish synchronous; it only fails while shutdown
        // holds the write lock, and the queue is closing then anyway.
        let Ok(guard) = self.sender.try_read() else {
            self.drop_event(&event, "closed");
            return;
        };
        let Some(sender) = guard.as_ref() else {
            self.drop_event(&event, "closed");
            return;
        };

        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => self.drop_event(&event, "full"),
            Err(TrySendError::Closed(event)) => self.drop_event(&event, "closed"),
        }
    }
}

struct Worker {
    id: usize,
    notifier: Arc<dyn Notifier>,
    indexer: Arc<dyn SearchIndexer>,
}

impl Worker {
    async fn run(self, receiver: SharedReceiver) {
        tracing::debug!(worker = self.id, "dispatch worker started");

        loop {
            // The receiver lock is released before the event is handled.
            let next = receiver.lock().await.recv().await;
            let Some(event) = next else { break };
            self.handle(event).await;
        }

        tracing::debug!(worker = self.id, "dispatch worker stopping");
    }

    #[tracing::instrument(skip(self, event), fields(worker = self.id, order_id = %event.order().id(), kind = event.kind()))]
    async fn handle(&self, event: OrderEvent) {
        metrics::counter!("dispatch_events_total", "kind" => event.kind()).increment(1);

        match &event {
            OrderEvent::Placed(order) => {
                if let Err(e) = self.indexer.index_order(order).await {
                    Self::failed("index", &e);
                }
                if let Err(e) = self.notifier.send_order_confirmation(order).await {
                    Self::failed("notify", &e);
                }
            }
            OrderEvent::StatusChanged { order, .. } => {
                let indexed = if order.status() == OrderStatus::Cancelled {
                    self.indexer.remove_order(order.id()).await
                } else {
                    self.indexer.index_order(order).await
                };
                if let Err(e) = indexed {
                    Self::failed("index", &e);
                }
                if let Err(e) = self.notifier.send_status_update(order, order.status()).await {
                    Self::failed("notify", &e);
                }
            }
        }
    }

    fn failed(target: &'static str, error: &crate::DispatchError) {
        metrics::counter!("dispatch_failures_total", "target" => target).increment(1);
        tracing::error!(target_module = target, error = %error, "order side effect failed");
    }
}
