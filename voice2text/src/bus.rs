//! Async event queue between platform adapters and the router.
//!
//! Adapters publish [`ChatEvent`]s; the gateway is the single consumer and
//! hands each event to the router.

use crate::error::{BusError, BusResult};
use crate::events::ChatEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::trace;

/// Default capacity of the event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Bounded event queue shared by adapters and the gateway.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

struct EventBusInner {
    tx: mpsc::Sender<ChatEvent>,
    rx: Mutex<mpsc::Receiver<ChatEvent>>,
    stats: RwLock<BusStats>,
}

/// Event bus statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BusStats {
    /// Events published by adapters.
    pub published: u64,
    /// Events taken off the queue.
    pub consumed: u64,
}

impl EventBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a bus with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            inner: Arc::new(EventBusInner {
                tx,
                rx: Mutex::new(rx),
                stats: RwLock::new(BusStats::default()),
            }),
        }
    }

    /// Publish an event.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] if the queue has been closed.
    pub async fn publish(&self, event: ChatEvent) -> BusResult<()> {
        trace!(kind = event.kind(), actor = %event.actor_id(), "publishing event");
        self.inner
            .tx
            .send(event)
            .await
            .map_err(|_| BusError::Closed)?;
        self.inner.stats.write().await.published += 1;
        Ok(())
    }

    /// Take the next event, waiting until one arrives.
    pub async fn consume(&self) -> Option<ChatEvent> {
        let event = self.inner.rx.lock().await.recv().await;
        if event.is_some() {
            self.inner.stats.write().await.consumed += 1;
        }
        event
    }

    /// Take the next event, giving up after `timeout`.
    pub async fn consume_timeout(&self, timeout: Duration) -> Option<ChatEvent> {
        tokio::time::timeout(timeout, self.consume())
            .await
            .ok()
            .flatten()
    }

    /// Current statistics.
    pub async fn stats(&self) -> BusStats {
        *self.inner.stats.read().await
    }

    /// Lightweight publishing handle for adapters.
    #[must_use]
    pub fn handle(&self) -> EventHandle {
        EventHandle { bus: self.clone() }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable publishing handle.
#[derive(Debug, Clone)]
pub struct EventHandle {
    bus: EventBus,
}

impl EventHandle {
    /// Publish an event.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] if the queue has been closed.
    pub async fn publish(&self, event: ChatEvent) -> BusResult<()> {
        self.bus.publish(event).await
    }
}
