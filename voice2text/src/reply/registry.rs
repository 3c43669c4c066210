//! Reply records keyed by reply message.

use super::record::ReplyRecord;
use crate::events::MessageRef;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// A record behind its single-flight gate.
pub type SharedRecord = Arc<Mutex<ReplyRecord>>;

/// Deleted replies remembered before the oldest is forgotten.
const DELETED_CAPACITY: usize = 4096;

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<MessageRef, SharedRecord>,
    deleted: HashSet<MessageRef>,
    deleted_order: VecDeque<MessageRef>,
}

/// Holds every live [`ReplyRecord`].
///
/// Each record sits behind its own async mutex: holding the guard is the
/// critical section for that reply. Recently deleted replies are remembered
/// so that late events cannot bring them back.
#[derive(Debug)]
pub struct ReplyRegistry {
    inner: RwLock<Inner>,
    deleted_capacity: usize,
}

impl Default for ReplyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_deleted_capacity(DELETED_CAPACITY)
    }

    /// Create an empty registry remembering at most `capacity` deletions.
    #[must_use]
    pub fn with_deleted_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            deleted_capacity: capacity.max(1),
        }
    }

    /// Register `record`. When one already exists for the same reply, the
    /// existing record is returned and `record` is discarded. Deleted
    /// replies are never registered again.
    pub async fn insert(&self, record: ReplyRecord) -> Option<SharedRecord> {
        let key = record.reply().clone();
        let mut inner = self.inner.write().await;
        if inner.deleted.contains(&key) {
            debug!(reply = %key, "not registering deleted reply");
            return None;
        }
        let shared = inner
            .records
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(record)));
        Some(Arc::clone(shared))
    }

    /// Look up the record for `reply`.
    pub async fn get(&self, reply: &MessageRef) -> Option<SharedRecord> {
        self.inner.read().await.records.get(reply).cloned()
    }

    /// Forget `reply` for good.
    pub async fn remove(&self, reply: &MessageRef) {
        let mut inner = self.inner.write().await;
        inner.records.remove(reply);
        if inner.deleted.insert(reply.clone()) {
            inner.deleted_order.push_back(reply.clone());
        }
        while inner.deleted_order.len() > self.deleted_capacity {
            if let Some(oldest) = inner.deleted_order.pop_front() {
                inner.deleted.remove(&oldest);
            }
        }
    }

    /// Drop the record for `reply` without marking it deleted. A later
    /// reaction adopts the reply again.
    pub async fn evict(&self, reply: &MessageRef) -> bool {
        self.inner.write().await.records.remove(reply).is_some()
    }

    /// Whether `reply` was deleted.
    pub async fn is_deleted(&self, reply: &MessageRef) -> bool {
        self.inner.read().await.deleted.contains(reply)
    }

    /// Number of live records.
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Whether no records are live.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }
}
