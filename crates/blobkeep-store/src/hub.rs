//! In-process notification of newly stored blobs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use blobkeep_types::BlobRef;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Handle returned by [`BlobHub::register_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Fans out blob refs to registered listener channels.
///
/// The hub only keeps a sender; the receiving half stays with the caller.
/// Delivery never waits: a listener whose channel is full misses the
/// notification (logged at `warn`), and a listener whose receiver was
/// dropped is forgotten on the next [`notify`](Self::notify).
pub struct BlobHub {
    listeners: RwLock<HashMap<ListenerId, mpsc::Sender<BlobRef>>>,
    next_id: AtomicU64,
}

impl BlobHub {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start delivering refs to `sender`.
    pub fn register_listener(&self, sender: mpsc::Sender<BlobRef>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .expect("hub lock poisoned")
            .insert(id, sender);
        debug!(listener = id.0, "registered blob listener");
        id
    }

    /// Stop delivering to a listener. Returns `false` if it was unknown.
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.listeners
            .write()
            .expect("hub lock poisoned")
            .remove(&id)
            .is_some()
    }

    /// Deliver `blob_ref` to every listener; returns how many accepted it.
    pub fn notify(&self, blob_ref: &BlobRef) -> usize {
        let mut listeners = self.listeners.write().expect("hub lock poisoned");
        let mut delivered = 0;
        listeners.retain(|id, sender| match sender.try_send(*blob_ref) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(listener = id.0, blob = %blob_ref, "listener full, dropping notification");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(listener = id.0, "pruning closed blob listener");
                false
            }
        });
        delivered
    }

    /// Number of registered listeners, including ones not yet pruned.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().expect("hub lock poisoned").len()
    }
}

impl Default for BlobHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BlobHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobHub")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobkeep_crypto::hash_bytes;

    #[tokio::test]
    async fn delivers_to_every_listener() {
        let hub = BlobHub::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        hub.register_listener(tx1);
        hub.register_listener(tx2);

        let r = hash_bytes(b"one");
        assert_eq!(hub.notify(&r), 2);
        assert_eq!(rx1.recv().await, Some(r));
        assert_eq!(rx2.recv().await, Some(r));
    }

    #[tokio::test]
    async fn per_listener_order_is_preserved() {
        let hub = BlobHub::new();
        let (tx, mut rx) = mpsc::channel(8);
        hub.register_listener(tx);

        let refs: Vec<_> = (0u8..5).map(|i| hash_bytes(&[i])).collect();
        for r in &refs {
            hub.notify(r);
        }
        for r in &refs {
            assert_eq!(rx.recv().await.as_ref(), Some(r));
        }
    }

    #[tokio::test]
    async fn full_listener_does_not_block() {
        let hub = BlobHub::new();
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        hub.register_listener(slow_tx);
        hub.register_listener(fast_tx);

        let a = hash_bytes(b"a");
        let b = hash_bytes(b"b");
        assert_eq!(hub.notify(&a), 2);
        // The slow listener is full now; the second ref is dropped for it only.
        assert_eq!(hub.notify(&b), 1);
        assert_eq!(hub.listener_count(), 2);

        assert_eq!(slow_rx.recv().await, Some(a));
        assert!(slow_rx.try_recv().is_err());
        assert_eq!(fast_rx.recv().await, Some(a));
        assert_eq!(fast_rx.recv().await, Some(b));
    }

    #[test]
    fn closed_listener_is_pruned() {
        let hub = BlobHub::new();
        let (tx, rx) = mpsc::channel(1);
        hub.register_listener(tx);
        drop(rx);
        assert_eq!(hub.listener_count(), 1);
        assert_eq!(hub.notify(&hash_bytes(b"x")), 0);
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn unregister() {
        let hub = BlobHub::default();
        let (tx, _rx) = mpsc::channel(1);
        let id = hub.register_listener(tx);
        assert!(hub.unregister_listener(id));
        assert!(!hub.unregister_listener(id));
        assert_eq!(hub.notify(&hash_bytes(b"x")), 0);
    }
}
