//! Tag-filtered notification broker with slow-consumer eviction.
//!
//! Every subscriber owns a bounded channel. `publish` offers the payload to
//! each matching subscriber with `try_send`; a subscriber whose channel is
//! full is force-closed instead of buffered. The subscriber set sits behind
//! one mutex whose critical sections only insert, remove, or iterate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use rickybot_types::session::SessionId;

type SubscriberMap = Arc<Mutex<HashMap<u64, SubscriberEntry>>>;

struct SubscriberEntry {
    tag: SessionId,
    tx: mpsc::Sender<Bytes>,
    /// Fired to force-close a subscriber that cannot keep up.
    evict: CancellationToken,
}

/// Fans out payloads to live subscribers by session tag.
pub struct NotificationBroker {
    subscribers: SubscriberMap,
    next_id: AtomicU64,
    buffer: usize,
    shutdown: CancellationToken,
}

impl NotificationBroker {
    /// Create a broker whose subscribers buffer up to `buffer` messages.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register a subscriber interested in `tag`.
    ///
    /// The subscriber is visible to `publish` as soon as this returns and
    /// stays registered until the returned [`Subscription`] is dropped.
    pub fn subscribe(&self, tag: SessionId) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        let evict = CancellationToken::new();

        self.lock().insert(
            id,
            SubscriberEntry {
                tag,
                tx,
                evict: evict.clone(),
            },
        );
        debug!(subscriber_id = id, session_id = %tag, "Subscriber registered");

        Subscription {
            id,
            tag,
            rx,
            evict,
            shutdown: self.shutdown.clone(),
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    /// Offer `payload` to every live subscriber registered under `tag`.
    ///
    /// Never waits. Returns the number of subscribers that accepted it.
    pub fn publish(&self, tag: &SessionId, payload: Bytes) -> usize {
        let subscribers = self.lock();
        let mut delivered = 0;

        for (id, entry) in subscribers.iter() {
            if entry.tag != *tag || entry.evict.is_cancelled() {
                continue;
            }
            match entry.tx.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber_id = *id, session_id = %tag, "Subscriber too slow, closing");
                    entry.evict.cancel();
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Ask every delivery loop to close with a going-away status.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, SubscriberEntry>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for NotificationBroker {
    fn default() -> Self {
        Self::new(16)
    }
}

impl std::fmt::Debug for NotificationBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBroker")
            .field("subscribers", &self.subscriber_count())
            .field("buffer", &self.buffer)
            .finish()
    }
}

/// One registered subscriber. Removes itself from the broker on drop.
pub struct Subscription {
    id: u64,
    tag: SessionId,
    rx: mpsc::Receiver<Bytes>,
    evict: CancellationToken,
    shutdown: CancellationToken,
    subscribers: SubscriberMap,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn tag(&self) -> SessionId {
        self.tag
    }

    /// Next queued payload. Pending until one arrives.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Fired when the broker evicts this subscriber.
    pub fn evicted(&self) -> &CancellationToken {
        &self.evict
    }

    /// Fired when the broker shuts down.
    pub fn broker_shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let removed = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id)
            .is_some();
        if removed {
            debug!(subscriber_id = self.id, session_id = %self.tag, "Subscriber removed");
        }
    }
}
