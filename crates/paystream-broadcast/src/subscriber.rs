use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one listener queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Sending half of a listener's private queue.
///
/// Owned by the consumer together with the receiving half. The hub only ever
/// keeps a weak reference to the sender plus the eviction token, so dropping
/// the `Subscriber` is enough for the hub to forget the listener on its next
/// fan-out. The hub never closes the channel itself.
pub struct Subscriber<T> {
    id: SubscriberId,
    tx: mpsc::Sender<T>,
    eviction: CancellationToken,
}

impl<T> Subscriber<T> {
    /// Allocate a fresh listener queue. `capacity` is clamped to at least 1.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let subscriber = Self {
            id: SubscriberId::next(),
            tx,
            eviction: CancellationToken::new(),
        };
        (subscriber, rx)
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// True once the hub has dropped this listener for not draining its queue.
    pub fn is_evicted(&self) -> bool {
        self.eviction.is_cancelled()
    }

    /// Resolves when the hub evicts this listener.
    pub async fn evicted(&self) {
        self.eviction.cancelled().await
    }

    pub(crate) fn downgrade(&self) -> mpsc::WeakSender<T> {
        self.tx.downgrade()
    }

    pub(crate) fn eviction_token(&self) -> CancellationToken {
        self.eviction.clone()
    }
}

// Manual impl: a clone shares the identity, so registering it again is a no-op.
impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            tx: self.tx.clone(),
            eviction: self.eviction.clone(),
        }
    }
}

impl<T> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("evicted", &self.eviction.is_cancelled())
            .finish()
    }
}
