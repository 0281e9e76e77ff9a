//! Event bus for envelope fan-out
//!
//! Best-effort, in-memory pub/sub using bounded Tokio mpsc queues, one per
//! subscription. Publishing never blocks: a full queue drops the new
//! envelope for that subscriber only.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

use super::envelope::{topic_match, Envelope, EnvelopeFactory, Message, SharedEnvelopeFactory};

/// Queue capacity per subscription
pub const SUBSCRIPTION_CAPACITY: usize = 64;

/// Error type for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,
}

/// Result type for event bus operations
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Receiving end of a subscription. Yields `None` once unsubscribed or closed.
pub type EnvelopeReceiver = mpsc::Receiver<Envelope>;

/// Shared reference to a ChannelBus
pub type SharedBus = Arc<ChannelBus>;

/// Topic-filtered publish/subscribe.
pub trait Bus: Send + Sync {
    /// Register a new bounded queue receiving every envelope whose topic
    /// matches `pattern`.
    fn subscribe(&self, pattern: &str) -> EventBusResult<EnvelopeReceiver>;

    /// Wrap `message` in an envelope and deliver a copy to every matching
    /// subscription. Publishing on a closed bus is a no-op.
    fn publish(&self, topic: &str, message: Message) -> EventBusResult<()>;

    /// Close every subscription registered with exactly `pattern`.
    fn unsubscribe(&self, pattern: &str);

    /// Close every subscription and refuse new ones.
    fn close(&self);
}

struct Subscription {
    pattern: String,
    sender: mpsc::Sender<Envelope>,
}

#[derive(Default)]
struct BusInner {
    subscriptions: Vec<Subscription>,
    closed: bool,
}

/// In-memory bus backed by one bounded channel per subscription
pub struct ChannelBus {
    factory: SharedEnvelopeFactory,
    inner: Mutex<BusInner>,
}

impl ChannelBus {
    /// Create a new bus with its own envelope factory
    pub fn new() -> Self {
        Self::with_factory(EnvelopeFactory::new().shared())
    }

    /// Create a bus that stamps envelopes from a shared factory
    pub fn with_factory(factory: SharedEnvelopeFactory) -> Self {
        Self {
            factory,
            inner: Mutex::new(BusInner::default()),
        }
    }

    /// Create a shared reference to this bus
    pub fn shared(self) -> SharedBus {
        Arc::new(self)
    }

    /// Factory used to stamp published envelopes
    pub fn factory(&self) -> &SharedEnvelopeFactory {
        &self.factory
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.lock()
            .subscriptions
            .iter()
            .filter(|s| !s.sender.is_closed())
            .count()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        // A panicking subscriber cannot leave the list half-updated.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ChannelBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for ChannelBus {
    fn subscribe(&self, pattern: &str) -> EventBusResult<EnvelopeReceiver> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(EventBusError::Closed);
        }
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        inner.subscriptions.push(Subscription {
            pattern: pattern.to_string(),
            sender,
        });
        debug!(pattern, "Subscribed");
        Ok(receiver)
    }

    fn publish(&self, topic: &str, message: Message) -> EventBusResult<()> {
        let mut inner = self.lock();
        if inner.closed {
            debug!(topic, "Publish on closed bus ignored");
            return Ok(());
        }

        let envelope = self.factory.envelope(topic, message);
        let mut delivered = 0usize;
        inner.subscriptions.retain(|sub| {
            if sub.sender.is_closed() {
                return false;
            }
            if !topic_match(&sub.pattern, topic) {
                return true;
            }
            match sub.sender.try_send(envelope.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(
                        topic,
                        pattern = %sub.pattern,
                        seq = envelope.seq,
                        "Subscriber queue full, envelope dropped"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return false,
            }
            true
        });

        debug!(topic, seq = envelope.seq, delivered, "Envelope published");
        Ok(())
    }

    fn unsubscribe(&self, pattern: &str) {
        let mut inner = self.lock();
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|sub| sub.pattern != pattern);
        debug!(
            pattern,
            removed = before - inner.subscriptions.len(),
            "Unsubscribed"
        );
    }

    fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.subscriptions.clear();
    }
}
