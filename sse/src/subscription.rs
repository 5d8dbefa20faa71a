use events::Event;
use log::*;
use std::fmt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// Unique identifier for a subscription (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a non-blocking push was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The queue is at capacity; the consumer is too slow.
    Full,
    /// The queue was closed, or its consumer is gone.
    Closed,
}

/// Creates a bounded subscription queue.
///
/// The producer half may be cloned (coordinator and replay task both write to
/// it); the consumer half is owned by the connection. Either side may close it.
pub fn queue(capacity: usize) -> (Outbox, Inbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let closed = CancellationToken::new();
    (
        Outbox {
            tx,
            closed: closed.clone(),
        },
        Inbox { rx, closed },
    )
}

/// Producer side of a subscription queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Event>,
    closed: CancellationToken,
}

impl Outbox {
    /// Enqueues without waiting. Never panics, even after close.
    pub fn try_push(&self, event: Event) -> Result<(), PushError> {
        if self.closed.is_cancelled() {
            return Err(PushError::Closed);
        }
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => PushError::Full,
            TrySendError::Closed(_) => PushError::Closed,
        })
    }

    /// Closes the queue for every holder. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Resolves once the queue has been closed from either side.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }
}

/// Consumer side of a subscription queue.
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::Receiver<Event>,
    closed: CancellationToken,
}

impl Inbox {
    /// Waits for the next event. Returns `None` once the queue is closed,
    /// without yielding anything still buffered.
    ///
    /// Cancel safe, so it can be used as a `tokio::select!` branch.
    pub async fn recv(&mut self) -> Option<Event> {
        if self.closed.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            event = self.rx.recv() => event,
        }
    }

    pub fn close(&mut self) {
        self.closed.cancel();
        self.rx.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Request to drop a subscription from its channel's subscriber set.
#[derive(Debug, Clone)]
pub(crate) struct Removal {
    pub(crate) channel: String,
    pub(crate) id: SubscriptionId,
}

/// Sends a removal request without waiting on the coordinator.
///
/// The mailbox is short; when it is momentarily full the request is handed to
/// a spawned task instead, and if no runtime is around the next publish to the
/// channel notices the closed queue and prunes it anyway.
pub(crate) fn request_removal(removals: &mpsc::Sender<Removal>, removal: Removal) {
    match removals.try_send(removal) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(removal)) => match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let removals = removals.clone();
                handle.spawn(async move {
                    let _ = removals.send(removal).await;
                });
            }
            Err(_) => debug!(
                "Removal mailbox full, subscription {} will be pruned on next publish",
                removal.id
            ),
        },
    }
}

/// A connected client's membership in one channel.
///
/// Dropping a subscription closes its queue and asks the coordinator to
/// forget it, which is how a disconnected client is cleaned up.
pub struct Subscription {
    id: SubscriptionId,
    channel: String,
    last_event_id: String,
    inbox: Inbox,
    removals: mpsc::Sender<Removal>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        channel: String,
        last_event_id: String,
        inbox: Inbox,
        removals: mpsc::Sender<Removal>,
    ) -> Self {
        Self {
            id,
            channel,
            last_event_id,
            inbox,
            removals,
        }
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn last_event_id(&self) -> &str {
        &self.last_event_id
    }

    /// Next event for this subscriber, or `None` once it has been closed by
    /// eviction, shutdown or unsubscribe.
    pub async fn recv(&mut self) -> Option<Event> {
        self.inbox.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }

    pub(crate) fn close(&mut self) {
        self.inbox.close();
    }

    // Eviction, shutdown and unsubscribe all close the queue first, so a
    // subscription dropped while still open lost its client mid-stream.
    fn lost_client(&self) -> bool {
        !self.inbox.is_closed()
    }

    pub(crate) fn removal(&self) -> Removal {
        Removal {
            channel: self.channel.clone(),
            id: self.id.clone(),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("last_event_id", &self.last_event_id)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.lost_client() {
            warn!(
                "Subscription {} on channel {} stopped receiving, the client connection is gone",
                self.id, self.channel
            );
        }
        self.inbox.close();
        request_removal(&self.removals, self.removal());
    }
}
