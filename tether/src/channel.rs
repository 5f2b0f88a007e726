//! Bidirectional message channels
//!
//! A channel endpoint posts JSON payloads to its peer and delivers the
//! payloads its peer posts to every registered listener. Delivery is FIFO per
//! direction and asynchronous: a payload is never handed to listeners from
//! inside `post`.

use crate::error::{Result, TetherError};
use parking_lot::Mutex;
use serde_json::Value as Json;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Callback receiving every payload that arrives on an endpoint
pub type Listener = Arc<dyn Fn(&Json) + Send + Sync>;

/// Identity of a channel endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub Uuid);

impl ChannelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch:{}", &self.0.to_string()[..8])
    }
}

/// Registration handle returned by [`Channel::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl ListenerId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// One endpoint of a message channel
pub trait Channel: Send + Sync {
    fn id(&self) -> ChannelId;

    /// Queue a payload for the peer
    fn post(&self, message: Json) -> Result<()>;

    /// Listeners fed by this endpoint
    ///
    /// The set may outlive the endpoint for as long as payloads can still be
    /// delivered to it.
    fn listeners(&self) -> &Arc<ListenerSet>;

    fn add_listener(&self, listener: Listener) -> ListenerId {
        self.listeners().add(listener)
    }

    /// Returns false if the listener was not registered
    fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners().remove(id)
    }
}

/// Listener bookkeeping for channel implementations
///
/// Listeners are notified in registration order. Notification works on a
/// snapshot, so a listener may add or remove listeners while it runs.
#[derive(Default)]
pub struct ListenerSet {
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Listener) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.lock().push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    pub fn notify(&self, message: &Json) {
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(message);
        }
    }
}

/// In-process channel endpoint
///
/// Created in pairs. Each direction is an unbounded queue drained by a pump
/// task on the tokio runtime that was current when the pair was made.
pub struct LocalChannel {
    id: ChannelId,
    outbound: mpsc::UnboundedSender<Json>,
    inbound: Arc<ListenerSet>,
}

impl LocalChannel {
    /// Create two connected endpoints
    ///
    /// Fails with [`TetherError::NoRuntime`] outside a tokio runtime.
    pub fn pair() -> Result<(LocalChannel, LocalChannel)> {
        let runtime = Handle::try_current().map_err(|_| TetherError::NoRuntime)?;

        let left_inbound = Arc::new(ListenerSet::new());
        let right_inbound = Arc::new(ListenerSet::new());
        let (left_tx, left_rx) = mpsc::unbounded_channel();
        let (right_tx, right_rx) = mpsc::unbounded_channel();

        runtime.spawn(pump(left_rx, right_inbound.clone()));
        runtime.spawn(pump(right_rx, left_inbound.clone()));

        let left = LocalChannel {
            id: ChannelId::new(),
            outbound: left_tx,
            inbound: left_inbound,
        };
        let right = LocalChannel {
            id: ChannelId::new(),
            outbound: right_tx,
            inbound: right_inbound,
        };
        Ok((left, right))
    }

    /// Number of listeners registered on this endpoint
    pub fn listener_count(&self) -> usize {
        self.inbound.len()
    }
}

async fn pump(mut rx: mpsc::UnboundedReceiver<Json>, listeners: Arc<ListenerSet>) {
    while let Some(message) = rx.recv().await {
        listeners.notify(&message);
    }
    tracing::trace!("local channel pump finished");
}

impl Channel for LocalChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn post(&self, message: Json) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|_| TetherError::Channel(format!("peer of {} is gone", self.id)))
    }

    fn listeners(&self) -> &Arc<ListenerSet> {
        &self.inbound
    }
}

impl fmt::Debug for LocalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalChannel")
            .field("id", &self.id)
            .field("listeners", &self.inbound.len())
            .finish()
    }
}
