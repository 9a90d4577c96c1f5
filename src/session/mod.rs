//! C4 — sessions and the SSE event hub. Generalizes the teacher's
//! `EventBus` (a single `tokio::sync::broadcast` channel fanning out to
//! every `/stream` subscriber) with a bounded replay buffer keyed by a
//! monotone event id, since an MCP-style client reconnecting with
//! `Last-Event-ID` must be able to recover events it missed rather than
//! only ever seeing new ones.

use crate::room::model::Message;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Keep-alive cadence for idle SSE connections (spec.md §4.4).
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// A server-pushed notification. Each variant carries enough to render
/// both the SSE `event:` name and a JSON payload.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Message { message: Message },
    Mention { message: Message },
    Progress { id: String, label: String },
    Shutdown,
}

impl Notification {
    pub fn message(message: &Message) -> Self {
        Notification::Message { message: message.clone() }
    }

    pub fn mention(message: &Message) -> Self {
        Notification::Mention { message: message.clone() }
    }

    pub fn progress(id: &str, label: &str) -> Self {
        Notification::Progress { id: id.to_string(), label: label.to_string() }
    }

    pub fn shutdown() -> Self {
        Notification::Shutdown
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Notification::Message { .. } => "message",
            Notification::Mention { .. } => "mention",
            Notification::Progress { .. } => "progress",
            Notification::Shutdown => "shutdown",
        }
    }
}

/// A notification tagged with its monotone event id and, for
/// agent-targeted pushes (mentions), the agent it is addressed to.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub id: u64,
    pub target: Option<String>,
    pub notification: Notification,
}

/// A connected (or previously connected) client. `agent` is set once a
/// session authenticates as a specific agent, enabling mention routing.
pub struct Session {
    pub id: String,
    pub agent: Option<String>,
    pub protocol_version: String,
}

/// Room-global event hub: one monotone counter, one bounded replay ring,
/// one broadcast channel for live fanout, and a map from session id to
/// the close signal its currently-open connection watches (spec.md §4.4
/// "at most one live connection per session").
pub struct SessionHub {
    sender: broadcast::Sender<StoredEvent>,
    ring: Mutex<VecDeque<StoredEvent>>,
    ring_capacity: usize,
    next_id: AtomicU64,
    next_token: AtomicU64,
    connections: Mutex<HashMap<String, (u64, watch::Sender<bool>)>>,
}

impl SessionHub {
    pub fn new(ring_capacity: usize) -> Self {
        let ring_capacity = ring_capacity.max(256);
        let (sender, _) = broadcast::channel(ring_capacity.max(1024));
        Self {
            sender,
            ring: Mutex::new(VecDeque::with_capacity(ring_capacity)),
            ring_capacity,
            next_id: AtomicU64::new(1),
            next_token: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
        }
    }

    fn store(&self, target: Option<String>, notification: Notification) -> StoredEvent {
        // 63-bit id space: wrapping past i64::MAX would break Last-Event-ID
        // ordering for clients that parse it as a signed integer.
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) & 0x7fff_ffff_ffff_ffff;
        let event = StoredEvent { id, target, notification };
        let mut ring = self.ring.lock().unwrap();
        if ring.len() >= self.ring_capacity {
            ring.pop_front();
        }
        ring.push_back(event.clone());
        event
    }

    /// Broadcasts to every connected session.
    pub async fn publish(&self, notification: Notification) -> StoredEvent {
        let event = self.store(None, notification);
        let _ = self.sender.send(event.clone());
        event
    }

    /// Pushes to sessions bound to the given agent name only (mentions).
    pub async fn publish_to_agent(&self, agent: &str, notification: Notification) -> StoredEvent {
        let event = self.store(Some(agent.to_string()), notification);
        let _ = self.sender.send(event.clone());
        event
    }

    /// Registers an SSE connection for `session_id`, returning its event
    /// receiver, a close watch the generator loop selects on, and a
    /// token identifying this specific connection for `disconnect`.
    /// Opening a new GET for an id already in flight closes the previous
    /// connection: its pending writes have already gone out over the
    /// shared broadcast channel (every subscriber gets every send), and
    /// this call flips its close watch so its generator loop exits on
    /// the next select.
    pub fn connect(&self, session_id: &str) -> (broadcast::Receiver<StoredEvent>, watch::Receiver<bool>, u64) {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let (close_tx, close_rx) = watch::channel(false);
        let mut connections = self.connections.lock().unwrap();
        if let Some((_, previous)) = connections.insert(session_id.to_string(), (token, close_tx)) {
            let _ = previous.send(true);
        }
        (self.sender.subscribe(), close_rx, token)
    }

    /// Tears down the registration for `session_id` if it still belongs
    /// to `token` — a connection already replaced by a newer GET has had
    /// its entry overwritten by `connect`, so this is a no-op for it.
    pub fn disconnect(&self, session_id: &str, token: u64) {
        let mut connections = self.connections.lock().unwrap();
        if connections.get(session_id).map(|(t, _)| *t) == Some(token) {
            connections.remove(session_id);
        }
    }

    /// Closes whatever connection currently owns `session_id`, regardless
    /// of token — used by `DELETE /mcp` to tear a session down on request
    /// rather than waiting for a replacing GET or client disconnect.
    pub fn force_disconnect(&self, session_id: &str) {
        if let Some((_, close_tx)) = self.connections.lock().unwrap().remove(session_id) {
            let _ = close_tx.send(true);
        }
    }

    /// Id the next published event would be assigned, for the SSE
    /// priming event's `Last-Event-ID` hint (spec.md §4.5).
    pub fn next_id_hint(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst) & 0x7fff_ffff_ffff_ffff
    }

    /// Events with id strictly greater than `last_event_id`, oldest first.
    /// Returns fewer than requested if the ring has already evicted some —
    /// callers should treat a large gap as "replay incomplete".
    pub fn replay_since(&self, last_event_id: u64) -> Vec<StoredEvent> {
        self.ring
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.id > last_event_id)
            .cloned()
            .collect()
    }

    pub fn oldest_buffered_id(&self) -> Option<u64> {
        self.ring.lock().unwrap().front().map(|e| e.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_assigns_monotone_ids() {
        let hub = SessionHub::new(256);
        let a = hub.publish(Notification::progress("t1", "added")).await;
        let b = hub.publish(Notification::progress("t2", "added")).await;
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn replay_returns_only_newer_events() {
        let hub = SessionHub::new(256);
        let a = hub.publish(Notification::progress("t1", "added")).await;
        let b = hub.publish(Notification::progress("t2", "added")).await;
        let replay = hub.replay_since(a.id);
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].id, b.id);
    }

    #[tokio::test]
    async fn ring_buffer_evicts_oldest_beyond_capacity() {
        let hub = SessionHub::new(256);
        for i in 0..300 {
            hub.publish(Notification::progress(&i.to_string(), "added")).await;
        }
        assert_eq!(hub.oldest_buffered_id(), Some(45));
    }

    #[test]
    fn connect_replaces_the_existing_session_connection() {
        let hub = SessionHub::new(256);
        let (_rx1, mut close1, token1) = hub.connect("s1");
        assert!(!*close1.borrow());

        let (_rx2, close2, token2) = hub.connect("s1");
        assert_ne!(token1, token2);
        assert!(*close1.borrow_and_update(), "reconnecting the same session id must close the old one");
        assert!(!*close2.borrow());

        // A stale disconnect from the replaced connection must not evict
        // the new one.
        hub.disconnect("s1", token1);
        assert!(hub.connections.lock().unwrap().contains_key("s1"));

        hub.disconnect("s1", token2);
        assert!(!hub.connections.lock().unwrap().contains_key("s1"));
    }
}
