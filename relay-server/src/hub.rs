//! In-memory fan-out of live wire lines to every client tailing a session.
//!
//! The hub keeps no history. A subscriber that falls behind loses live lines
//! rather than slowing the publisher; it recovers them from the event log on
//! its next reconnect.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

type Subscribers = HashMap<u64, mpsc::Sender<String>>;

struct HubInner {
    sessions: DashMap<String, Subscribers>,
    next_id: AtomicU64,
    buffer: usize,
}

#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SUBSCRIBER_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                sessions: DashMap::new(),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Register a new live subscription. Dropping the returned value
    /// unregisters it.
    pub fn subscribe(&self, session_key: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.sessions.entry(session_key.to_string()).or_default().insert(id, tx);

        Subscription { hub: Arc::clone(&self.inner), session_key: session_key.to_string(), id, rx }
    }

    /// Offer `line` to every subscriber of the session without waiting.
    ///
    /// Returns how many subscribers accepted it.
    pub fn publish(&self, session_key: &str, line: &str) -> usize {
        let Some(subscribers) = self.inner.sessions.get(session_key) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, tx) in subscribers.iter() {
            match tx.try_send(line.to_string()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(session = %session_key, subscriber = id, "subscriber buffer full, dropping live line");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, session_key: &str) -> usize {
        self.inner.sessions.get(session_key).map_or(0, |s| s.len())
    }

    /// Number of sessions with at least one subscriber.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Drop every live sender so each open tail sees end of stream.
    pub fn close_all(&self) {
        let sessions = self.inner.sessions.len();
        self.inner.sessions.clear();
        tracing::info!(sessions, "closed all live subscriptions");
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("sessions", &self.session_count())
            .field("buffer", &self.inner.buffer)
            .finish()
    }
}

/// One client's live view of a session.
pub struct Subscription {
    hub: Arc<HubInner>,
    session_key: String,
    id: u64,
    rx: mpsc::Receiver<String>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Discard every line currently buffered. Returns how many were dropped.
    pub fn drain(&mut self) -> usize {
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(mut subscribers) = self.hub.sessions.get_mut(&self.session_key) {
            subscribers.remove(&self.id);
        }
        self.hub.sessions.remove_if(&self.session_key, |_, subscribers| subscribers.is_empty());
    }
}
