//! Registry of live client sessions and the trade-fanout broadcast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

pub type SessionId = u64;

/// Delivers unicast replies and the trade-fanout broadcast to every
/// attached session. Holds send channels rather than the sockets
/// themselves, so `broadcast` can snapshot the sender list and send
/// outside the registry guard — a suspended send on one session never
/// blocks delivery to, or detachment of, any other (§5).
///
/// Cheap to clone; every clone shares the same session registry.
#[derive(Clone)]
pub struct SessionBroker {
    sessions: Arc<RwLock<HashMap<SessionId, mpsc::UnboundedSender<String>>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for SessionBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBroker {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Registers a new session and returns its id plus the receiving half
    /// of its outbound channel, which the caller drives alongside its
    /// socket's own send/receive loop.
    pub async fn attach(&self) -> (SessionId, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.write().await.insert(id, tx);
        (id, rx)
    }

    /// Removes a session on disconnect or send failure. A no-op if the
    /// session was already detached.
    pub async fn detach(&self, id: SessionId) {
        self.sessions.write().await.remove(&id);
    }

    /// Sends `message` to every attached session, including `message`'s
    /// own originating session if still attached. Sessions whose channel
    /// has closed are detached after the sweep, never mid-send.
    pub async fn broadcast(&self, message: String) {
        let senders: Vec<(SessionId, mpsc::UnboundedSender<String>)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut dead = Vec::new();
        for (id, tx) in senders {
            if tx.send(message.clone()).is_err() {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut sessions = self.sessions.write().await;
            for id in dead {
                sessions.remove(&id);
            }
        }
    }

    #[cfg(test)]
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
