use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use shared::{
    domain::{PsuState, SessionId},
    protocol::PluginMessage,
};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Fans state changes out to every connected session.
///
/// Each session owns a receiver of one shared channel, so it sees messages
/// in send order. A session that falls behind skips ahead to the oldest
/// retained message rather than receiving anything out of order.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<PluginMessage>,
    sessions: Arc<Mutex<HashSet<SessionId>>>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            sessions: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn on_state_change(&self, state: PsuState) {
        match self.tx.send(PluginMessage::state(state)) {
            Ok(receivers) => trace!(receivers, "psu state broadcast"),
            Err(_) => trace!("no sessions connected"),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let session_id = SessionId::new();
        let rx = self.tx.subscribe();
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id);
        debug!(%session_id, "session subscribed");
        Subscription {
            session_id,
            rx,
            sessions: self.sessions.clone(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

pub struct Subscription {
    session_id: SessionId,
    rx: broadcast::Receiver<PluginMessage>,
    sessions: Arc<Mutex<HashSet<SessionId>>>,
}

impl Subscription {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Next message for this session, or `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<PluginMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(session_id = %self.session_id, skipped, "session lagged behind psu updates");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.session_id);
        debug!(session_id = %self.session_id, "session unsubscribed");
    }
}

#[cfg(test)]
#[path = "tests/broadcast_tests.rs"]
mod tests;
