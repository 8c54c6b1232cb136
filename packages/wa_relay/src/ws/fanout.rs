//! Broadcast of lifecycle and message events to every connected viewer.
//!
//! Delivery is best-effort: viewers that fall behind the bounded channel skip
//! ahead, and nothing is kept for viewers that are offline.

use tokio::sync::broadcast;
use tracing::debug;

use crate::session::SessionStore;

use super::protocol::ServerMessage;

#[derive(Debug, Clone)]
pub struct Fanout {
    tx: broadcast::Sender<ServerMessage>,
}

impl Fanout {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.tx.subscribe()
    }

    /// Push to all current viewers. Returns how many received it.
    pub fn publish(&self, msg: ServerMessage) -> usize {
        match self.tx.send(msg) {
            Ok(n) => n,
            Err(_) => {
                debug!("No viewers connected, event dropped");
                0
            }
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// What a freshly connected viewer is told first: the current status and,
/// while awaiting a scan, the pairing code.
pub async fn greeting(session: &SessionStore) -> Vec<ServerMessage> {
    let mut messages = vec![ServerMessage::Status(session.status().await)];
    if let Some(qr) = session.pairing_artifact().await {
        messages.push(ServerMessage::Qr { qr });
    }
    messages
}
