//! Connection state owned by the adapter.
//!
//! Only the adapter writes here; handlers and the viewer socket read snapshots.

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Lifecycle of the engine session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    AwaitingPairing,
    Connected,
}

/// Public view of the session, as served on `/api/whatsapp/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub number: Option<String>,
}

#[derive(Debug, Default)]
struct SessionState {
    connected: bool,
    owner: Option<String>,
    /// Rendered pairing code (data URL), present only while awaiting a scan
    pairing: Option<String>,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    state: RwLock<SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn status(&self) -> ConnectionStatus {
        let state = self.state.read().await;
        ConnectionStatus {
            connected: state.connected,
            number: state.owner.clone(),
        }
    }

    pub async fn link_state(&self) -> LinkState {
        let state = self.state.read().await;
        if state.connected {
            LinkState::Connected
        } else if state.pairing.is_some() {
            LinkState::AwaitingPairing
        } else {
            LinkState::Disconnected
        }
    }

    /// Owner number, only while connected
    pub async fn owner(&self) -> Option<String> {
        self.state.read().await.owner.clone()
    }

    pub async fn pairing_artifact(&self) -> Option<String> {
        self.state.read().await.pairing.clone()
    }

    pub(crate) async fn set_pairing(&self, artifact: String) {
        let mut state = self.state.write().await;
        state.connected = false;
        state.owner = None;
        state.pairing = Some(artifact);
    }

    pub(crate) async fn set_connected(&self, owner: String) {
        let mut state = self.state.write().await;
        state.connected = true;
        state.owner = Some(owner);
        state.pairing = None;
    }

    pub(crate) async fn reset(&self) {
        *self.state.write().await = SessionState::default();
    }
}
