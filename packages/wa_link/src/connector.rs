use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::LinkError;
use crate::event::{LinkEvent, MessageKey};

/// Result of asking the engine whether a phone number has an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub exists: bool,
    #[serde(default)]
    pub jid: Option<String>,
}

/// A live engine session: a handle for requests plus the ordered event stream.
///
/// The stream ends after a [`LinkEvent::Closed`] or when the engine goes away.
pub struct LinkSession {
    pub handle: Arc<dyn LinkHandle>,
    pub events: mpsc::Receiver<LinkEvent>,
}

/// Establishes engine sessions from stored credentials
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a session. The engine reads and writes its credential material
    /// under `credentials_dir`; an empty directory means a fresh pairing.
    async fn connect(&self, credentials_dir: &Path) -> Result<LinkSession, LinkError>;
}

/// Requests against a live engine session
#[async_trait]
pub trait LinkHandle: Send + Sync {
    /// Send a text message; resolves once the engine acknowledged dispatch.
    /// Returns the engine's message id.
    async fn send_text(&self, jid: &str, text: &str) -> Result<String, LinkError>;

    /// Log the linked device out on the server side.
    async fn logout(&self) -> Result<(), LinkError>;

    async fn check_registered(&self, number: &str) -> Result<Registration, LinkError>;

    /// Send read receipts for the given messages.
    async fn read_messages(&self, keys: &[MessageKey]) -> Result<(), LinkError>;
}
