//! Protocol adapter: owns the engine connection and turns its events into
//! session transitions, ledger writes and viewer broadcasts.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use wa_link::{Connector, LinkHandle, jid};

use crate::config::LinkConfig;
use crate::error::RelayError;
use crate::metrics::ServerMetrics;
use crate::models::{MessageRecord, OutboundMessage, now_millis};
use crate::repository::ConversationLedger;
use crate::session::SessionStore;
use crate::viewers::ViewerRegistry;
use crate::ws::{Fanout, ServerMessage};

mod inbound;
mod supervisor;

use inbound::EchoFilter;

/// Answer to a number lookup, as served on `/api/whatsapp/check/{number}`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NumberCheck {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
}

/// Shared services the adapter writes to
pub struct AdapterDeps {
    pub session: Arc<SessionStore>,
    pub viewers: Arc<ViewerRegistry>,
    pub ledger: Arc<ConversationLedger>,
    pub fanout: Fanout,
    pub metrics: Arc<ServerMetrics>,
}

struct SupervisorSlot {
    generation: u64,
    cancel: CancellationToken,
}

pub struct ProtocolAdapter {
    connector: Arc<dyn Connector>,
    link_config: LinkConfig,
    credentials_dir: PathBuf,
    session: Arc<SessionStore>,
    viewers: Arc<ViewerRegistry>,
    ledger: Arc<ConversationLedger>,
    fanout: Fanout,
    metrics: Arc<ServerMetrics>,
    /// Live request handle, present only while a session is up
    handle: RwLock<Option<Arc<dyn LinkHandle>>>,
    supervisor: Mutex<Option<SupervisorSlot>>,
    next_generation: AtomicU64,
    echoes: Mutex<EchoFilter>,
}

impl ProtocolAdapter {
    pub fn new(
        connector: Arc<dyn Connector>,
        link_config: LinkConfig,
        credentials_dir: PathBuf,
        deps: AdapterDeps,
    ) -> Self {
        Self {
            connector,
            link_config,
            credentials_dir,
            session: deps.session,
            viewers: deps.viewers,
            ledger: deps.ledger,
            fanout: deps.fanout,
            metrics: deps.metrics,
            handle: RwLock::new(None),
            supervisor: Mutex::new(None),
            next_generation: AtomicU64::new(1),
            echoes: Mutex::new(EchoFilter::default()),
        }
    }

    /// Start the supervisor unless one is already running. Returns whether a new one
    /// was spawned.
    pub async fn start(self: &Arc<Self>) -> bool {
        let mut slot = self.supervisor.lock().await;
        if slot.as_ref().is_some_and(|s| !s.cancel.is_cancelled()) {
            return false;
        }

        let generation = self
            .next_generation
            .fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        *slot = Some(SupervisorSlot {
            generation,
            cancel: cancel.clone(),
        });

        tokio::spawn(self.clone().supervise(cancel, generation));
        true
    }

    /// Stop reconnecting without touching credentials (server shutdown).
    pub async fn stop(&self) {
        if let Some(slot) = self.supervisor.lock().await.take() {
            slot.cancel.cancel();
        }
    }

    pub async fn is_running(&self) -> bool {
        self.supervisor
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.cancel.is_cancelled())
    }

    async fn supervisor_exited(&self, generation: u64) {
        let mut slot = self.supervisor.lock().await;
        if slot.as_ref().is_some_and(|s| s.generation == generation) {
            *slot = None;
        }
    }

    /// Log out and forget the account.
    ///
    /// Local state always ends disconnected with credentials removed, even when the
    /// engine is unreachable or slow. Safe to call repeatedly.
    pub async fn logout(&self) {
        self.stop().await;

        let handle = self.handle.write().await.take();
        if let Some(handle) = handle {
            match tokio::time::timeout(self.link_config.logout_timeout, handle.logout()).await {
                Ok(Ok(())) => info!("Engine logout acknowledged"),
                Ok(Err(e)) => warn!("Engine logout failed, forcing local logout: {}", e),
                Err(_) => warn!(
                    "Engine logout timed out after {:?}, forcing local logout",
                    self.link_config.logout_timeout
                ),
            }
        }

        self.purge_credentials().await;
        self.publish_status().await;
    }

    /// Remove the engine's credential directory and reset the session.
    async fn purge_credentials(&self) {
        match tokio::fs::remove_dir_all(&self.credentials_dir).await {
            Ok(()) => info!("Removed credentials at {}", self.credentials_dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove credentials at {}: {}",
                self.credentials_dir.display(),
                e
            ),
        }
        self.session.reset().await;
    }

    async fn publish_status(&self) {
        self.fanout
            .publish(ServerMessage::Status(self.session.status().await));
    }

    async fn live(&self) -> Result<(Arc<dyn LinkHandle>, String), RelayError> {
        let handle = self
            .handle
            .read()
            .await
            .clone()
            .ok_or(RelayError::NotConnected)?;
        let owner = self.session.owner().await.ok_or(RelayError::NotConnected)?;
        Ok((handle, owner))
    }

    /// Send a text message to a phone number and record it.
    pub async fn send_message(&self, number: &str, text: &str) -> Result<MessageRecord, RelayError> {
        let digits = normalize_number(number)?;
        if text.trim().is_empty() {
            return Err(RelayError::Validation(
                "number and message required".to_string(),
            ));
        }

        let (handle, owner) = self.live().await?;
        let jid = jid::user_jid(&digits);

        self.echoes.lock().await.begin(&jid, text);
        let sent = tokio::time::timeout(self.link_config.send_timeout, handle.send_text(&jid, text))
            .await;
        let sent = match sent {
            Ok(Ok(id)) => Ok(id),
            Ok(Err(e)) => Err(RelayError::Link(e)),
            Err(_) => Err(RelayError::Timeout(self.link_config.send_timeout)),
        };
        self.echoes
            .lock()
            .await
            .finish(&jid, text, sent.as_ref().ok().cloned());
        let message_id = sent?;

        let record = self
            .ledger
            .record_outbound(
                &owner,
                &OutboundMessage {
                    jid: jid.clone(),
                    text: text.to_string(),
                    time: now_millis(),
                },
            )
            .await?;

        info!(jid = %jid, message_id = %message_id, "Message sent");
        self.metrics.message_sent();
        self.fanout.publish(ServerMessage::NewMessage(record.clone()));
        Ok(record)
    }

    /// Ask the engine whether a number has an account.
    pub async fn check_number(&self, number: &str) -> Result<NumberCheck, RelayError> {
        let digits = normalize_number(number)?;
        let (handle, _) = self.live().await?;

        let registration =
            tokio::time::timeout(self.link_config.send_timeout, handle.check_registered(&digits))
                .await
                .map_err(|_| RelayError::Timeout(self.link_config.send_timeout))??;

        Ok(if registration.exists {
            NumberCheck {
                exists: true,
                jid: registration.jid.or_else(|| Some(jid::user_jid(&digits))),
                number: Some(digits),
            }
        } else {
            NumberCheck {
                exists: false,
                jid: None,
                number: None,
            }
        })
    }
}

/// Strip `+`, spaces and dashes; what is left must be digits.
fn normalize_number(number: &str) -> Result<String, RelayError> {
    let digits: String = number
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    if digits.is_empty() {
        return Err(RelayError::Validation(
            "number and message required".to_string(),
        ));
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(RelayError::Validation(format!(
            "invalid phone number: {}",
            number
        )));
    }
    Ok(digits)
}
