//! The single task that owns the engine connection.
//!
//! It connects, drains the event stream in order, and on an unexpected close waits
//! out a bounded exponential backoff before connecting again. A logout (remote or
//! local) ends it for good.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wa_link::{CloseReason, LinkEvent, LinkSession, UpsertKind, WireMessage, jid};

use crate::config::BackoffConfig;
use crate::qr;
use crate::ws::ServerMessage;

use super::ProtocolAdapter;
use super::inbound::{Classified, classify};

/// Reconnect delay schedule: doubles from `initial` up to `max`, reset after an open.
#[derive(Debug)]
pub(crate) struct Backoff {
    config: BackoffConfig,
    next: Duration,
}

impl Backoff {
    pub(crate) fn new(config: BackoffConfig) -> Self {
        let next = config.initial;
        Self { config, next }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.config.max);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.next = self.config.initial;
    }
}

/// Up to 10% extra so several relays do not hammer the engine in lockstep
fn jittered(delay: Duration) -> Duration {
    let spread = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX) / 10;
    if spread == 0 {
        return delay;
    }
    delay.saturating_add(Duration::from_millis(rand::rng().random_range(0..=spread)))
}

/// Why a session's event loop returned
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Cancelled,
    LoggedOut,
    Lost,
}

impl ProtocolAdapter {
    pub(super) async fn supervise(self: Arc<Self>, cancel: CancellationToken, generation: u64) {
        let mut backoff = Backoff::new(self.link_config.reconnect.clone());
        info!("Engine supervisor started ({})", self.link_config.bridge_url);

        loop {
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.connector.connect(&self.credentials_dir) => res,
            };

            let end = match connected {
                Ok(LinkSession { handle, mut events }) => {
                    debug!("Engine session established");
                    *self.handle.write().await = Some(handle);
                    let end = self.pump(&mut events, &cancel, &mut backoff).await;
                    if !cancel.is_cancelled() {
                        *self.handle.write().await = None;
                    }
                    end
                }
                Err(e) => {
                    warn!("Engine connect failed: {}", e);
                    SessionEnd::Lost
                }
            };

            match end {
                SessionEnd::Cancelled => break,
                SessionEnd::LoggedOut => {
                    info!("Engine reported logout, purging credentials");
                    self.purge_credentials().await;
                    break;
                }
                SessionEnd::Lost => {
                    let delay = jittered(backoff.next_delay());
                    self.metrics.reconnect_attempted();
                    info!("Reconnecting to engine in {:?}", delay);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.supervisor_exited(generation).await;
        info!("Engine supervisor stopped");
    }

    /// Drain one session's events until it closes or the supervisor is cancelled.
    async fn pump(
        &self,
        events: &mut mpsc::Receiver<LinkEvent>,
        cancel: &CancellationToken,
        backoff: &mut Backoff,
    ) -> SessionEnd {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                event = events.recv() => event,
            };

            match event {
                Some(LinkEvent::Pairing { code }) => self.on_pairing(&code).await,
                Some(LinkEvent::Open { user_id }) => {
                    backoff.reset();
                    self.on_open(&user_id).await;
                }
                Some(LinkEvent::Messages { kind, messages }) => {
                    self.on_messages(kind, &messages).await;
                }
                Some(LinkEvent::Closed { reason }) => {
                    return self.on_closed(reason).await;
                }
                None => return self.on_closed(CloseReason::ConnectionLost).await,
            }
        }
    }

    async fn on_pairing(&self, code: &str) {
        let artifact = match qr::render_data_url(code) {
            Ok(url) => url,
            Err(e) => {
                warn!("Could not render pairing code as QR: {:#}", e);
                code.to_string()
            }
        };
        info!("Pairing code received, waiting for scan");
        self.session.set_pairing(artifact.clone()).await;
        self.fanout.publish(ServerMessage::Qr { qr: artifact });
        self.publish_status().await;
    }

    async fn on_open(&self, user_id: &str) {
        let owner = jid::owner_number(user_id);
        info!(owner = %owner, "WhatsApp session open");
        self.session.set_connected(owner).await;
        self.metrics.link_opened();
        self.fanout.publish(ServerMessage::Ready);
        self.publish_status().await;
    }

    async fn on_closed(&self, reason: CloseReason) -> SessionEnd {
        info!("WhatsApp session closed: {}", reason);
        self.session.reset().await;
        self.publish_status().await;
        if reason.is_logged_out() {
            SessionEnd::LoggedOut
        } else {
            SessionEnd::Lost
        }
    }

    async fn on_messages(&self, kind: UpsertKind, messages: &[WireMessage]) {
        if kind != UpsertKind::Notify {
            debug!("Ignoring {} history messages", messages.len());
            return;
        }

        let Some(owner) = self.session.owner().await else {
            debug!("Dropping {} messages, no owner session", messages.len());
            return;
        };

        for msg in messages {
            match classify(msg) {
                Classified::Inbound { message, key } => {
                    let viewer_active = self.viewers.is_any_viewer_active_on(&message.jid).await;
                    match self
                        .ledger
                        .record_inbound(&owner, &message, viewer_active)
                        .await
                    {
                        Ok(record) => {
                            debug!(jid = %record.jid, viewer_active, "Inbound message recorded");
                            self.metrics.message_received();
                            self.fanout.publish(ServerMessage::NewMessage(record));
                            if viewer_active {
                                self.send_read_receipt(key).await;
                            }
                        }
                        Err(e) => {
                            warn!(jid = %message.jid, "Dropping inbound message: {:#}", e);
                            self.metrics.persistence_error();
                        }
                    }
                }
                Classified::OwnerSent { message, id } => {
                    if self.echoes.lock().await.is_echo(&message, id.as_deref()) {
                        debug!(jid = %message.jid, "Skipping echo of relay send");
                        continue;
                    }
                    match self.ledger.record_outbound(&owner, &message).await {
                        Ok(record) => {
                            debug!(jid = %record.jid, "Owner message from another device recorded");
                            self.metrics.message_sent();
                            self.fanout.publish(ServerMessage::NewMessage(record));
                        }
                        Err(e) => {
                            warn!(jid = %message.jid, "Dropping owner message: {:#}", e);
                            self.metrics.persistence_error();
                        }
                    }
                }
                Classified::Skip(why) => {
                    debug!("Skipping delivery: {}", why);
                    self.metrics.message_skipped();
                }
            }
        }
    }

    /// Fire-and-forget; a failed receipt only costs the blue ticks.
    async fn send_read_receipt(&self, key: wa_link::MessageKey) {
        let Some(handle) = self.handle.read().await.clone() else {
            return;
        };
        let timeout = self.link_config.send_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, handle.read_messages(&[key])).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Read receipt failed: {}", e),
                Err(_) => debug!("Read receipt timed out"),
            }
        });
    }
}
