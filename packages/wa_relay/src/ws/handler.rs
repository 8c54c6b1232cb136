//! Viewer WebSocket Handler
//!
//! One connection per open browser tab. The viewer gets every broadcast event and
//! reports which chat it has open.

use axum::extract::ws::{Message, WebSocket};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::metrics::ServerMetrics;
use crate::session::SessionStore;
use crate::viewers::ViewerRegistry;

use super::fanout::{Fanout, greeting};
use super::protocol::{ClientMessage, ServerMessage};

/// Handle one viewer connection until either side goes away
pub async fn handle_viewer_ws(
    socket: WebSocket,
    session: Arc<SessionStore>,
    viewers: Arc<ViewerRegistry>,
    fanout: Fanout,
    metrics: Arc<ServerMetrics>,
    send_capacity: usize,
) {
    let viewer_id = uuid::Uuid::new_v4().to_string();
    info!(viewer = %viewer_id, "Viewer connected");
    metrics.connection_opened();
    viewers.set_active(&viewer_id, None).await;

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(send_capacity.max(1));

    // Subscribe before the greeting so nothing published in between is missed.
    // The greeting goes straight to the socket, independent of the channel size.
    let mut events = fanout.subscribe();
    for msg in greeting(&session).await {
        if let Err(e) = send_json(&mut ws_sender, &msg).await {
            warn!(viewer = %viewer_id, "Failed to send greeting: {}", e);
            viewers.clear(&viewer_id).await;
            metrics.connection_closed();
            return;
        }
    }

    let tx_events = tx.clone();
    let metrics_events = metrics.clone();
    let broadcast_task = async move {
        loop {
            match events.recv().await {
                Ok(msg) => {
                    if tx_events.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    metrics_events.messages_dropped(n);
                    warn!("Viewer broadcast lagged by {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    let sender_task = async move {
        while let Some(msg) = rx.recv().await {
            match send_json(&mut ws_sender, &msg).await {
                Ok(()) => {}
                Err(SendError::Encode(e)) => error!("Failed to serialize message: {}", e),
                Err(SendError::Socket(_)) => break,
            }
        }
    };

    let viewers_input = viewers.clone();
    let metrics_input = metrics.clone();
    let viewer_input = viewer_id.clone();
    let input_task = async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::ChatActive { jid }) => {
                        debug!(viewer = %viewer_input, jid = ?jid, "Active chat changed");
                        viewers_input.set_active(&viewer_input, jid).await;
                    }
                    Err(e) => debug!("Ignoring malformed viewer message: {}", e),
                },
                Ok(Message::Close(_)) => {
                    debug!("Viewer closed connection");
                    break;
                }
                Err(e) => {
                    metrics_input.websocket_error();
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = broadcast_task => debug!("Broadcast task ended"),
        _ = sender_task => debug!("Sender task ended"),
        _ = input_task => debug!("Input task ended"),
    }

    viewers.clear(&viewer_id).await;
    metrics.connection_closed();
    info!(viewer = %viewer_id, "Viewer disconnected");
}

#[derive(Debug, thiserror::Error)]
enum SendError {
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("socket: {0}")]
    Socket(#[from] axum::Error),
}

async fn send_json(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), SendError> {
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json.into())).await?;
    Ok(())
}
