//! JSON-over-WebSocket client for a protocol engine running as a sidecar.
//!
//! One socket carries everything. The relay sends `{"op": ...}` requests tagged with a
//! numeric id and the engine answers with `{"event": "reply", "id": ...}`. Lifecycle
//! and message events arrive unsolicited as `{"event": "qr" | "open" | "close" | "messages"}`.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tracing::{debug, warn};

use crate::connector::{Connector, LinkHandle, LinkSession, Registration};
use crate::error::LinkError;
use crate::event::{CloseReason, LinkEvent, MessageKey, UpsertKind, WireMessage};

const DEFAULT_EVENT_CAPACITY: usize = 256;
const OUTBOUND_CAPACITY: usize = 64;

/// Requests sent to the engine
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum Request {
    Hello {
        #[serde(rename = "authDir")]
        auth_dir: String,
    },
    Send {
        id: u64,
        jid: String,
        text: String,
    },
    Logout {
        id: u64,
    },
    Check {
        id: u64,
        number: String,
    },
    Read {
        id: u64,
        keys: Vec<MessageKey>,
    },
}

/// Frames received from the engine
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum Frame {
    Qr {
        code: String,
    },
    Open {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Close {
        #[serde(default)]
        reason: Option<String>,
        #[serde(default, rename = "statusCode")]
        status_code: Option<u16>,
    },
    Messages {
        #[serde(rename = "type")]
        kind: UpsertKind,
        #[serde(default)]
        messages: Vec<WireMessage>,
    },
    Reply {
        id: u64,
        ok: bool,
        #[serde(default)]
        result: Option<serde_json::Value>,
        #[serde(default)]
        error: Option<String>,
    },
}

impl Frame {
    fn parse(text: &str) -> Result<Self, LinkError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Deserialize)]
struct SendResult {
    id: String,
}

type Pending = HashMap<u64, oneshot::Sender<Result<serde_json::Value, LinkError>>>;

struct Shared {
    next_id: AtomicU64,
    pending: Mutex<Pending>,
    outbound: mpsc::Sender<String>,
    closed: AtomicBool,
}

impl Shared {
    /// Resolve every in-flight request with `ConnectionClosed`.
    async fn fail_pending(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(LinkError::ConnectionClosed));
        }
    }

    async fn resolve(&self, id: u64, outcome: Result<serde_json::Value, LinkError>) {
        match self.pending.lock().await.remove(&id) {
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => debug!("Reply for unknown request {}", id),
        }
    }
}

/// Connects to a protocol engine over a JSON WebSocket
#[derive(Debug, Clone)]
pub struct BridgeConnector {
    url: String,
    event_capacity: usize,
}

impl BridgeConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for BridgeConnector {
    async fn connect(&self, credentials_dir: &Path) -> Result<LinkSession, LinkError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.url)
            .await
            .map_err(LinkError::from_tungstenite)?;
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let hello = serde_json::to_string(&Request::Hello {
            auth_dir: credentials_dir.to_string_lossy().into_owned(),
        })?;
        ws_write
            .send(tungstenite::Message::Text(hello.into()))
            .await
            .map_err(LinkError::from_tungstenite)?;

        let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<LinkEvent>(self.event_capacity);

        let shared = Arc::new(Shared {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            outbound: out_tx,
            closed: AtomicBool::new(false),
        });

        // Writer: drains queued requests onto the socket
        tokio::spawn(async move {
            while let Some(json) = out_rx.recv().await {
                if let Err(e) = ws_write.send(tungstenite::Message::Text(json.into())).await {
                    warn!("Engine write failed: {}", e);
                    break;
                }
            }
            let _ = ws_write.close().await;
        });

        // Reader: routes replies to waiters and forwards events in arrival order
        let reader_shared = shared.clone();
        tokio::spawn(async move {
            let mut saw_close = false;
            while let Some(msg) = ws_read.next().await {
                let text = match msg {
                    Ok(tungstenite::Message::Text(text)) => text,
                    Ok(tungstenite::Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Engine read failed: {}", e);
                        break;
                    }
                };

                let frame = match Frame::parse(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Ignoring malformed engine frame: {}", e);
                        continue;
                    }
                };

                let event = match frame {
                    Frame::Reply {
                        id,
                        ok,
                        result,
                        error,
                    } => {
                        let outcome = if ok {
                            Ok(result.unwrap_or(serde_json::Value::Null))
                        } else {
                            Err(LinkError::Rejected(
                                error.unwrap_or_else(|| "unspecified error".to_string()),
                            ))
                        };
                        reader_shared.resolve(id, outcome).await;
                        continue;
                    }
                    Frame::Qr { code } => LinkEvent::Pairing { code },
                    Frame::Open { user_id } => LinkEvent::Open { user_id },
                    Frame::Close {
                        reason,
                        status_code,
                    } => {
                        saw_close = true;
                        LinkEvent::Closed {
                            reason: CloseReason::from_report(status_code, reason),
                        }
                    }
                    Frame::Messages { kind, messages } => LinkEvent::Messages { kind, messages },
                };

                if event_tx.send(event).await.is_err() {
                    debug!("Event receiver dropped, stopping engine reader");
                    break;
                }
                if saw_close {
                    break;
                }
            }

            reader_shared.fail_pending().await;
            if !saw_close {
                let _ = event_tx
                    .send(LinkEvent::Closed {
                        reason: CloseReason::ConnectionLost,
                    })
                    .await;
            }
        });

        Ok(LinkSession {
            handle: Arc::new(BridgeHandle { shared }),
            events: event_rx,
        })
    }
}

struct BridgeHandle {
    shared: Arc<Shared>,
}

impl BridgeHandle {
    async fn request(
        &self,
        build: impl FnOnce(u64) -> Request,
    ) -> Result<serde_json::Value, LinkError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let json = serde_json::to_string(&build(id))?;

        let (tx, rx) = oneshot::channel();
        {
            // `fail_pending` flags `closed` before draining under this lock
            let mut pending = self.shared.pending.lock().await;
            if self.shared.closed.load(Ordering::SeqCst) {
                return Err(LinkError::ConnectionClosed);
            }
            pending.insert(id, tx);
        }

        if self.shared.outbound.send(json).await.is_err() {
            self.shared.pending.lock().await.remove(&id);
            return Err(LinkError::ConnectionClosed);
        }

        rx.await.map_err(|_| LinkError::ConnectionClosed)?
    }
}

#[async_trait]
impl LinkHandle for BridgeHandle {
    async fn send_text(&self, jid: &str, text: &str) -> Result<String, LinkError> {
        let result = self
            .request(|id| Request::Send {
                id,
                jid: jid.to_string(),
                text: text.to_string(),
            })
            .await?;
        let sent: SendResult = serde_json::from_value(result)?;
        Ok(sent.id)
    }

    async fn logout(&self) -> Result<(), LinkError> {
        self.request(|id| Request::Logout { id }).await?;
        Ok(())
    }

    async fn check_registered(&self, number: &str) -> Result<Registration, LinkError> {
        let result = self
            .request(|id| Request::Check {
                id,
                number: number.to_string(),
            })
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn read_messages(&self, keys: &[MessageKey]) -> Result<(), LinkError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.request(|id| Request::Read {
            id,
            keys: keys.to_vec(),
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn request_racing_teardown_is_rejected() {
        let (out_tx, _out_rx) = mpsc::channel(4);
        let shared = Arc::new(Shared {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            outbound: out_tx,
            closed: AtomicBool::new(false),
        });
        let handle = BridgeHandle {
            shared: shared.clone(),
        };

        // Teardown holds the pending lock while the request is queued behind it
        let guard = shared.pending.lock().await;
        let request = tokio::spawn(async move { handle.logout().await });
        tokio::task::yield_now().await;
        shared.closed.store(true, Ordering::SeqCst);
        drop(guard);

        let result = tokio::time::timeout(Duration::from_secs(1), request)
            .await
            .expect("request hung after teardown")
            .unwrap();
        assert!(matches!(result, Err(LinkError::ConnectionClosed)));
        assert!(shared.pending.lock().await.is_empty());
    }

    #[test]
    fn test_parse_qr_frame() {
        let frame = Frame::parse(r#"{"event":"qr","code":"2@abc,def"}"#).unwrap();
        assert!(matches!(frame, Frame::Qr { code } if code == "2@abc,def"));
    }

    #[test]
    fn test_parse_close_frame_logged_out() {
        let frame = Frame::parse(r#"{"event":"close","statusCode":401}"#).unwrap();
        match frame {
            Frame::Close {
                reason,
                status_code,
            } => {
                assert!(CloseReason::from_report(status_code, reason).is_logged_out());
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_parse_messages_frame() {
        let json = r#"{
            "event": "messages",
            "type": "notify",
            "messages": [
                { "key": { "remoteJid": "15559876543@s.whatsapp.net", "fromMe": false, "id": "M1" },
                  "message": { "conversation": "hi" },
                  "messageTimestamp": 1700000000 }
            ]
        }"#;
        match Frame::parse(json).unwrap() {
            Frame::Messages { kind, messages } => {
                assert_eq!(kind, UpsertKind::Notify);
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].text(), Some("hi"));
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_event_is_error() {
        assert!(Frame::parse(r#"{"event":"presence"}"#).is_err());
    }

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_value(Request::Hello {
            auth_dir: "/data/creds".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "op": "hello", "authDir": "/data/creds" }));

        let json = serde_json::to_value(Request::Send {
            id: 7,
            jid: "1@s.whatsapp.net".into(),
            text: "yo".into(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "op": "send", "id": 7, "jid": "1@s.whatsapp.net", "text": "yo" })
        );
    }

    /// Minimal engine: expects hello, emits qr + open, answers one send, then hangs up.
    async fn spawn_fake_engine() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let hello = ws.next().await.unwrap().unwrap();
            let hello: serde_json::Value =
                serde_json::from_str(hello.to_text().unwrap()).unwrap();
            assert_eq!(hello["op"], "hello");

            for frame in [
                r#"{"event":"qr","code":"PAIR-1"}"#,
                r#"{"event":"open","userId":"15551230000:3@s.whatsapp.net"}"#,
            ] {
                ws.send(tungstenite::Message::Text(frame.into()))
                    .await
                    .unwrap();
            }

            let req = ws.next().await.unwrap().unwrap();
            let req: serde_json::Value = serde_json::from_str(req.to_text().unwrap()).unwrap();
            assert_eq!(req["op"], "send");
            let reply = serde_json::json!({
                "event": "reply",
                "id": req["id"],
                "ok": true,
                "result": { "id": "SENT-1" }
            });
            ws.send(tungstenite::Message::Text(reply.to_string().into()))
                .await
                .unwrap();

            let _ = ws.close(None).await;
        });
        format!("ws://{}", addr)
    }

    #[tokio::test]
    async fn test_bridge_session_round_trip() {
        let url = spawn_fake_engine().await;
        let dir = tempfile::tempdir().unwrap();
        let mut session = BridgeConnector::new(url).connect(dir.path()).await.unwrap();

        assert_eq!(
            session.events.recv().await,
            Some(LinkEvent::Pairing {
                code: "PAIR-1".into()
            })
        );
        assert_eq!(
            session.events.recv().await,
            Some(LinkEvent::Open {
                user_id: "15551230000:3@s.whatsapp.net".into()
            })
        );

        let id = session
            .handle
            .send_text("15559876543@s.whatsapp.net", "hello")
            .await
            .unwrap();
        assert_eq!(id, "SENT-1");

        // Engine hangs up without a close frame
        assert_eq!(
            session.events.recv().await,
            Some(LinkEvent::Closed {
                reason: CloseReason::ConnectionLost
            })
        );
        assert!(matches!(
            session.handle.logout().await,
            Err(LinkError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_connect_refused_is_unavailable() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let result = BridgeConnector::new(format!("ws://{}", addr))
            .connect(dir.path())
            .await;
        assert!(matches!(result, Err(LinkError::Unavailable(_))));
    }
}
