use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use wa_link::{
    Connector, LinkError, LinkEvent, LinkHandle, LinkSession, MessageContent, MessageKey,
    Registration, UpsertKind, WireMessage,
};

use crate::AppState;
use crate::adapter::{AdapterDeps, ProtocolAdapter};
use crate::config::{BackoffConfig, LinkConfig, RelayConfig, WebSocketConfig, WebSocketFileConfig};
use crate::db::Database;
use crate::metrics::ServerMetrics;
use crate::repository::ConversationLedger;
use crate::session::SessionStore;
use crate::viewers::ViewerRegistry;
use crate::ws::{Fanout, ServerMessage};

pub const OWNER_ID: &str = "15551230000:7@s.whatsapp.net";
pub const OWNER: &str = "15551230000";
pub const ALICE: &str = "15559876543@s.whatsapp.net";

/// Engine stand-in. Every `connect` consumes one scripted session; with none
/// queued it waits forever, like an engine that never answers.
#[derive(Default)]
pub struct FakeConnector {
    sessions: Mutex<VecDeque<mpsc::Receiver<LinkEvent>>>,
    pub handle: Arc<FakeHandle>,
    pub connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a session and return the sender that drives its events.
    pub fn script_session(&self) -> mpsc::Sender<LinkEvent> {
        let (tx, rx) = mpsc::channel(32);
        self.sessions.lock().unwrap().push_back(rx);
        tx
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _credentials_dir: &Path) -> Result<LinkSession, LinkError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self.sessions.lock().unwrap().pop_front();
        match next {
            Some(events) => Ok(LinkSession {
                handle: self.handle.clone(),
                events,
            }),
            None => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub struct FakeHandle {
    pub sent: Mutex<Vec<(String, String)>>,
    pub reads: Mutex<Vec<MessageKey>>,
    pub logouts: AtomicUsize,
    pub send_delay: Mutex<Option<Duration>>,
    pub reject_sends: AtomicBool,
    pub fail_logout: AtomicBool,
    /// number -> jid of registered accounts
    pub registered: Mutex<HashMap<String, String>>,
    next_id: AtomicUsize,
}

impl FakeHandle {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl LinkHandle for FakeHandle {
    async fn send_text(&self, jid: &str, text: &str) -> Result<String, LinkError> {
        let delay = *self.send_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject_sends.load(Ordering::SeqCst) {
            return Err(LinkError::Rejected("not allowed".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((jid.to_string(), text.to_string()));
        Ok(format!("SENT-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn logout(&self) -> Result<(), LinkError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(LinkError::ConnectionClosed);
        }
        Ok(())
    }

    async fn check_registered(&self, number: &str) -> Result<Registration, LinkError> {
        let jid = self.registered.lock().unwrap().get(number).cloned();
        Ok(Registration {
            exists: jid.is_some(),
            jid,
        })
    }

    async fn read_messages(&self, keys: &[MessageKey]) -> Result<(), LinkError> {
        self.reads.lock().unwrap().extend_from_slice(keys);
        Ok(())
    }
}

pub fn test_link_config() -> LinkConfig {
    LinkConfig {
        bridge_url: "ws://fake".into(),
        send_timeout: Duration::from_millis(200),
        logout_timeout: Duration::from_millis(200),
        reconnect: BackoffConfig {
            initial: Duration::from_millis(5),
            max: Duration::from_millis(20),
        },
    }
}

/// Build a fully-wired `AppState` over an in-memory SQLite database and a fake engine.
///
/// Callers **must** hold the `TempDir` for the lifetime of the test; the
/// credentials directory lives inside it. The supervisor is not started.
pub async fn test_app_state() -> (AppState, Arc<FakeConnector>, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = RelayConfig::new(Some(tmp.path().to_path_buf())).expect("config");

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    crate::db::run_migrations(&pool).await.expect("migrations");

    let ws_config = WebSocketConfig::from_file(&WebSocketFileConfig::default());
    let db = Arc::new(Database { pool: pool.clone() });
    let ledger = Arc::new(ConversationLedger::new(pool));
    let session = Arc::new(SessionStore::new());
    let viewers = Arc::new(ViewerRegistry::new());
    let fanout = Fanout::new(ws_config.broadcast_capacity);
    let metrics = Arc::new(ServerMetrics::new());

    let connector = FakeConnector::new();
    let adapter = Arc::new(ProtocolAdapter::new(
        connector.clone(),
        test_link_config(),
        config.credentials_dir.clone(),
        AdapterDeps {
            session: session.clone(),
            viewers: viewers.clone(),
            ledger: ledger.clone(),
            fanout: fanout.clone(),
            metrics: metrics.clone(),
        },
    ));

    let state = AppState {
        config: Arc::new(config),
        ws_config: Arc::new(ws_config),
        metrics,
        db,
        ledger,
        session,
        viewers,
        fanout,
        adapter,
    };

    (state, connector, tmp)
}

/// Start the supervisor and walk the fake engine through pairing to an open
/// session owned by [`OWNER`]. Returns the event sender for further scripting.
pub async fn connected_state(state: &AppState, connector: &FakeConnector) -> mpsc::Sender<LinkEvent> {
    let events = connector.script_session();
    let mut rx = state.fanout.subscribe();
    state.adapter.start().await;
    events
        .send(LinkEvent::Open {
            user_id: OWNER_ID.into(),
        })
        .await
        .unwrap();
    next_matching(&mut rx, |m| matches!(m, ServerMessage::Status(s) if s.connected)).await;
    events
}

pub fn text_delivery(jid: &str, id: &str, text: &str, from_me: bool) -> LinkEvent {
    LinkEvent::Messages {
        kind: UpsertKind::Notify,
        messages: vec![WireMessage {
            key: MessageKey {
                remote_jid: Some(jid.to_string()),
                from_me,
                id: Some(id.to_string()),
                participant: None,
            },
            message: Some(MessageContent {
                conversation: Some(text.to_string()),
                ..Default::default()
            }),
            message_timestamp: Some(1_700_000_000),
            verified_biz_name: None,
        }],
    }
}

/// Wait (bounded) for the first broadcast matching `pred`, skipping others.
pub async fn next_matching(
    rx: &mut broadcast::Receiver<ServerMessage>,
    pred: impl Fn(&ServerMessage) -> bool,
) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(msg) if pred(&msg) => return msg,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("fanout closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for broadcast")
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {}", what);
}
