use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [link]
//                    bridge_url = "ws://10.0.0.5:8765"
//
//   env var:         WA_RELAY_LINK__BRIDGE_URL=ws://10.0.0.5:8765   (double underscore = nesting)
//
//   (single underscore stays within field names: WA_RELAY_LINK__SEND_TIMEOUT_SECS)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub link: LinkFileConfig,
    #[serde(default)]
    pub websocket: WebSocketFileConfig,
}

/// HTTP listener settings (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed browser origin. Unset means any origin.
    #[serde(default)]
    pub cors_origin: Option<String>,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: None,
        }
    }
}

/// Protocol engine settings (lives under `[link]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkFileConfig {
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    #[serde(default = "default_logout_timeout_secs")]
    pub logout_timeout_secs: u64,
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

impl Default for LinkFileConfig {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            send_timeout_secs: default_send_timeout_secs(),
            logout_timeout_secs: default_logout_timeout_secs(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

/// Viewer channel sizing (lives under `[websocket]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebSocketFileConfig {
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    #[serde(default = "default_send_channel_capacity")]
    pub send_channel_capacity: usize,
}

impl Default for WebSocketFileConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: default_broadcast_capacity(),
            send_channel_capacity: default_send_channel_capacity(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_bridge_url() -> String {
    "ws://127.0.0.1:8765".to_string()
}
fn default_send_timeout_secs() -> u64 {
    30
}
fn default_logout_timeout_secs() -> u64 {
    10
}
fn default_reconnect_initial_ms() -> u64 {
    500
}
fn default_reconnect_max_ms() -> u64 {
    30_000
}
fn default_broadcast_capacity() -> usize {
    256
}
fn default_send_channel_capacity() -> usize {
    100
}

/// Build a figment that layers: defaults → config.toml → WA_RELAY_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `WA_RELAY_SERVER__PORT=8080`  →  `server.port = 8080`
///   `WA_RELAY_LINK__SEND_TIMEOUT_SECS=5`  →  `link.send_timeout_secs = 5`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("WA_RELAY_").split("__"))
}

// =============================================================================
// Runtime config structs (derived from FileConfig, used throughout the server)
// =============================================================================

/// Engine link behaviour (runtime view).
#[derive(Clone, Debug)]
pub struct LinkConfig {
    pub bridge_url: String,
    /// Upper bound on a single outbound send
    pub send_timeout: Duration,
    /// Upper bound on the remote logout request
    pub logout_timeout: Duration,
    pub reconnect: BackoffConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
}

impl LinkConfig {
    pub fn from_file(fc: &LinkFileConfig) -> Self {
        let initial = Duration::from_millis(fc.reconnect_initial_ms.max(1));
        Self {
            bridge_url: fc.bridge_url.clone(),
            send_timeout: Duration::from_secs(fc.send_timeout_secs.max(1)),
            logout_timeout: Duration::from_secs(fc.logout_timeout_secs.max(1)),
            reconnect: BackoffConfig {
                initial,
                max: Duration::from_millis(fc.reconnect_max_ms).max(initial),
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct WebSocketConfig {
    /// Channel capacity for messages to a single viewer
    pub send_channel_capacity: usize,
    /// Broadcast channel capacity for fan-out events
    pub broadcast_capacity: usize,
}

impl WebSocketConfig {
    pub fn from_file(fc: &WebSocketFileConfig) -> Self {
        Self {
            send_channel_capacity: fc.send_channel_capacity.max(1),
            broadcast_capacity: fc.broadcast_capacity.max(1),
        }
    }
}

// =============================================================================
// Directory layout config, derived from --data-dir rather than figment
// =============================================================================

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    /// Engine-owned credential material; deleted wholesale on logout
    pub credentials_dir: PathBuf,
}

impl RelayConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".wa-relay"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        // Created lazily by the engine; logout removes it
        let credentials_dir = data_dir.join("credentials");
        let db_path = data_dir.join("relay.db");

        info!("Data directory: {}", data_dir.display());

        Ok(Self {
            data_dir,
            db_path,
            credentials_dir,
        })
    }

    pub fn db_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.db_path.display())
    }

    pub fn reset_database(&self) -> Result<()> {
        if self.db_path.exists() {
            std::fs::remove_file(&self.db_path)
                .with_context(|| format!("Failed to delete database: {:?}", self.db_path))?;
            info!("Database reset: {:?}", self.db_path);

            let wal_path = self.db_path.with_extension("db-wal");
            if wal_path.exists() {
                std::fs::remove_file(&wal_path)?;
            }
            let shm_path = self.db_path.with_extension("db-shm");
            if shm_path.exists() {
                std::fs::remove_file(&shm_path)?;
            }
        }
        Ok(())
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}
