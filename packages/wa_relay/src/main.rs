use anyhow::{Context, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::info;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

use wa_link::BridgeConnector;

mod adapter;
mod config;
mod db;
mod error;
mod export;
mod handlers;
mod metrics;
mod models;
mod qr;
mod repository;
mod session;
mod viewers;
mod ws;

#[cfg(test)]
mod test_helpers;

use crate::adapter::{AdapterDeps, ProtocolAdapter};
use crate::config::{FileConfig, LinkConfig, RelayConfig, WebSocketConfig, load_config};
use crate::db::Database;
use crate::metrics::ServerMetrics;
use crate::repository::ConversationLedger;
use crate::session::SessionStore;
use crate::viewers::ViewerRegistry;
use crate::ws::Fanout;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "wa-relay")]
#[command(about = "Relay a linked WhatsApp account to browser viewers")]
struct Cli {
    /// Custom data directory (defaults to ~/.wa-relay)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Host to bind to (overrides config.toml)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the web server (overrides config.toml)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Clean start - reset database (prompt for confirmation)
    #[arg(long)]
    reset_db: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub config: Arc<RelayConfig>,
    pub ws_config: Arc<WebSocketConfig>,
    /// Server metrics for observability
    pub metrics: Arc<ServerMetrics>,
    pub db: Arc<Database>,
    pub ledger: Arc<ConversationLedger>,
    pub session: Arc<SessionStore>,
    /// Which chat each connected viewer has open
    pub viewers: Arc<ViewerRegistry>,
    pub fanout: Fanout,
    pub adapter: Arc<ProtocolAdapter>,
}

/// Every relay route, without middleware
fn api_routes() -> Router<AppState> {
    Router::new()
        // Health and metrics endpoints
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/health/ready", get(handlers::health_ready_handler))
        .route("/metrics", get(handlers::metrics_handler))
        // Chats
        .route("/api/chats", get(handlers::list_chats))
        .route("/api/chats/unread", get(handlers::list_unread_chats))
        .route("/api/chats/groups", get(handlers::list_group_chats))
        .route("/api/chats/business", get(handlers::list_business_chats))
        .route("/api/chats/read/{jid}", post(handlers::mark_chat_read))
        .route("/api/messages/{jid}", get(handlers::list_messages))
        // Engine session
        .route("/api/whatsapp/status", get(handlers::get_status))
        .route("/api/whatsapp/qr", get(handlers::get_qr))
        .route("/api/whatsapp/check/{number}", get(handlers::check_number))
        .route("/api/whatsapp/send", post(handlers::send_message))
        .route("/api/whatsapp/export/{jid}", get(handlers::export_chat))
        .route("/api/whatsapp/logout", post(handlers::logout_handler))
        .route("/api/whatsapp/connect", post(handlers::connect_handler))
        .route("/api/ws", get(handlers::viewer_websocket_handler))
}

fn cors_layer(origin: Option<&str>) -> Result<CorsLayer> {
    match origin {
        None => Ok(CorsLayer::permissive()),
        Some(origin) => {
            let origin: HeaderValue = origin
                .parse()
                .with_context(|| format!("Invalid cors_origin: {}", origin))?;
            Ok(CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(Any)
                .allow_headers(Any))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RelayConfig::new(cli.data_dir.clone())?;
    let mut file_config: FileConfig = load_config(&config.data_dir)
        .extract()
        .context("Invalid configuration")?;
    if let Some(host) = cli.host.clone() {
        file_config.server.host = host;
    }
    if let Some(port) = cli.port {
        file_config.server.port = port;
    }

    if cli.print_config {
        print!("{}", toml::to_string_pretty(&file_config)?);
        return Ok(());
    }

    run_server(cli, config, file_config).await
}

async fn run_server(cli: Cli, config: RelayConfig, file_config: FileConfig) -> Result<()> {
    // Setup logging
    let default_directive = if cli.debug {
        "wa_relay=debug,wa_link=debug,tower_http=debug,info"
    } else {
        "wa_relay=info,wa_link=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting WA Relay");

    let config = Arc::new(config);

    // Handle database reset if requested
    if cli.reset_db && config.db_path.exists() {
        println!("This will delete all stored chats and messages!");
        print!("Are you sure? (yes/no): ");
        use std::io::{self, Write};
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if input.trim() == "yes" {
            config.reset_database()?;
            println!("Database reset.");
        } else {
            println!("Cancelled.");
        }
    }

    info!("Initializing database...");
    let db = Arc::new(Database::new(&config).await?);
    let ledger = Arc::new(ConversationLedger::new(db.pool.clone()));

    let link_config = LinkConfig::from_file(&file_config.link);
    let ws_config = WebSocketConfig::from_file(&file_config.websocket);
    let session = Arc::new(SessionStore::new());
    let viewers = Arc::new(ViewerRegistry::new());
    let fanout = Fanout::new(ws_config.broadcast_capacity);
    let metrics = Arc::new(ServerMetrics::new());

    info!("Protocol engine bridge: {}", link_config.bridge_url);
    let connector = Arc::new(BridgeConnector::new(link_config.bridge_url.clone()));
    let adapter = Arc::new(ProtocolAdapter::new(
        connector,
        link_config,
        config.credentials_dir.clone(),
        AdapterDeps {
            session: session.clone(),
            viewers: viewers.clone(),
            ledger: ledger.clone(),
            fanout: fanout.clone(),
            metrics: metrics.clone(),
        },
    ));
    adapter.start().await;

    let app_state = AppState {
        config: config.clone(),
        ws_config: Arc::new(ws_config),
        metrics,
        db,
        ledger,
        session,
        viewers,
        fanout,
        adapter: adapter.clone(),
    };

    let app = api_routes()
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(cors_layer(file_config.server.cors_origin.as_deref())?)
        .with_state(app_state);

    let addr = format!("{}:{}", file_config.server.host, file_config.server.port)
        .parse::<SocketAddr>()
        .context("Invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    info!("WA Relay listening on http://{}", actual_addr);
    info!("API endpoints:");
    info!("  GET    /api/chats              - List chats");
    info!("  GET    /api/messages/:jid      - Messages of one chat");
    info!("  POST   /api/whatsapp/send      - Send a text message");
    info!("  GET    /api/whatsapp/qr        - Pending pairing code");
    info!("  GET    /api/ws                 - Viewer WebSocket");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    // Credentials stay on disk so the next start resumes the session
    info!("Stopping engine supervisor...");
    adapter.stop().await;

    info!("Shutdown complete");
    server_result
}
