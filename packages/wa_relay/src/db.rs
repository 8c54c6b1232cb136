use anyhow::{Context, Result};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::config::RelayConfig;

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(config: &RelayConfig) -> Result<Self> {
        info!("Connecting to database: {}", config.db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .connect(&config.db_url())
            .await
            .with_context(|| format!("Failed to connect to database: {}", config.db_url()))?;

        info!("Running database migrations...");
        self::run_migrations(&pool).await?;

        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA temp_store = MEMORY")
            .execute(&pool)
            .await?;

        info!("Database initialized");

        Ok(Self { pool })
    }

    pub async fn get_stats(&self) -> Result<DbStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM chats) as chat_count,
                (SELECT COUNT(*) FROM messages) as message_count,
                (SELECT COALESCE(SUM(unread_count), 0) FROM chats) as unread_total,
                (SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()) as db_size
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DbStats {
            chats: row.try_get::<i64, _>("chat_count").unwrap_or(0) as u64,
            messages: row.try_get::<i64, _>("message_count").unwrap_or(0) as u64,
            unread: row.try_get::<i64, _>("unread_total").unwrap_or(0) as u64,
            database_size_bytes: row.try_get::<i64, _>("db_size").unwrap_or(0) as u64,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub chats: u64,
    pub messages: u64,
    pub unread: u64,
    pub database_size_bytes: u64,
}

/// Current schema version - increment when adding migrations
const SCHEMA_VERSION: i64 = 1;

pub(crate) async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL DEFAULT (unixepoch()),
            description TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current_version: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    if current_version > SCHEMA_VERSION {
        anyhow::bail!(
            "Database schema version {} is newer than supported version {}. Please upgrade the application.",
            current_version,
            SCHEMA_VERSION
        );
    }

    if current_version == SCHEMA_VERSION {
        info!(
            "Database schema is up to date (version {})",
            current_version
        );
        return Ok(());
    }

    info!(
        "Migrating database from version {} to {}",
        current_version, SCHEMA_VERSION
    );

    // One summary row per (owner, conversation)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_number TEXT NOT NULL,
            jid TEXT NOT NULL,
            last_message TEXT,
            last_time INTEGER,
            unread_count INTEGER NOT NULL DEFAULT 0 CHECK (unread_count >= 0),
            is_group INTEGER NOT NULL DEFAULT 0,
            is_business INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL DEFAULT (unixepoch()),
            updated_at INTEGER NOT NULL DEFAULT (unixepoch()),
            UNIQUE(owner_number, jid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chats_owner_time ON chats(owner_number, last_time DESC)",
    )
    .execute(pool)
    .await?;

    // Append-only message log
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_number TEXT NOT NULL,
            jid TEXT NOT NULL,
            from_me INTEGER NOT NULL,
            text TEXT NOT NULL,
            time INTEGER NOT NULL,
            created_at INTEGER NOT NULL DEFAULT (unixepoch())
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_owner_jid_time ON messages(owner_number, jid, time)",
    )
    .execute(pool)
    .await?;

    if current_version < SCHEMA_VERSION {
        sqlx::query("INSERT OR REPLACE INTO schema_version (version, description) VALUES (?, ?)")
            .bind(SCHEMA_VERSION)
            .bind("chats and messages")
            .execute(pool)
            .await?;
        info!("Database migrated to version {}", SCHEMA_VERSION);
    }

    Ok(())
}
