use sqlx::sqlite::SqlitePoolOptions;

/// Create a fresh ConversationLedger backed by an in-memory SQLite database.
/// Each call returns an isolated database with all migrations applied.
pub async fn test_ledger() -> super::ConversationLedger {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");

    crate::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    super::ConversationLedger::new(pool)
}

pub const OWNER: &str = "15551230000";
pub const ALICE: &str = "15559876543@s.whatsapp.net";
pub const BOB: &str = "15550001111@s.whatsapp.net";
pub const FAMILY: &str = "120363001234567890@g.us";
