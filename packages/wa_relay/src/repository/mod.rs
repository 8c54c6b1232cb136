// Conversation ledger: chat summaries and the append-only message log.
//
// Each concern lives in its own file with `impl ConversationLedger`.
// Every query is scoped by owner number; reads without an owner return empty results.

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};

use crate::models::{ChatSummary, MessageRecord};

mod chats;
mod messages;

#[cfg(test)]
pub(crate) mod test_helpers;

#[derive(Clone)]
pub struct ConversationLedger {
    pub(crate) pool: SqlitePool,
}

impl ConversationLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

pub(crate) const CHAT_COLUMNS: &str =
    "id, owner_number, jid, last_message, last_time, unread_count, is_group, is_business";

pub(crate) const MESSAGE_COLUMNS: &str = "id, owner_number, jid, from_me, text, time";

pub(crate) fn chat_from_row(r: &SqliteRow) -> ChatSummary {
    ChatSummary {
        id: r.get("id"),
        owner_number: r.get("owner_number"),
        jid: r.get("jid"),
        last_message: r.get("last_message"),
        last_time: r.get("last_time"),
        unread_count: r.get("unread_count"),
        is_group: r.get::<i64, _>("is_group") != 0,
        is_business: r.get::<i64, _>("is_business") != 0,
    }
}

pub(crate) fn message_from_row(r: &SqliteRow) -> MessageRecord {
    MessageRecord {
        id: r.get("id"),
        owner_number: r.get("owner_number"),
        jid: r.get("jid"),
        from_me: r.get::<i64, _>("from_me") != 0,
        text: r.get("text"),
        time: r.get("time"),
    }
}
