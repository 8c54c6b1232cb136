use anyhow::Result;

use crate::models::{ChatFilter, ChatSummary};

use super::{CHAT_COLUMNS, ConversationLedger, chat_from_row};

impl ConversationLedger {
    /// Chat summaries for the owner, most recent activity first.
    pub async fn list_chats(
        &self,
        owner: Option<&str>,
        filter: ChatFilter,
    ) -> Result<Vec<ChatSummary>> {
        let Some(owner) = owner else {
            return Ok(Vec::new());
        };

        let sql = format!(
            "SELECT {} FROM chats WHERE owner_number = ?{} ORDER BY last_time DESC, id DESC",
            CHAT_COLUMNS,
            filter.sql_predicate()
        );
        let rows = sqlx::query(&sql).bind(owner).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(chat_from_row).collect())
    }

    pub async fn get_chat(&self, owner: &str, jid: &str) -> Result<Option<ChatSummary>> {
        let sql = format!(
            "SELECT {} FROM chats WHERE owner_number = ? AND jid = ?",
            CHAT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(owner)
            .bind(jid)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(chat_from_row))
    }

    /// Zero the unread counter. Returns the updated summary, or `None` when the
    /// chat does not exist (or there is no owner).
    pub async fn mark_read(&self, owner: Option<&str>, jid: &str) -> Result<Option<ChatSummary>> {
        let Some(owner) = owner else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE chats SET unread_count = 0, updated_at = unixepoch()
            WHERE owner_number = ? AND jid = ?
            "#,
        )
        .bind(owner)
        .bind(jid)
        .execute(&self.pool)
        .await?;

        self.get_chat(owner, jid).await
    }
}
