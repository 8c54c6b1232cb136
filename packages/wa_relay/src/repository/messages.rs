use anyhow::{Context, Result};

use wa_link::jid;

use crate::models::{InboundMessage, MessageRecord, OutboundMessage};

use super::{ConversationLedger, MESSAGE_COLUMNS, message_from_row};

impl ConversationLedger {
    /// Append a received message and fold it into the chat summary.
    ///
    /// The unread counter moves by one unless a viewer has the chat open. Both writes
    /// share a transaction, and the increment happens inside the upsert.
    pub async fn record_inbound(
        &self,
        owner: &str,
        msg: &InboundMessage,
        viewer_active: bool,
    ) -> Result<MessageRecord> {
        let unread_delta: i64 = if viewer_active { 0 } else { 1 };

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO messages (owner_number, jid, from_me, text, time)
            VALUES (?, ?, 0, ?, ?)
            "#,
        )
        .bind(owner)
        .bind(&msg.jid)
        .bind(&msg.text)
        .bind(msg.time)
        .execute(&mut *tx)
        .await
        .context("Failed to insert inbound message")?;

        sqlx::query(
            r#"
            INSERT INTO chats (owner_number, jid, last_message, last_time, unread_count, is_group, is_business)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner_number, jid) DO UPDATE SET
                last_message = excluded.last_message,
                last_time = excluded.last_time,
                unread_count = chats.unread_count + excluded.unread_count,
                is_group = excluded.is_group,
                is_business = MAX(chats.is_business, excluded.is_business),
                updated_at = unixepoch()
            "#,
        )
        .bind(owner)
        .bind(&msg.jid)
        .bind(&msg.text)
        .bind(msg.time)
        .bind(unread_delta)
        .bind(jid::is_group(&msg.jid))
        .bind(msg.is_business)
        .execute(&mut *tx)
        .await
        .context("Failed to upsert chat summary")?;

        tx.commit().await?;

        Ok(MessageRecord {
            id: result.last_insert_rowid(),
            owner_number: owner.to_string(),
            jid: msg.jid.clone(),
            from_me: false,
            text: msg.text.clone(),
            time: msg.time,
        })
    }

    /// Append an owner-sent message. Sending into a chat counts as reading it.
    pub async fn record_outbound(
        &self,
        owner: &str,
        msg: &OutboundMessage,
    ) -> Result<MessageRecord> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO messages (owner_number, jid, from_me, text, time)
            VALUES (?, ?, 1, ?, ?)
            "#,
        )
        .bind(owner)
        .bind(&msg.jid)
        .bind(&msg.text)
        .bind(msg.time)
        .execute(&mut *tx)
        .await
        .context("Failed to insert outbound message")?;

        sqlx::query(
            r#"
            INSERT INTO chats (owner_number, jid, last_message, last_time, unread_count, is_group)
            VALUES (?, ?, ?, ?, 0, ?)
            ON CONFLICT(owner_number, jid) DO UPDATE SET
                last_message = excluded.last_message,
                last_time = excluded.last_time,
                unread_count = 0,
                updated_at = unixepoch()
            "#,
        )
        .bind(owner)
        .bind(&msg.jid)
        .bind(&msg.text)
        .bind(msg.time)
        .bind(jid::is_group(&msg.jid))
        .execute(&mut *tx)
        .await
        .context("Failed to upsert chat summary")?;

        tx.commit().await?;

        Ok(MessageRecord {
            id: result.last_insert_rowid(),
            owner_number: owner.to_string(),
            jid: msg.jid.clone(),
            from_me: true,
            text: msg.text.clone(),
            time: msg.time,
        })
    }

    /// Messages of one conversation, oldest first. Ties keep insertion order.
    pub async fn list_messages(&self, owner: Option<&str>, jid: &str) -> Result<Vec<MessageRecord>> {
        let Some(owner) = owner else {
            return Ok(Vec::new());
        };

        let sql = format!(
            "SELECT {} FROM messages WHERE owner_number = ? AND jid = ? ORDER BY time ASC, id ASC",
            MESSAGE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(owner)
            .bind(jid)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(message_from_row).collect())
    }
}
