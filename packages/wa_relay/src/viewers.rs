//! Which chat each connected viewer has open.
//!
//! Entries are ephemeral: created on socket connect, replaced on every `chat:active`,
//! removed on disconnect. Nothing here is persisted.

use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct ViewerRegistry {
    active: RwLock<HashMap<String, Option<String>>>,
}

impl ViewerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the chat a viewer has open (`None` = no chat). Last write wins.
    pub async fn set_active(&self, viewer_id: &str, jid: Option<String>) {
        self.active
            .write()
            .await
            .insert(viewer_id.to_string(), jid.filter(|j| !j.is_empty()));
    }

    pub async fn clear(&self, viewer_id: &str) {
        self.active.write().await.remove(viewer_id);
    }

    pub async fn is_any_viewer_active_on(&self, jid: &str) -> bool {
        self.active
            .read()
            .await
            .values()
            .any(|open| open.as_deref() == Some(jid))
    }

    pub async fn viewer_count(&self) -> usize {
        self.active.read().await.len()
    }
}
