use serde::{Deserialize, Serialize};

/// Per-conversation summary row, one per (owner, jid)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: i64,
    pub owner_number: String,
    pub jid: String,
    pub last_message: Option<String>,
    /// Unix millis
    pub last_time: Option<i64>,
    pub unread_count: i64,
    pub is_group: bool,
    pub is_business: bool,
}

/// A stored message; never mutated after insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: i64,
    pub owner_number: String,
    pub jid: String,
    pub from_me: bool,
    pub text: String,
    /// Unix millis
    pub time: i64,
}

/// Which subset of chats a listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatFilter {
    #[default]
    All,
    Unread,
    Groups,
    Business,
}

impl ChatFilter {
    /// Extra WHERE clause for the filter (ANDed after the owner predicate)
    pub(crate) fn sql_predicate(self) -> &'static str {
        match self {
            ChatFilter::All => "",
            ChatFilter::Unread => " AND unread_count > 0",
            ChatFilter::Groups => " AND is_group = 1",
            ChatFilter::Business => " AND is_business = 1",
        }
    }
}

/// A classified inbound message ready for the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub jid: String,
    pub text: String,
    /// Unix millis
    pub time: i64,
    pub is_business: bool,
}

/// Owner-sent message, either from this relay or from another linked device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub jid: String,
    pub text: String,
    /// Unix millis
    pub time: i64,
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_summary_serializes_camel_case() {
        let chat = ChatSummary {
            id: 1,
            owner_number: "15551230000".into(),
            jid: "15559876543@s.whatsapp.net".into(),
            last_message: Some("hi".into()),
            last_time: Some(1_700_000_000_000),
            unread_count: 2,
            is_group: false,
            is_business: true,
        };
        let json = serde_json::to_value(&chat).unwrap();
        assert_eq!(json["ownerNumber"], "15551230000");
        assert_eq!(json["lastMessage"], "hi");
        assert_eq!(json["unreadCount"], 2);
        assert_eq!(json["isBusiness"], true);
    }

    #[test]
    fn test_filter_predicates() {
        assert_eq!(ChatFilter::All.sql_predicate(), "");
        assert!(ChatFilter::Unread.sql_predicate().contains("unread_count > 0"));
        assert!(ChatFilter::Groups.sql_predicate().contains("is_group"));
        assert!(ChatFilter::Business.sql_predicate().contains("is_business"));
    }
}
