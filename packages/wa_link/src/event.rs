use serde::{Deserialize, Serialize};
use std::fmt;

/// Status code the engine reports when the account was logged out remotely
/// (or the linked device was removed from the phone).
pub const LOGGED_OUT_STATUS: u16 = 401;

/// Events streamed from an engine connection, in the order the engine produced them
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A fresh pairing code is available (rotates periodically until scanned)
    Pairing { code: String },
    /// The session is open; `user_id` is the linked device id of the owner
    Open { user_id: String },
    /// The session closed. No further events follow on this connection.
    Closed { reason: CloseReason },
    /// A batch of messages was delivered
    Messages {
        kind: UpsertKind,
        messages: Vec<WireMessage>,
    },
}

/// Why an engine session closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Explicit logout; stored credentials are no longer valid
    LoggedOut,
    /// The link to the engine itself dropped
    ConnectionLost,
    /// Any other close reported by the engine
    Other {
        code: Option<u16>,
        message: Option<String>,
    },
}

impl CloseReason {
    /// Map an engine close report to a reason.
    pub fn from_report(code: Option<u16>, message: Option<String>) -> Self {
        let said_logged_out = message
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("loggedout"));
        if code == Some(LOGGED_OUT_STATUS) || said_logged_out {
            Self::LoggedOut
        } else {
            Self::Other { code, message }
        }
    }

    pub fn is_logged_out(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::LoggedOut => write!(f, "logged out"),
            CloseReason::ConnectionLost => write!(f, "engine connection lost"),
            CloseReason::Other { code, message } => {
                write!(f, "closed")?;
                if let Some(code) = code {
                    write!(f, " ({})", code)?;
                }
                if let Some(message) = message {
                    write!(f, ": {}", message)?;
                }
                Ok(())
            }
        }
    }
}

/// How a message batch was delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertKind {
    /// Live delivery of new messages
    Notify,
    /// History sync / backfill
    Append,
}

/// Addressing part of a delivered message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    #[serde(default)]
    pub remote_jid: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub id: Option<String>,
    /// Sender inside a group conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
}

/// Text-bearing subset of a message body. Media bodies are not modelled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(default)]
    pub extended_text_message: Option<ExtendedText>,
    /// Control traffic (revokes, ephemeral settings, key shares). Opaque.
    #[serde(default)]
    pub protocol_message: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedText {
    #[serde(default)]
    pub text: Option<String>,
}

/// A single delivered message as reported by the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub key: MessageKey,
    #[serde(default)]
    pub message: Option<MessageContent>,
    /// Unix seconds
    #[serde(default)]
    pub message_timestamp: Option<i64>,
    /// Present when the sender is a verified business account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_biz_name: Option<String>,
}

impl WireMessage {
    pub fn is_protocol(&self) -> bool {
        self.message
            .as_ref()
            .is_some_and(|m| m.protocol_message.is_some())
    }

    /// Plain or extended text body, if any. Empty strings count as no text.
    pub fn text(&self) -> Option<&str> {
        let content = self.message.as_ref()?;
        if let Some(conv) = content.conversation.as_deref()
            && !conv.is_empty()
        {
            return Some(conv);
        }
        content
            .extended_text_message
            .as_ref()
            .and_then(|ext| ext.text.as_deref())
            .filter(|t| !t.is_empty())
    }
}
