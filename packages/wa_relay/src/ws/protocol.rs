//! WebSocket Protocol Types
//!
//! Events pushed to viewers and the one message viewers send back.

use serde::{Deserialize, Serialize};

use crate::models::MessageRecord;
use crate::session::ConnectionStatus;

/// Messages sent FROM the server TO viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// A new pairing code is waiting to be scanned
    #[serde(rename = "whatsapp:qr")]
    Qr {
        /// SVG QR code as a data URL
        qr: String,
    },
    #[serde(rename = "whatsapp:status")]
    Status(ConnectionStatus),
    /// The engine session just opened
    #[serde(rename = "whatsapp:ready")]
    Ready,
    #[serde(rename = "chat:newMessage")]
    NewMessage(MessageRecord),
}

/// Messages sent FROM viewers TO the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// The chat this viewer has open; `null` or missing closes it
    #[serde(rename = "chat:active")]
    ChatActive {
        #[serde(default)]
        jid: Option<String>,
    },
}
