//! WA Link - connection contract for an external WhatsApp protocol engine
//!
//! This crate knows nothing about chats, unread counters or HTTP. It describes the
//! collaborator the relay talks to: something that can establish a linked-device
//! session from stored credentials, stream lifecycle and message events back, and
//! accept outbound requests (send, logout, number lookup, read receipts).
//!
//! The wire protocol, end-to-end encryption and QR pairing all live in the engine.
//! [`BridgeConnector`] reaches such an engine over a JSON WebSocket.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use wa_link::{BridgeConnector, Connector, LinkEvent};
//!
//! #[tokio::main]
//! async fn main() {
//!     let connector = BridgeConnector::new("ws://127.0.0.1:8765");
//!     let mut session = connector.connect(Path::new("/tmp/creds")).await.unwrap();
//!
//!     while let Some(event) = session.events.recv().await {
//!         match event {
//!             LinkEvent::Pairing { code } => println!("scan: {}", code),
//!             LinkEvent::Open { user_id } => println!("linked as {}", user_id),
//!             LinkEvent::Closed { reason } => {
//!                 println!("closed: {}", reason);
//!                 break;
//!             }
//!             LinkEvent::Messages { messages, .. } => println!("{} messages", messages.len()),
//!         }
//!     }
//! }
//! ```

mod bridge;
mod connector;
mod error;
mod event;
pub mod jid;

pub use bridge::BridgeConnector;
pub use connector::{Connector, LinkHandle, LinkSession, Registration};
pub use error::LinkError;
pub use event::{
    CloseReason, ExtendedText, LinkEvent, MessageContent, MessageKey, UpsertKind, WireMessage,
};
