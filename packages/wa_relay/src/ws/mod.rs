//! Viewer WebSocket
//!
//! Every browser tab holds one connection that:
//! - Receives lifecycle events (pairing code, status, ready) and new messages
//! - Tells the relay which chat it has open, which decides unread counting

mod fanout;
mod handler;
mod protocol;

pub use fanout::{Fanout, greeting};
pub use handler::handle_viewer_ws;
pub use protocol::{ClientMessage, ServerMessage};
