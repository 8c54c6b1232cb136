pub mod chats;
pub mod health;
pub mod websocket;
pub mod whatsapp;

// Re-export all handlers for easy route registration
pub use chats::{
    list_business_chats, list_chats, list_group_chats, list_messages, list_unread_chats,
    mark_chat_read,
};
pub use health::{health_handler, health_live_handler, health_ready_handler, metrics_handler};
pub use websocket::viewer_websocket_handler;
pub use whatsapp::{
    check_number, connect_handler, export_chat, get_qr, get_status, logout_handler, send_message,
};
