//! Helpers for the engine's addressing scheme (JIDs).
//!
//! Individual chats look like `15551230000@s.whatsapp.net`, groups end in `@g.us`,
//! and status updates arrive on the `status@broadcast` pseudo-conversation.

/// Server part for individual accounts
pub const USER_SERVER: &str = "s.whatsapp.net";

/// Suffix carried by every group conversation
pub const GROUP_SUFFIX: &str = "@g.us";

/// Pseudo-conversation used for status updates
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// Build an individual-chat JID from a raw phone number.
///
/// Leading `+` and any whitespace are stripped, so `"+1 555 123"` and `"1555123"`
/// address the same chat.
pub fn user_jid(number: &str) -> String {
    let digits: String = number
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    format!("{}@{}", digits, USER_SERVER)
}

pub fn is_group(jid: &str) -> bool {
    jid.ends_with(GROUP_SUFFIX)
}

pub fn is_status_broadcast(jid: &str) -> bool {
    jid == STATUS_BROADCAST
}

/// The user part of a JID (`15551230000` for `15551230000@s.whatsapp.net`).
pub fn user_part(jid: &str) -> &str {
    jid.split('@').next().unwrap_or(jid)
}

/// Owner phone number from the user id the engine reports on session open.
///
/// Linked-device ids carry a device suffix (`15551230000:12@s.whatsapp.net`);
/// both the device and the server are dropped.
pub fn owner_number(user_id: &str) -> String {
    let user = user_part(user_id);
    user.split(':').next().unwrap_or(user).to_string()
}
