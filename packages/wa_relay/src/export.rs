//! Plain-text chat transcripts for download.

use chrono::{Local, TimeZone};
use std::fmt::Write;

use wa_link::jid;

use crate::models::MessageRecord;

/// Attachment name offered to the browser
pub fn transcript_filename(chat_jid: &str) -> String {
    format!("chat-{}.txt", jid::user_part(chat_jid))
}

/// Render a conversation as text: a `Chat with <number>` header, then one block per
/// message (`Me|User | <local time>`, the text, a blank line).
pub fn render_transcript(chat_jid: &str, messages: &[MessageRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Chat with {}", jid::user_part(chat_jid));
    out.push('\n');

    for m in messages {
        let who = if m.from_me { "Me" } else { "User" };
        let _ = writeln!(out, "{} | {}", who, local_time(m.time));
        let _ = writeln!(out, "{}", m.text);
        out.push('\n');
    }
    out
}

fn local_time(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => millis.to_string(),
    }
}
