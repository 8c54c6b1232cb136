//! Classification of delivered messages and suppression of our own send echoes.

use std::collections::{HashMap, VecDeque};

use wa_link::{MessageKey, WireMessage, jid};

use crate::models::{InboundMessage, OutboundMessage, now_millis};

/// How many dispatched message ids are remembered for echo detection
const SENT_ID_MEMORY: usize = 256;

/// What to do with one delivered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Classified {
    /// Someone wrote to the owner
    Inbound {
        message: InboundMessage,
        key: MessageKey,
    },
    /// The owner wrote, possibly from another linked device
    OwnerSent {
        message: OutboundMessage,
        id: Option<String>,
    },
    Skip(&'static str),
}

pub(crate) fn classify(msg: &WireMessage) -> Classified {
    let Some(remote_jid) = msg.key.remote_jid.as_deref().filter(|j| !j.is_empty()) else {
        return Classified::Skip("no conversation id");
    };
    if jid::is_status_broadcast(remote_jid) {
        return Classified::Skip("status broadcast");
    }
    if msg.is_protocol() {
        return Classified::Skip("protocol message");
    }
    let Some(text) = msg.text() else {
        return Classified::Skip("no text body");
    };

    // Relay receive time, the same clock outbound sends are stamped with
    let time = now_millis();

    if msg.key.from_me {
        Classified::OwnerSent {
            message: OutboundMessage {
                jid: remote_jid.to_string(),
                text: text.to_string(),
                time,
            },
            id: msg.key.id.clone(),
        }
    } else {
        Classified::Inbound {
            message: InboundMessage {
                jid: remote_jid.to_string(),
                text: text.to_string(),
                time,
                is_business: msg.verified_biz_name.is_some(),
            },
            key: msg.key.clone(),
        }
    }
}

/// Tracks sends issued by this relay so their echoes are not recorded twice.
///
/// An echo can arrive before the send call returns its id, so in-flight sends are
/// matched by (jid, text) and completed sends by message id.
#[derive(Debug, Default)]
pub(crate) struct EchoFilter {
    in_flight: HashMap<(String, String), usize>,
    sent_ids: VecDeque<String>,
}

impl EchoFilter {
    pub(crate) fn begin(&mut self, jid: &str, text: &str) {
        *self
            .in_flight
            .entry((jid.to_string(), text.to_string()))
            .or_insert(0) += 1;
    }

    pub(crate) fn finish(&mut self, jid: &str, text: &str, id: Option<String>) {
        let key = (jid.to_string(), text.to_string());
        if let Some(count) = self.in_flight.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(&key);
            }
        }
        if let Some(id) = id {
            self.remember(id);
        }
    }

    /// True when an owner-sent delivery is the echo of one of our sends.
    pub(crate) fn is_echo(&mut self, message: &OutboundMessage, id: Option<&str>) -> bool {
        if let Some(id) = id
            && self.sent_ids.iter().any(|known| known == id)
        {
            return true;
        }
        let key = (message.jid.clone(), message.text.clone());
        if self.in_flight.contains_key(&key) {
            if let Some(id) = id {
                self.remember(id.to_string());
            }
            return true;
        }
        false
    }

    fn remember(&mut self, id: String) {
        if self.sent_ids.len() >= SENT_ID_MEMORY {
            self.sent_ids.pop_front();
        }
        self.sent_ids.push_back(id);
    }
}
