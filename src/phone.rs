//! Phone number normalization.
//!
//! Conversations and contacts are keyed by the digits of the customer's
//! number. Gateways deliver WhatsApp JIDs (`5511999998888@c.us`), agents
//! type `+55 (11) 99999-8888`; both must land on the same key.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

fn jid_pattern() -> &'static Regex {
    static JID: OnceLock<Regex> = OnceLock::new();
    JID.get_or_init(|| {
        Regex::new(r"^\s*([0-9]+)(?::[0-9]+)?@(?:c\.us|s\.whatsapp\.net)\s*$")
            .expect("static JID pattern is valid")
    })
}

/// Reduce a phone number or JID to its digits.
pub fn normalize_phone(raw: &str) -> Result<String> {
    let digits: String = match jid_pattern().captures(raw) {
        Some(caps) => caps[1].to_string(),
        None => raw.chars().filter(|c| c.is_ascii_digit()).collect(),
    };

    if digits.is_empty() {
        return Err(Error::invalid(format!("'{}' is not a phone number", raw)));
    }
    Ok(digits)
}

/// WhatsApp chat id for a stored number. The gateway addresses chats, not
/// bare numbers; ids that already carry a server suffix pass through.
pub fn to_chat_id(phone: &str) -> String {
    if phone.contains('@') {
        phone.to_string()
    } else {
        format!("{}@c.us", phone)
    }
}

/// Name shown for a customer who never told us theirs.
pub fn fallback_contact_name(phone: &str) -> String {
    let start = phone.len().saturating_sub(4);
    format!("Customer {}", &phone[start..])
}
