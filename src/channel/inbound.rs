//! Inbound channel adapter.
//!
//! Turns provider deliveries into [`InboundMessage`]s for the engine and
//! answers the provider's webhook verification handshake. Two delivery
//! formats are understood:
//! - the cloud webhook batch (`entry[].changes[].value.messages[]`)
//! - the local gateway's single message (`{from, body}`)

use serde::Deserialize;

use crate::conversation::{ConversationEngine, InboundMessage, MessageType};
use crate::error::{Error, Result};
use crate::store::Database;

use super::connections;

/// Cloud webhook body.
#[derive(Deserialize, Debug, Default)]
pub struct CloudPayload {
    #[serde(default)]
    pub entry: Vec<CloudEntry>,
}

#[derive(Deserialize, Debug, Default)]
pub struct CloudEntry {
    #[serde(default)]
    pub changes: Vec<CloudChange>,
}

#[derive(Deserialize, Debug, Default)]
pub struct CloudChange {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: CloudValue,
}

#[derive(Deserialize, Debug, Default)]
pub struct CloudValue {
    #[serde(default)]
    pub contacts: Vec<CloudContact>,
    #[serde(default)]
    pub messages: Vec<CloudMessage>,
}

#[derive(Deserialize, Debug)]
pub struct CloudContact {
    pub wa_id: Option<String>,
    pub profile: Option<CloudProfile>,
}

#[derive(Deserialize, Debug)]
pub struct CloudProfile {
    pub name: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CloudMessage {
    pub from: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub text: Option<CloudText>,
    pub image: Option<CloudMedia>,
    pub document: Option<CloudMedia>,
    pub audio: Option<CloudMedia>,
}

#[derive(Deserialize, Debug)]
pub struct CloudText {
    pub body: String,
}

#[derive(Deserialize, Debug)]
pub struct CloudMedia {
    pub id: Option<String>,
    pub caption: Option<String>,
    pub filename: Option<String>,
}

/// Local gateway body.
#[derive(Deserialize, Debug)]
pub struct GatewayPayload {
    pub from: String,
    #[serde(default)]
    pub body: String,
    pub name: Option<String>,
}

fn message_type_of(kind: Option<&str>) -> MessageType {
    match kind {
        Some("image") => MessageType::Image,
        Some("document") => MessageType::Document,
        Some("audio") | Some("voice") => MessageType::Audio,
        _ => MessageType::Text,
    }
}

fn normalize_cloud_message(message: &CloudMessage, contacts: &[CloudContact]) -> InboundMessage {
    let message_type = message_type_of(message.kind.as_deref());
    let media = match message_type {
        MessageType::Image => message.image.as_ref(),
        MessageType::Document => message.document.as_ref(),
        MessageType::Audio => message.audio.as_ref(),
        MessageType::Text | MessageType::System => None,
    };

    let content = match (&message.text, media) {
        (Some(text), _) => text.body.clone(),
        (None, Some(media)) => media
            .caption
            .clone()
            .or_else(|| media.filename.clone())
            .unwrap_or_else(|| format!("[{}]", message_type.as_str())),
        (None, None) => String::new(),
    };

    let display_name = contacts
        .iter()
        .find(|c| c.wa_id.as_deref() == Some(message.from.as_str()))
        .or_else(|| contacts.first())
        .and_then(|c| c.profile.as_ref())
        .and_then(|p| p.name.clone());

    InboundMessage {
        phone: message.from.clone(),
        display_name,
        content,
        message_type,
        file_path: media.and_then(|m| m.id.clone()),
    }
}

/// Flatten a cloud batch into messages, skipping non-message changes.
pub fn normalize_cloud_payload(payload: &CloudPayload) -> Vec<InboundMessage> {
    payload
        .entry
        .iter()
        .flat_map(|entry| entry.changes.iter())
        .filter(|change| change.field == "messages")
        .flat_map(|change| {
            change
                .value
                .messages
                .iter()
                .map(move |message| normalize_cloud_message(message, &change.value.contacts))
        })
        .collect()
}

pub fn normalize_gateway_payload(payload: &GatewayPayload) -> InboundMessage {
    InboundMessage {
        phone: payload.from.clone(),
        display_name: payload.name.clone(),
        content: payload.body.clone(),
        message_type: MessageType::Text,
        file_path: None,
    }
}

/// Webhook verification handshake: echo the challenge when an active
/// connection owns `verify_token`.
pub fn verify_webhook(
    db: &Database,
    mode: Option<&str>,
    verify_token: Option<&str>,
    challenge: Option<&str>,
) -> Result<String> {
    if let Some(mode) = mode {
        if mode != "subscribe" {
            return Err(Error::denied(format!("unsupported hub.mode '{}'", mode)));
        }
    }
    let (Some(token), Some(challenge)) = (verify_token, challenge) else {
        return Err(Error::denied("verification token and challenge are required"));
    };

    let conn = db.connect()?;
    match connections::find_active_by_verify_token(&conn, token)? {
        Some(connection) => {
            tracing::info!("Webhook verified for connection {}", connection.id);
            Ok(challenge.to_string())
        }
        None => Err(Error::denied("invalid verification token")),
    }
}

/// Summary of a delivered batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DeliveryReport {
    pub accepted: usize,
    pub failed: usize,
}

/// Hand every message to the engine. A bad message is logged and skipped;
/// it does not stop the rest of the batch.
pub fn deliver(engine: &ConversationEngine, messages: Vec<InboundMessage>) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for message in messages {
        let phone = message.phone.clone();
        match engine.ingest_customer_message(message) {
            Ok(stored) => {
                report.accepted += 1;
                tracing::debug!("Stored inbound message {} from {}", stored.id, phone);
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!("Failed to ingest message from {}: {}", phone, e);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestEnv;

    fn cloud_batch() -> CloudPayload {
        serde_json::from_value(serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "1",
                "changes": [
                    {
                        "field": "messages",
                        "value": {
                            "contacts": [{"wa_id": "5511999998888", "profile": {"name": "Maria"}}],
                            "messages": [
                                {"from": "5511999998888", "id": "wamid.1", "type": "text", "text": {"body": "Hello"}},
                                {"from": "5511999998888", "id": "wamid.2", "type": "image", "image": {"id": "media-1", "caption": "receipt"}}
                            ]
                        }
                    },
                    {"field": "statuses", "value": {}}
                ]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_normalize_cloud_batch() {
        let messages = normalize_cloud_payload(&cloud_batch());
        assert_eq!(messages.len(), 2);

        assert_eq!(messages[0].phone, "5511999998888");
        assert_eq!(messages[0].display_name.as_deref(), Some("Maria"));
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[0].message_type, MessageType::Text);

        assert_eq!(messages[1].message_type, MessageType::Image);
        assert_eq!(messages[1].content, "receipt");
        assert_eq!(messages[1].file_path.as_deref(), Some("media-1"));
    }

    #[test]
    fn test_unknown_type_is_text() {
        assert_eq!(message_type_of(Some("sticker")), MessageType::Text);
        assert_eq!(message_type_of(Some("voice")), MessageType::Audio);
        assert_eq!(message_type_of(None), MessageType::Text);
    }

    #[test]
    fn test_gateway_payload() {
        let payload: GatewayPayload =
            serde_json::from_str(r#"{"from": "5511999998888@c.us", "body": "Oi"}"#).unwrap();
        let message = normalize_gateway_payload(&payload);
        assert_eq!(message.phone, "5511999998888@c.us");
        assert_eq!(message.content, "Oi");
        assert!(message.display_name.is_none());
    }

    #[test]
    fn test_verify_handshake() {
        let env = TestEnv::new();
        env.connect_channel("verify-me");

        let echoed = verify_webhook(&env.db, Some("subscribe"), Some("verify-me"), Some("12345")).unwrap();
        assert_eq!(echoed, "12345");

        let wrong = verify_webhook(&env.db, Some("subscribe"), Some("nope"), Some("12345"));
        assert!(matches!(wrong, Err(Error::AccessDenied(_))));

        let missing = verify_webhook(&env.db, None, Some("verify-me"), None);
        assert!(matches!(missing, Err(Error::AccessDenied(_))));

        let bad_mode = verify_webhook(&env.db, Some("unsubscribe"), Some("verify-me"), Some("1"));
        assert!(matches!(bad_mode, Err(Error::AccessDenied(_))));
    }

    #[test]
    fn test_deliver_batch_continues_after_failure() {
        let env = TestEnv::new();
        let mut messages = normalize_cloud_payload(&cloud_batch());
        messages.insert(
            0,
            InboundMessage {
                phone: "not-a-number".to_string(),
                display_name: None,
                content: "lost".to_string(),
                message_type: MessageType::Text,
                file_path: None,
            },
        );

        let report = deliver(&env.engine, messages);
        assert_eq!(report, DeliveryReport { accepted: 2, failed: 1 });

        let conn = env.db.connect().unwrap();
        let conversation = crate::conversation::repo::find_active_by_phone(&conn, "5511999998888")
            .unwrap()
            .unwrap();
        assert_eq!(conversation.message_count, 2);
        assert_eq!(conversation.contact_name, "Maria");
    }
}
