//! Conversation, message, transfer and contact value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::sql_text_enum;

/// Lifecycle state of a conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Open,
    Transferred,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Open => "open",
            ConversationStatus::Transferred => "transferred",
            ConversationStatus::Closed => "closed",
        }
    }

    /// Open and transferred conversations still belong to their contact.
    pub fn is_active(&self) -> bool {
        !matches!(self, ConversationStatus::Closed)
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ConversationStatus::Open),
            "transferred" => Ok(ConversationStatus::Transferred),
            "closed" => Ok(ConversationStatus::Closed),
            other => Err(format!("unknown conversation status '{}'", other)),
        }
    }
}

sql_text_enum!(ConversationStatus);

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Customer,
    Agent,
    System,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::Customer => "customer",
            SenderType::Agent => "agent",
            SenderType::System => "system",
        }
    }
}

impl std::str::FromStr for SenderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(SenderType::Customer),
            "agent" => Ok(SenderType::Agent),
            "system" => Ok(SenderType::System),
            other => Err(format!("unknown sender type '{}'", other)),
        }
    }
}

sql_text_enum!(SenderType);

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Document,
    Audio,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Document => "document",
            MessageType::Audio => "audio",
            MessageType::System => "system",
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "document" => Ok(MessageType::Document),
            "audio" => Ok(MessageType::Audio),
            "system" => Ok(MessageType::System),
            other => Err(format!("unknown message type '{}'", other)),
        }
    }
}

sql_text_enum!(MessageType);

/// Transfers complete immediately; the column leaves room for an
/// acceptance step.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Completed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(TransferStatus::Completed),
            other => Err(format!("unknown transfer status '{}'", other)),
        }
    }
}

sql_text_enum!(TransferStatus);

#[derive(Serialize, Clone, Debug)]
pub struct Conversation {
    pub id: i64,
    pub contact_name: String,
    pub contact_phone: String,
    pub status: ConversationStatus,
    pub assigned_agent_id: Option<i64>,
    pub assigned_agent_name: Option<String>,
    pub department_id: Option<i64>,
    pub department_name: Option<String>,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Clone, Debug)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_type: SenderType,
    pub sender_id: Option<i64>,
    pub sender_name: String,
    pub content: String,
    pub message_type: MessageType,
    pub file_path: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Clone, Debug)]
pub struct Transfer {
    pub id: i64,
    pub conversation_id: i64,
    pub from_agent_id: Option<i64>,
    pub from_agent_name: Option<String>,
    pub from_department_id: Option<i64>,
    pub from_department_name: Option<String>,
    pub to_department_id: i64,
    pub to_department_name: String,
    pub to_agent_id: Option<i64>,
    pub to_agent_name: Option<String>,
    pub reason: Option<String>,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
}

/// A conversation with its full history.
#[derive(Serialize, Clone, Debug)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
    pub transfers: Vec<Transfer>,
}

/// Address-book entry.
#[derive(Serialize, Clone, Debug)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub created_by_user_id: Option<i64>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NewContact {
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
}

/// A customer message as delivered by the channel adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub phone: String,
    pub display_name: Option<String>,
    pub content: String,
    pub message_type: MessageType,
    pub file_path: Option<String>,
}

/// Agent-authored message body.
#[derive(Deserialize, Clone, Debug)]
pub struct OutgoingMessage {
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub file_path: Option<String>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            message_type: MessageType::Text,
            file_path: None,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct TransferRequest {
    pub to_department_id: i64,
    pub to_agent_id: Option<i64>,
    pub reason: Option<String>,
}

/// Result of an agent send. The message is stored even when the relay
/// to the messaging channel failed.
#[derive(Serialize, Clone, Debug)]
pub struct SendOutcome {
    #[serde(rename = "data")]
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}
