//! Conversations: persistence, contacts and the lifecycle engine.

pub mod contacts;
pub mod engine;
pub mod models;
pub mod repo;

pub use engine::ConversationEngine;
pub use models::{
    Contact, Conversation, ConversationDetail, ConversationStatus, InboundMessage, Message,
    MessageType, NewContact, OutgoingMessage, SendOutcome, SenderType, Transfer, TransferRequest,
};
