//! Notification dispatcher.
//!
//! Fire-and-forget fan-out of conversation events to whoever subscribed
//! (push transports live outside this crate). Publishing never blocks and
//! never fails the caller.

use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ConversationCreated,
    NewMessage,
    ConversationTransferred,
    ConversationClosed,
    ConversationReopened,
}

#[derive(Serialize, Clone, Debug)]
pub struct Notification {
    pub conversation_id: i64,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Publish an event for a conversation's channel.
    pub fn notify<T: Serialize>(&self, conversation_id: i64, kind: NotificationKind, payload: &T) {
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Dropping {:?} notification for {}: {}", kind, conversation_id, e);
                return;
            }
        };

        let notification = Notification {
            conversation_id,
            kind,
            payload,
        };
        if self.tx.send(notification).is_err() {
            tracing::trace!("No subscribers for {:?} on conversation {}", kind, conversation_id);
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
