//! Conversation engine - lifecycle, message ingestion and transfers.
//!
//! State machine:
//!
//! ```text
//!            transfer            transfer
//!   open ───────────────▶ transferred ◀──┘
//!    ▲ │                       │
//!    │ └──── close ──▶ closed ◀┘ close
//!    └───── reopen ─────┘
//! ```
//!
//! Every mutation commits as one transaction: the message, transfer and
//! conversation row change together or not at all. Activity logging and
//! notifications happen after commit and never fail the operation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::access::{authorize, Action, Resource};
use crate::activity::{self, EventType};
use crate::channel::ChannelRelay;
use crate::error::{Error, Result};
use crate::identity::{departments, users, Department, User};
use crate::notify::{NotificationKind, Notifier};
use crate::phone::{fallback_contact_name, normalize_phone};
use crate::store::{self, Database};

use super::contacts;
use super::models::{
    Conversation, ConversationDetail, ConversationStatus, InboundMessage, Message, MessageType,
    OutgoingMessage, SendOutcome, SenderType, Transfer, TransferRequest,
};
use super::repo::{self, TransferRoute};

#[derive(Clone)]
pub struct ConversationEngine {
    db: Database,
    notifier: Notifier,
    relay: Arc<dyn ChannelRelay>,
    default_department: String,
}

impl ConversationEngine {
    pub fn new(
        db: Database,
        notifier: Notifier,
        relay: Arc<dyn ChannelRelay>,
        default_department: impl Into<String>,
    ) -> Self {
        Self {
            db,
            notifier,
            relay,
            default_department: default_department.into(),
        }
    }

    /// Active conversation for `phone`, created when there is none.
    ///
    /// Returns whether a new row was created. Department falls back to the
    /// default department when the hint does not resolve.
    pub fn find_or_create_for_contact(
        &self,
        phone: &str,
        name: &str,
        department_hint: Option<i64>,
    ) -> Result<(Conversation, bool)> {
        let phone = normalize_phone(phone)?;
        let mut conn = self.db.connect()?;
        let tx = store::begin_write(&mut conn)?;
        let found = self.find_or_create_in(&tx, &phone, name, department_hint, Utc::now())?;
        tx.commit()?;

        if found.1 {
            self.notifier
                .notify(found.0.id, NotificationKind::ConversationCreated, &found.0);
        }
        Ok(found)
    }

    fn find_or_create_in(
        &self,
        conn: &Connection,
        phone: &str,
        name: &str,
        department_hint: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(Conversation, bool)> {
        if let Some(existing) = repo::find_active_by_phone(conn, phone)? {
            return Ok((existing, false));
        }

        let hinted = match department_hint {
            Some(id) => departments::get_department(conn, id)?.filter(|d| d.is_active),
            None => None,
        };
        let department_id = match hinted {
            Some(department) => department.id,
            None => departments::ensure_department(conn, &self.default_department)?,
        };

        match repo::insert_conversation(conn, name, phone, None, Some(department_id), now) {
            Ok(created) => {
                tracing::info!("Opened conversation {} for {}", created.id, phone);
                Ok((created, true))
            }
            // Another writer opened it first; use theirs.
            Err(e) if e.is_constraint_violation() => {
                tracing::debug!("Lost race opening conversation for {}, re-reading", phone);
                let existing = repo::find_active_by_phone(conn, phone)?.ok_or(e)?;
                Ok((existing, false))
            }
            Err(e) => Err(e),
        }
    }

    /// Agent-initiated conversation with an address-book contact.
    pub fn start_conversation(&self, contact_id: i64, agent: &User) -> Result<Conversation> {
        authorize(agent, Action::StartConversation, Resource::System)?;

        let mut conn = self.db.connect()?;
        let tx = store::begin_write(&mut conn)?;
        let contact = contacts::require_contact(&tx, contact_id)?;

        if let Some(existing) = repo::find_active_by_phone(&tx, &contact.phone_number)? {
            return Err(Error::Conflict(format!(
                "conversation {} is already active for {}",
                existing.id, contact.phone_number
            )));
        }

        let conversation = repo::insert_conversation(
            &tx,
            &contact.name,
            &contact.phone_number,
            Some(agent.id),
            agent.department_id,
            Utc::now(),
        )
        .map_err(|e| {
            if e.is_constraint_violation() {
                Error::Conflict(format!(
                    "a conversation is already active for {}",
                    contact.phone_number
                ))
            } else {
                e
            }
        })?;
        tx.commit()?;

        activity::record(
            &self.db,
            EventType::ConversationStarted,
            Some(agent.id),
            &format!("{} started a conversation with {}", agent.name, contact.name),
        );
        self.notifier
            .notify(conversation.id, NotificationKind::ConversationCreated, &conversation);
        Ok(conversation)
    }

    /// Attach a customer message to the contact's active conversation.
    ///
    /// No authorization: the channel boundary already vouched for the sender.
    pub fn ingest_customer_message(&self, inbound: InboundMessage) -> Result<Message> {
        let phone = normalize_phone(&inbound.phone)?;
        let name = inbound
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| fallback_contact_name(&phone));

        let mut conn = self.db.connect()?;
        let tx = store::begin_write(&mut conn)?;
        let now = Utc::now();
        let (conversation, created) = self.find_or_create_in(&tx, &phone, &name, None, now)?;
        let message = repo::insert_message(
            &tx,
            conversation.id,
            SenderType::Customer,
            None,
            &inbound.content,
            inbound.message_type,
            inbound.file_path.as_deref(),
            now,
        )?;
        repo::touch(&tx, conversation.id, None, now)?;
        tx.commit()?;

        if created {
            self.notifier
                .notify(conversation.id, NotificationKind::ConversationCreated, &conversation);
        }
        self.notifier
            .notify(conversation.id, NotificationKind::NewMessage, &message);
        Ok(message)
    }

    /// Store an agent message and relay text to the customer.
    ///
    /// A relay failure does not undo the stored message; it comes back as
    /// the outcome's warning.
    pub async fn send_agent_message(
        &self,
        conversation_id: i64,
        agent: &User,
        outgoing: OutgoingMessage,
    ) -> Result<SendOutcome> {
        let (message, phone) = self.store_agent_message(conversation_id, agent, &outgoing)?;

        let warning = if message.message_type == MessageType::Text {
            match self.relay.send_text(&phone, &message.content).await {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!(
                        "Message {} stored but {} relay failed: {}",
                        message.id,
                        self.relay.name(),
                        e
                    );
                    Some(e.to_string())
                }
            }
        } else {
            None
        };

        self.notifier
            .notify(conversation_id, NotificationKind::NewMessage, &message);
        Ok(SendOutcome { message, warning })
    }

    fn store_agent_message(
        &self,
        conversation_id: i64,
        agent: &User,
        outgoing: &OutgoingMessage,
    ) -> Result<(Message, String)> {
        let mut conn = self.db.connect()?;
        let tx = store::begin_write(&mut conn)?;
        let conversation = repo::require_conversation(&tx, conversation_id)?;
        authorize(agent, Action::SendMessage, Resource::Conversation(&conversation))?;

        if outgoing.content.trim().is_empty() {
            return Err(Error::invalid("message content is required"));
        }
        if outgoing.message_type == MessageType::System {
            return Err(Error::invalid("agents cannot send system messages"));
        }

        let now = Utc::now();
        let message = repo::insert_message(
            &tx,
            conversation_id,
            SenderType::Agent,
            Some(agent.id),
            &outgoing.content,
            outgoing.message_type,
            outgoing.file_path.as_deref(),
            now,
        )?;
        repo::touch(&tx, conversation_id, Some(agent.id), now)?;
        tx.commit()?;

        Ok((message, conversation.contact_phone))
    }

    /// Move a conversation to another department, optionally to a named agent.
    pub fn transfer(
        &self,
        conversation_id: i64,
        actor: &User,
        request: &TransferRequest,
    ) -> Result<Transfer> {
        let mut conn = self.db.connect()?;
        let tx = store::begin_write(&mut conn)?;
        let conversation = repo::require_conversation(&tx, conversation_id)?;
        authorize(actor, Action::Transfer, Resource::Conversation(&conversation))?;

        if conversation.status == ConversationStatus::Closed {
            return Err(Error::invalid(
                "closed conversations must be reopened before a transfer",
            ));
        }

        let to_department = departments::require_department(&tx, request.to_department_id)?;
        if !to_department.is_active {
            return Err(Error::invalid(format!(
                "department '{}' is inactive",
                to_department.name
            )));
        }
        let to_agent = match request.to_agent_id {
            Some(agent_id) => Some(validate_transfer_agent(&tx, agent_id, &to_department)?),
            None => None,
        };
        let reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());

        let now = Utc::now();
        let route = TransferRoute {
            from_agent_id: Some(actor.id),
            from_department_id: conversation.department_id,
            to_department_id: to_department.id,
            to_agent_id: to_agent.as_ref().map(|a| a.id),
            reason,
        };
        let transfer = repo::insert_transfer(&tx, conversation_id, route, now)?;
        let notice = describe_transfer(actor, &conversation, &to_department, to_agent.as_ref(), reason);
        repo::insert_system_message(&tx, conversation_id, &notice, now)?;
        repo::set_routing(
            &tx,
            conversation_id,
            ConversationStatus::Transferred,
            to_department.id,
            route.to_agent_id,
            now,
        )?;
        tx.commit()?;

        tracing::info!(
            conversation_id,
            to_department = to_department.id,
            to_agent = ?route.to_agent_id,
            "Conversation transferred"
        );
        activity::record(&self.db, EventType::ConversationTransferred, Some(actor.id), &notice);
        self.notifier
            .notify(conversation_id, NotificationKind::ConversationTransferred, &transfer);
        Ok(transfer)
    }

    /// Close a conversation. Closing a closed conversation changes nothing.
    pub fn close(&self, conversation_id: i64, actor: &User) -> Result<Conversation> {
        self.change_status(
            conversation_id,
            actor,
            Action::Close,
            ConversationStatus::Closed,
        )
    }

    /// Reopen a closed conversation. Reopening an active one changes nothing.
    pub fn reopen(&self, conversation_id: i64, actor: &User) -> Result<Conversation> {
        self.change_status(
            conversation_id,
            actor,
            Action::Reopen,
            ConversationStatus::Open,
        )
    }

    fn change_status(
        &self,
        conversation_id: i64,
        actor: &User,
        action: Action,
        target: ConversationStatus,
    ) -> Result<Conversation> {
        let mut conn = self.db.connect()?;
        let tx = store::begin_write(&mut conn)?;
        let conversation = repo::require_conversation(&tx, conversation_id)?;
        authorize(actor, action, Resource::Conversation(&conversation))?;

        let (event, kind, verb) = match target {
            ConversationStatus::Closed => {
                if conversation.status == ConversationStatus::Closed {
                    return Ok(conversation);
                }
                (EventType::ConversationClosed, NotificationKind::ConversationClosed, "closed")
            }
            ConversationStatus::Open => {
                if conversation.status.is_active() {
                    return Ok(conversation);
                }
                if let Some(other) = repo::find_active_by_phone(&tx, &conversation.contact_phone)? {
                    return Err(Error::Conflict(format!(
                        "conversation {} is already active for {}",
                        other.id, conversation.contact_phone
                    )));
                }
                (EventType::ConversationReopened, NotificationKind::ConversationReopened, "reopened")
            }
            ConversationStatus::Transferred => {
                return Err(Error::invalid("use transfer to move a conversation"));
            }
        };

        let now = Utc::now();
        let notice = format!("Conversation {} by {}", verb, actor.name);
        repo::set_status(&tx, conversation_id, target, now)?;
        repo::insert_system_message(&tx, conversation_id, &notice, now)?;
        let updated = repo::require_conversation(&tx, conversation_id)?;
        tx.commit()?;

        activity::record(
            &self.db,
            event,
            Some(actor.id),
            &format!("{} (#{}, {})", notice, conversation_id, conversation.contact_name),
        );
        self.notifier.notify(conversation_id, kind, &updated);
        Ok(updated)
    }

    /// Conversations `user` may access, optionally filtered by status.
    pub fn list_conversations(
        &self,
        user: &User,
        status: Option<ConversationStatus>,
    ) -> Result<Vec<Conversation>> {
        if !user.is_active {
            return Ok(Vec::new());
        }
        let conn = self.db.connect()?;
        repo::list_for_user(&conn, user, status)
    }

    /// A conversation with its messages and transfer history.
    pub fn conversation_detail(&self, conversation_id: i64, user: &User) -> Result<ConversationDetail> {
        let conn = self.db.connect()?;
        let conversation = repo::require_conversation(&conn, conversation_id)?;
        authorize(user, Action::ViewConversation, Resource::Conversation(&conversation))?;

        Ok(ConversationDetail {
            messages: repo::list_messages(&conn, conversation_id)?,
            transfers: repo::list_transfers(&conn, conversation_id)?,
            conversation,
        })
    }

    /// Remove a conversation along with its messages and transfers.
    pub fn delete_conversation(&self, conversation_id: i64, actor: &User) -> Result<()> {
        authorize(actor, Action::DeleteConversation, Resource::System)?;

        let mut conn = self.db.connect()?;
        let tx = store::begin_write(&mut conn)?;
        let conversation = repo::require_conversation(&tx, conversation_id)?;
        repo::delete_conversation(&tx, conversation_id)?;
        tx.commit()?;

        activity::record(
            &self.db,
            EventType::ConversationDeleted,
            Some(actor.id),
            &format!(
                "{} deleted conversation #{} with {}",
                actor.name, conversation_id, conversation.contact_name
            ),
        );
        Ok(())
    }
}

fn validate_transfer_agent(conn: &Connection, agent_id: i64, department: &Department) -> Result<User> {
    let agent = users::require_user(conn, agent_id)?;
    if !agent.is_active {
        return Err(Error::invalid(format!("user '{}' is inactive", agent.username)));
    }
    if agent.department_id != Some(department.id) {
        return Err(Error::invalid(format!(
            "user '{}' does not belong to department '{}'",
            agent.username, department.name
        )));
    }
    Ok(agent)
}

fn describe_transfer(
    actor: &User,
    conversation: &Conversation,
    to_department: &Department,
    to_agent: Option<&User>,
    reason: Option<&str>,
) -> String {
    let from = conversation
        .department_name
        .as_deref()
        .unwrap_or("no department");
    let mut notice = format!(
        "Conversation transferred from {} to {} by {}",
        from, to_department.name, actor.name
    );
    if let Some(agent) = to_agent {
        notice.push_str(&format!(", assigned to {}", agent.name));
    }
    if let Some(reason) = reason {
        notice.push_str(&format!(". Reason: {}", reason));
    }
    notice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::NewContact;
    use crate::identity::Role;
    use crate::testing::TestEnv;

    fn hello(phone: &str) -> InboundMessage {
        InboundMessage {
            phone: phone.to_string(),
            display_name: None,
            content: "Hello".to_string(),
            message_type: MessageType::Text,
            file_path: None,
        }
    }

    fn customer_conversation(env: &TestEnv, phone: &str) -> Conversation {
        let message = env.engine.ingest_customer_message(hello(phone)).unwrap();
        let conn = env.db.connect().unwrap();
        repo::require_conversation(&conn, message.conversation_id).unwrap()
    }

    fn count_messages(env: &TestEnv, conversation_id: i64) -> usize {
        let conn = env.db.connect().unwrap();
        repo::list_messages(&conn, conversation_id).unwrap().len()
    }

    #[test]
    fn test_first_customer_message_opens_conversation_in_default_department() {
        let env = TestEnv::new();

        let message = env.engine.ingest_customer_message(hello("5511999998888")).unwrap();
        assert_eq!(message.sender_type, SenderType::Customer);
        assert_eq!(message.content, "Hello");
        assert!(message.sender_id.is_none());

        let conn = env.db.connect().unwrap();
        let conversation = repo::require_conversation(&conn, message.conversation_id).unwrap();
        assert_eq!(conversation.status, ConversationStatus::Open);
        assert_eq!(conversation.department_name.as_deref(), Some("Suporte"));
        assert_eq!(conversation.contact_phone, "5511999998888");
        assert_eq!(conversation.contact_name, "Customer 8888");
        assert!(conversation.assigned_agent_id.is_none());

        let messages = repo::list_messages(&conn, conversation.id).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender_type, SenderType::Customer);
        assert_eq!(messages[0].content, "Hello");
    }

    #[test]
    fn test_default_department_created_when_missing() {
        let env = TestEnv::with_default_department("Atendimento");
        let conversation = customer_conversation(&env, "5511911112222");
        assert_eq!(conversation.department_name.as_deref(), Some("Atendimento"));
    }

    #[test]
    fn test_follow_up_messages_reuse_conversation_and_bump_updated_at() {
        let env = TestEnv::new();
        let first = customer_conversation(&env, "5511999998888");

        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = env
            .engine
            .ingest_customer_message(hello("+55 11 99999-8888"))
            .unwrap();
        assert_eq!(second.conversation_id, first.id);

        let conn = env.db.connect().unwrap();
        let reloaded = repo::require_conversation(&conn, first.id).unwrap();
        assert_eq!(reloaded.message_count, 2);
        assert!(reloaded.updated_at > first.updated_at);
    }

    #[test]
    fn test_concurrent_first_messages_create_one_conversation() {
        let env = TestEnv::new();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = env.engine.clone();
                std::thread::spawn(move || engine.ingest_customer_message(hello("5511977776666")))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let conn = env.db.connect().unwrap();
        let rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM conversations WHERE contact_phone = '5511977776666'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(rows, 1);
        let conversation = repo::find_active_by_phone(&conn, "5511977776666").unwrap().unwrap();
        assert_eq!(conversation.message_count, 4);
    }

    #[test]
    fn test_lost_insert_race_falls_back_to_existing_row() {
        let env = TestEnv::new();
        let existing = customer_conversation(&env, "5511955554444");

        // Skip the lookup and insert directly, as a losing writer would.
        let conn = env.db.connect().unwrap();
        let err = repo::insert_conversation(&conn, "dup", "5511955554444", None, None, Utc::now())
            .unwrap_err();
        assert!(err.is_constraint_violation());

        let (found, created) = env
            .engine
            .find_or_create_for_contact("5511955554444", "Someone", None)
            .unwrap();
        assert!(!created);
        assert_eq!(found.id, existing.id);
    }

    #[test]
    fn test_find_or_create_honours_department_hint() {
        let env = TestEnv::new();
        let (conversation, created) = env
            .engine
            .find_or_create_for_contact("5511933332222", "Lead", Some(env.sales.id))
            .unwrap();
        assert!(created);
        assert_eq!(conversation.department_id, Some(env.sales.id));

        let (unknown_hint, _) = env
            .engine
            .find_or_create_for_contact("5511933331111", "Lead", Some(9999))
            .unwrap();
        assert_eq!(unknown_hint.department_id, Some(env.support.id));
    }

    #[tokio::test]
    async fn test_agent_message_claims_conversation_and_relays() {
        let env = TestEnv::new();
        let conversation = customer_conversation(&env, "5511999998888");
        let mut events = env.notifier.subscribe();

        let outcome = env
            .engine
            .send_agent_message(conversation.id, &env.agent_support, OutgoingMessage::text("Hi, how can I help?"))
            .await
            .unwrap();
        assert!(outcome.warning.is_none());
        assert_eq!(outcome.message.sender_type, SenderType::Agent);
        assert_eq!(outcome.message.sender_id, Some(env.agent_support.id));
        assert_eq!(outcome.message.sender_name, env.agent_support.name);

        let sent = env.relay.sent();
        assert_eq!(sent, vec![("5511999998888".to_string(), "Hi, how can I help?".to_string())]);

        let conn = env.db.connect().unwrap();
        let reloaded = repo::require_conversation(&conn, conversation.id).unwrap();
        assert_eq!(reloaded.assigned_agent_id, Some(env.agent_support.id));
        assert_eq!(reloaded.status, ConversationStatus::Open);

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, NotificationKind::NewMessage);
        assert_eq!(event.conversation_id, conversation.id);
    }

    #[tokio::test]
    async fn test_relay_failure_keeps_message_and_warns() {
        let env = TestEnv::new();
        let conversation = customer_conversation(&env, "5511999998888");
        env.relay.fail_next_sends();

        let outcome = env
            .engine
            .send_agent_message(conversation.id, &env.agent_support, OutgoingMessage::text("Are you there?"))
            .await
            .unwrap();
        assert!(outcome.warning.unwrap().contains("Relay failure"));
        assert_eq!(count_messages(&env, conversation.id), 2);
    }

    #[tokio::test]
    async fn test_media_messages_are_not_relayed() {
        let env = TestEnv::new();
        let conversation = customer_conversation(&env, "5511999998888");

        let outgoing = OutgoingMessage {
            content: "invoice.pdf".to_string(),
            message_type: MessageType::Document,
            file_path: Some("uploads/invoice.pdf".to_string()),
        };
        let outcome = env
            .engine
            .send_agent_message(conversation.id, &env.agent_support, outgoing)
            .await
            .unwrap();
        assert_eq!(outcome.message.file_path.as_deref(), Some("uploads/invoice.pdf"));
        assert!(env.relay.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_validation_and_missing_conversation() {
        let env = TestEnv::new();
        let conversation = customer_conversation(&env, "5511999998888");

        let err = env
            .engine
            .send_agent_message(conversation.id, &env.agent_support, OutgoingMessage::text("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = env
            .engine
            .send_agent_message(4242, &env.agent_support, OutgoingMessage::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(count_messages(&env, conversation.id), 1);
    }

    #[tokio::test]
    async fn test_unrelated_agent_is_denied_everything() {
        let env = TestEnv::new();
        let conversation = customer_conversation(&env, "5511999998888");
        let outsider = &env.agent_sales;

        let send = env
            .engine
            .send_agent_message(conversation.id, outsider, OutgoingMessage::text("hi"))
            .await;
        assert!(matches!(send, Err(Error::AccessDenied(_))));

        let request = TransferRequest {
            to_department_id: env.sales.id,
            to_agent_id: None,
            reason: None,
        };
        assert!(matches!(
            env.engine.transfer(conversation.id, outsider, &request),
            Err(Error::AccessDenied(_))
        ));
        assert!(matches!(
            env.engine.close(conversation.id, outsider),
            Err(Error::AccessDenied(_))
        ));
        assert!(matches!(
            env.engine.reopen(conversation.id, outsider),
            Err(Error::AccessDenied(_))
        ));
        assert!(matches!(
            env.engine.conversation_detail(conversation.id, outsider),
            Err(Error::AccessDenied(_))
        ));

        let conn = env.db.connect().unwrap();
        let unchanged = repo::require_conversation(&conn, conversation.id).unwrap();
        assert_eq!(unchanged.status, ConversationStatus::Open);
        assert_eq!(unchanged.message_count, 1);
        assert!(env.relay.sent().is_empty());
    }

    #[test]
    fn test_transfer_to_named_agent() {
        let env = TestEnv::new();
        let conversation = customer_conversation(&env, "5511999998888");

        let request = TransferRequest {
            to_department_id: env.sales.id,
            to_agent_id: Some(env.agent_sales.id),
            reason: Some("wants a quote".to_string()),
        };
        let transfer = env
            .engine
            .transfer(conversation.id, &env.agent_support, &request)
            .unwrap();
        assert_eq!(transfer.from_agent_id, Some(env.agent_support.id));
        assert_eq!(transfer.from_department_id, Some(env.support.id));
        assert_eq!(transfer.to_department_name, "Vendas");
        assert_eq!(transfer.to_agent_id, Some(env.agent_sales.id));

        let detail = env
            .engine
            .conversation_detail(conversation.id, &env.agent_sales)
            .unwrap();
        assert_eq!(detail.conversation.status, ConversationStatus::Transferred);
        assert_eq!(detail.conversation.department_id, Some(env.sales.id));
        assert_eq!(detail.conversation.assigned_agent_id, Some(env.agent_sales.id));
        assert_eq!(detail.transfers.len(), 1);

        let notice = detail.messages.last().unwrap();
        assert_eq!(notice.sender_type, SenderType::System);
        assert_eq!(notice.message_type, MessageType::System);
        assert!(notice.content.contains("transferred"));
        assert!(notice.content.contains("Vendas"));
        assert!(notice.content.contains("wants a quote"));

        let log = activity::recent(&env.db, 5).unwrap();
        assert_eq!(log[0].event_type, "CONVERSATION_TRANSFERRED");
    }

    #[test]
    fn test_transfer_agent_outside_department_leaves_conversation_unchanged() {
        let env = TestEnv::new();
        let conversation = customer_conversation(&env, "5511999998888");

        let request = TransferRequest {
            to_department_id: env.sales.id,
            to_agent_id: Some(env.agent_support.id),
            reason: None,
        };
        let err = env
            .engine
            .transfer(conversation.id, &env.admin, &request)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let detail = env.engine.conversation_detail(conversation.id, &env.admin).unwrap();
        assert_eq!(detail.conversation.status, ConversationStatus::Open);
        assert_eq!(detail.conversation.department_id, Some(env.support.id));
        assert!(detail.conversation.assigned_agent_id.is_none());
        assert!(detail.transfers.is_empty());
        assert_eq!(detail.messages.len(), 1);
    }

    #[test]
    fn test_transfer_target_validation() {
        let env = TestEnv::new();
        let conversation = customer_conversation(&env, "5511999998888");

        let missing_department = TransferRequest {
            to_department_id: 9999,
            to_agent_id: None,
            reason: None,
        };
        assert!(matches!(
            env.engine.transfer(conversation.id, &env.admin, &missing_department),
            Err(Error::NotFound(_))
        ));

        let missing_agent = TransferRequest {
            to_department_id: env.sales.id,
            to_agent_id: Some(9999),
            reason: None,
        };
        assert!(matches!(
            env.engine.transfer(conversation.id, &env.admin, &missing_agent),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_transfer_without_agent_leaves_it_unassigned() {
        let env = TestEnv::new();
        let conversation = customer_conversation(&env, "5511999998888");

        let request = TransferRequest {
            to_department_id: env.sales.id,
            to_agent_id: None,
            reason: None,
        };
        let transfer = env.engine.transfer(conversation.id, &env.admin, &request).unwrap();
        assert!(transfer.to_agent_id.is_none());

        // Any agent of the new department can now pick it up; the old one cannot.
        assert!(env.engine.conversation_detail(conversation.id, &env.agent_sales).is_ok());
        assert!(matches!(
            env.engine.conversation_detail(conversation.id, &env.agent_support),
            Err(Error::AccessDenied(_))
        ));
    }

    #[test]
    fn test_close_twice_is_a_no_op() {
        let env = TestEnv::new();
        let conversation = customer_conversation(&env, "5511999998888");

        let closed = env.engine.close(conversation.id, &env.agent_support).unwrap();
        assert_eq!(closed.status, ConversationStatus::Closed);
        assert_eq!(count_messages(&env, conversation.id), 2);

        let again = env.engine.close(conversation.id, &env.agent_support).unwrap();
        assert_eq!(again.status, ConversationStatus::Closed);
        assert_eq!(count_messages(&env, conversation.id), 2);
    }

    #[test]
    fn test_reopen_yields_open() {
        let env = TestEnv::new();
        let conversation = customer_conversation(&env, "5511999998888");

        env.engine.close(conversation.id, &env.agent_support).unwrap();
        let reopened = env.engine.reopen(conversation.id, &env.agent_support).unwrap();
        assert_eq!(reopened.status, ConversationStatus::Open);

        let detail = env.engine.conversation_detail(conversation.id, &env.admin).unwrap();
        let last = detail.messages.last().unwrap();
        assert_eq!(last.sender_type, SenderType::System);
        assert!(last.content.contains("reopened"));

        // Reopening an open conversation changes nothing.
        env.engine.reopen(conversation.id, &env.agent_support).unwrap();
        assert_eq!(count_messages(&env, conversation.id), 3);
    }

    #[test]
    fn test_closed_conversation_gets_fresh_one_on_next_message() {
        let env = TestEnv::new();
        let first = customer_conversation(&env, "5511999998888");
        env.engine.close(first.id, &env.agent_support).unwrap();

        let second = customer_conversation(&env, "5511999998888");
        assert_ne!(second.id, first.id);
        assert_eq!(second.status, ConversationStatus::Open);

        let err = env.engine.reopen(first.id, &env.admin).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_transfer_of_closed_conversation_rejected() {
        let env = TestEnv::new();
        let conversation = customer_conversation(&env, "5511999998888");
        env.engine.close(conversation.id, &env.admin).unwrap();

        let request = TransferRequest {
            to_department_id: env.sales.id,
            to_agent_id: None,
            reason: None,
        };
        assert!(matches!(
            env.engine.transfer(conversation.id, &env.admin, &request),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_status_always_valid_through_lifecycle() {
        let env = TestEnv::new();
        let conversation = customer_conversation(&env, "5511999998888");
        let request = TransferRequest {
            to_department_id: env.sales.id,
            to_agent_id: None,
            reason: None,
        };

        env.engine.transfer(conversation.id, &env.admin, &request).unwrap();
        env.engine.transfer(conversation.id, &env.admin, &request).unwrap();
        assert_eq!(
            env.engine.close(conversation.id, &env.admin).unwrap().status,
            ConversationStatus::Closed
        );
        assert_eq!(
            env.engine.reopen(conversation.id, &env.admin).unwrap().status,
            ConversationStatus::Open
        );

        let conn = env.db.connect().unwrap();
        let statuses: Vec<String> = conn
            .prepare("SELECT status FROM conversations")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        for status in statuses {
            assert!(status.parse::<ConversationStatus>().is_ok(), "bad status {}", status);
        }
    }

    #[test]
    fn test_start_conversation_from_contact() {
        let env = TestEnv::new();
        let contact = {
            let conn = env.db.connect().unwrap();
            contacts::create_contact(
                &conn,
                &NewContact {
                    name: "Joana".to_string(),
                    phone_number: "5511988887777".to_string(),
                    email: None,
                },
                Some(env.agent_sales.id),
            )
            .unwrap()
        };

        let started = env.engine.start_conversation(contact.id, &env.agent_sales).unwrap();
        assert_eq!(started.status, ConversationStatus::Open);
        assert_eq!(started.assigned_agent_id, Some(env.agent_sales.id));
        assert_eq!(started.department_id, Some(env.sales.id));
        assert_eq!(started.contact_name, "Joana");

        let err = env.engine.start_conversation(contact.id, &env.agent_sales).unwrap_err();
        assert!(matches!(err, Error::Conflict(ref m) if m.contains(&started.id.to_string())));

        // Customer replies land in the same conversation.
        let reply = env.engine.ingest_customer_message(hello("5511988887777")).unwrap();
        assert_eq!(reply.conversation_id, started.id);

        assert!(matches!(
            env.engine.start_conversation(9999, &env.agent_sales),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_list_is_scoped_by_role() {
        let env = TestEnv::new();
        let support_conv = customer_conversation(&env, "5511900000001");
        let (sales_conv, _) = env
            .engine
            .find_or_create_for_contact("5511900000002", "Lead", Some(env.sales.id))
            .unwrap();

        let ids = |user: &User| -> Vec<i64> {
            let mut ids: Vec<i64> = env
                .engine
                .list_conversations(user, None)
                .unwrap()
                .into_iter()
                .map(|c| c.id)
                .collect();
            ids.sort();
            ids
        };

        assert_eq!(ids(&env.admin), vec![support_conv.id, sales_conv.id]);
        assert_eq!(ids(&env.agent_support), vec![support_conv.id]);
        assert_eq!(ids(&env.manager_sales), vec![sales_conv.id]);

        env.engine.close(support_conv.id, &env.admin).unwrap();
        let open = env
            .engine
            .list_conversations(&env.admin, Some(ConversationStatus::Open))
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, sales_conv.id);
    }

    #[test]
    fn test_delete_is_admin_only_and_cascades() {
        let env = TestEnv::new();
        let conversation = customer_conversation(&env, "5511999998888");
        let request = TransferRequest {
            to_department_id: env.sales.id,
            to_agent_id: None,
            reason: None,
        };
        env.engine.transfer(conversation.id, &env.admin, &request).unwrap();

        assert!(matches!(
            env.engine.delete_conversation(conversation.id, &env.manager_sales),
            Err(Error::AccessDenied(_))
        ));
        env.engine.delete_conversation(conversation.id, &env.admin).unwrap();

        let conn = env.db.connect().unwrap();
        let leftovers: i64 = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM messages) + (SELECT COUNT(*) FROM transfers)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(leftovers, 0);
        assert_eq!(env.admin.role, Role::Admin);
    }
}
