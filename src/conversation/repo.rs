//! Conversation, message and transfer persistence.
//!
//! All functions take a plain `Connection` so the engine can compose them
//! inside one transaction (`Transaction` derefs to `Connection`).

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::identity::User;
use crate::store;

use super::models::{
    Conversation, ConversationStatus, Message, MessageType, SenderType, Transfer, TransferStatus,
};

const SELECT_CONVERSATION: &str = "SELECT c.id, c.contact_name, c.contact_phone, c.status,
        c.assigned_agent_id, u.name, c.department_id, d.name,
        (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id),
        c.created_at, c.updated_at
     FROM conversations c
     LEFT JOIN users u ON u.id = c.assigned_agent_id
     LEFT JOIN departments d ON d.id = c.department_id";

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        contact_name: row.get(1)?,
        contact_phone: row.get(2)?,
        status: row.get(3)?,
        assigned_agent_id: row.get(4)?,
        assigned_agent_name: row.get(5)?,
        department_id: row.get(6)?,
        department_name: row.get(7)?,
        message_count: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub fn get_conversation(conn: &Connection, id: i64) -> Result<Option<Conversation>> {
    store::query_opt(
        conn,
        &format!("{SELECT_CONVERSATION} WHERE c.id = ?1"),
        [id],
        map_conversation,
    )
}

pub fn require_conversation(conn: &Connection, id: i64) -> Result<Conversation> {
    get_conversation(conn, id)?.ok_or_else(|| Error::not_found(format!("conversation {}", id)))
}

/// The open or transferred conversation for a phone, if any.
pub fn find_active_by_phone(conn: &Connection, phone: &str) -> Result<Option<Conversation>> {
    store::query_opt(
        conn,
        &format!(
            "{SELECT_CONVERSATION} WHERE c.contact_phone = ?1 AND c.status IN ('open', 'transferred')"
        ),
        [phone],
        map_conversation,
    )
}

/// Conversations visible to `user`, most recently active first.
pub fn list_for_user(
    conn: &Connection,
    user: &User,
    status: Option<ConversationStatus>,
) -> Result<Vec<Conversation>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_CONVERSATION}
         WHERE (?1 = 1 OR c.assigned_agent_id = ?2 OR c.department_id = ?3)
           AND (?4 IS NULL OR c.status = ?4)
         ORDER BY c.updated_at DESC, c.id DESC"
    ))?;
    let rows = stmt.query_map(
        params![user.is_admin(), user.id, user.department_id, status],
        map_conversation,
    )?;

    let mut conversations = Vec::new();
    for row in rows {
        conversations.push(row?);
    }
    Ok(conversations)
}

/// Insert a new open conversation. Fails with a constraint violation when
/// the phone already has an active conversation.
pub fn insert_conversation(
    conn: &Connection,
    contact_name: &str,
    contact_phone: &str,
    assigned_agent_id: Option<i64>,
    department_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<Conversation> {
    conn.execute(
        "INSERT INTO conversations (contact_name, contact_phone, status, assigned_agent_id, department_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            contact_name,
            contact_phone,
            ConversationStatus::Open,
            assigned_agent_id,
            department_id,
            now
        ],
    )?;
    require_conversation(conn, conn.last_insert_rowid())
}

pub fn set_status(conn: &Connection, id: i64, status: ConversationStatus, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE conversations SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status, now, id],
    )?;
    Ok(())
}

pub fn set_routing(
    conn: &Connection,
    id: i64,
    status: ConversationStatus,
    department_id: i64,
    assigned_agent_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE conversations SET status = ?1, department_id = ?2, assigned_agent_id = ?3, updated_at = ?4
         WHERE id = ?5",
        params![status, department_id, assigned_agent_id, now, id],
    )?;
    Ok(())
}

/// Bump `updated_at`, claiming the conversation for `agent_id` when nobody owns it.
pub fn touch(conn: &Connection, id: i64, claim_for: Option<i64>, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE conversations
         SET updated_at = ?1, assigned_agent_id = COALESCE(assigned_agent_id, ?2)
         WHERE id = ?3",
        params![now, claim_for, id],
    )?;
    Ok(())
}

pub fn delete_conversation(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM conversations WHERE id = ?1", [id])?;
    Ok(())
}

const SELECT_MESSAGE: &str = "SELECT m.id, m.conversation_id, m.sender_type, m.sender_id, u.name,
        m.content, m.message_type, m.file_path, m.timestamp
     FROM messages m LEFT JOIN users u ON u.id = m.sender_id";

fn map_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let sender_type: SenderType = row.get(2)?;
    let agent_name: Option<String> = row.get(4)?;
    let sender_name = match sender_type {
        SenderType::Agent => agent_name.unwrap_or_else(|| "Agent".to_string()),
        SenderType::Customer => "Customer".to_string(),
        SenderType::System => "System".to_string(),
    };

    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_type,
        sender_id: row.get(3)?,
        sender_name,
        content: row.get(5)?,
        message_type: row.get(6)?,
        file_path: row.get(7)?,
        timestamp: row.get(8)?,
    })
}

#[allow(clippy::too_many_arguments)]
pub fn insert_message(
    conn: &Connection,
    conversation_id: i64,
    sender_type: SenderType,
    sender_id: Option<i64>,
    content: &str,
    message_type: MessageType,
    file_path: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Message> {
    conn.execute(
        "INSERT INTO messages (conversation_id, sender_type, sender_id, content, message_type, file_path, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![conversation_id, sender_type, sender_id, content, message_type, file_path, now],
    )?;
    let id = conn.last_insert_rowid();
    store::query_opt(conn, &format!("{SELECT_MESSAGE} WHERE m.id = ?1"), [id], map_message)?
        .ok_or_else(|| Error::Other(format!("message {} missing after insert", id)))
}

/// Append a system notice to a conversation.
pub fn insert_system_message(
    conn: &Connection,
    conversation_id: i64,
    content: &str,
    now: DateTime<Utc>,
) -> Result<Message> {
    insert_message(
        conn,
        conversation_id,
        SenderType::System,
        None,
        content,
        MessageType::System,
        None,
        now,
    )
}

pub fn list_messages(conn: &Connection, conversation_id: i64) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_MESSAGE} WHERE m.conversation_id = ?1 ORDER BY m.id"
    ))?;
    let rows = stmt.query_map([conversation_id], map_message)?;
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

const SELECT_TRANSFER: &str = "SELECT t.id, t.conversation_id,
        t.from_agent_id, fa.name, t.from_department_id, fd.name,
        t.to_department_id, td.name, t.to_agent_id, ta.name,
        t.reason, t.status, t.created_at
     FROM transfers t
     LEFT JOIN users fa ON fa.id = t.from_agent_id
     LEFT JOIN departments fd ON fd.id = t.from_department_id
     JOIN departments td ON td.id = t.to_department_id
     LEFT JOIN users ta ON ta.id = t.to_agent_id";

fn map_transfer(row: &Row<'_>) -> rusqlite::Result<Transfer> {
    Ok(Transfer {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        from_agent_id: row.get(2)?,
        from_agent_name: row.get(3)?,
        from_department_id: row.get(4)?,
        from_department_name: row.get(5)?,
        to_department_id: row.get(6)?,
        to_department_name: row.get(7)?,
        to_agent_id: row.get(8)?,
        to_agent_name: row.get(9)?,
        reason: row.get(10)?,
        status: row.get(11)?,
        created_at: row.get(12)?,
    })
}

/// Route of a transfer being recorded.
#[derive(Debug, Clone, Copy)]
pub struct TransferRoute<'a> {
    pub from_agent_id: Option<i64>,
    pub from_department_id: Option<i64>,
    pub to_department_id: i64,
    pub to_agent_id: Option<i64>,
    pub reason: Option<&'a str>,
}

pub fn insert_transfer(
    conn: &Connection,
    conversation_id: i64,
    route: TransferRoute<'_>,
    now: DateTime<Utc>,
) -> Result<Transfer> {
    conn.execute(
        "INSERT INTO transfers (conversation_id, from_agent_id, from_department_id, to_department_id, to_agent_id, reason, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            conversation_id,
            route.from_agent_id,
            route.from_department_id,
            route.to_department_id,
            route.to_agent_id,
            route.reason,
            TransferStatus::Completed,
            now
        ],
    )?;
    let id = conn.last_insert_rowid();
    store::query_opt(conn, &format!("{SELECT_TRANSFER} WHERE t.id = ?1"), [id], map_transfer)?
        .ok_or_else(|| Error::Other(format!("transfer {} missing after insert", id)))
}

pub fn list_transfers(conn: &Connection, conversation_id: i64) -> Result<Vec<Transfer>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_TRANSFER} WHERE t.conversation_id = ?1 ORDER BY t.id"
    ))?;
    let rows = stmt.query_map([conversation_id], map_transfer)?;
    let mut transfers = Vec::new();
    for row in rows {
        transfers.push(row?);
    }
    Ok(transfers)
}
