//! Activity log - best-effort, append-only record of business events.
//!
//! Recording happens after the business transaction has committed and on
//! its own connection. A failed write is logged and dropped; it never
//! fails the operation that triggered it.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

use crate::error::Result;
use crate::store::Database;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    UserCreated,
    UserUpdated,
    DepartmentCreated,
    DepartmentUpdated,
    DepartmentDeleted,
    ContactCreated,
    ConversationStarted,
    ConversationTransferred,
    ConversationClosed,
    ConversationReopened,
    ConversationDeleted,
    ChannelConnected,
    ChannelDisconnected,
    SettingsUpdated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UserCreated => "USER_CREATED",
            EventType::UserUpdated => "USER_UPDATED",
            EventType::DepartmentCreated => "DEPARTMENT_CREATED",
            EventType::DepartmentUpdated => "DEPARTMENT_UPDATED",
            EventType::DepartmentDeleted => "DEPARTMENT_DELETED",
            EventType::ContactCreated => "CONTACT_CREATED",
            EventType::ConversationStarted => "CONVERSATION_STARTED",
            EventType::ConversationTransferred => "CONVERSATION_TRANSFERRED",
            EventType::ConversationClosed => "CONVERSATION_CLOSED",
            EventType::ConversationReopened => "CONVERSATION_REOPENED",
            EventType::ConversationDeleted => "CONVERSATION_DELETED",
            EventType::ChannelConnected => "CHANNEL_CONNECTED",
            EventType::ChannelDisconnected => "CHANNEL_DISCONNECTED",
            EventType::SettingsUpdated => "SETTINGS_UPDATED",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct ActivityEntry {
    pub id: i64,
    pub event_type: String,
    pub user_id: Option<i64>,
    pub user_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Append an entry. Never fails the caller.
pub fn record(db: &Database, event: EventType, user_id: Option<i64>, message: &str) {
    if let Err(e) = try_record(db, event, user_id, message) {
        tracing::warn!("Failed to record activity {}: {}", event, e);
    }
}

fn try_record(db: &Database, event: EventType, user_id: Option<i64>, message: &str) -> Result<()> {
    let conn = db.connect()?;
    conn.execute(
        "INSERT INTO activity_logs (event_type, user_id, message, timestamp) VALUES (?1, ?2, ?3, ?4)",
        params![event.as_str(), user_id, message, Utc::now()],
    )?;
    tracing::debug!(event = event.as_str(), ?user_id, "{}", message);
    Ok(())
}

/// Most recent entries first.
pub fn recent(db: &Database, limit: u32) -> Result<Vec<ActivityEntry>> {
    let conn = db.connect()?;
    let mut stmt = conn.prepare(
        "SELECT a.id, a.event_type, a.user_id, u.name, a.message, a.timestamp
         FROM activity_logs a LEFT JOIN users u ON u.id = a.user_id
         ORDER BY a.id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit], |row| {
        Ok(ActivityEntry {
            id: row.get(0)?,
            event_type: row.get(1)?,
            user_id: row.get(2)?,
            user_name: row
                .get::<_, Option<String>>(3)?
                .unwrap_or_else(|| "System".to_string()),
            message: row.get(4)?,
            timestamp: row.get(5)?,
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestEnv;

    #[test]
    fn test_record_and_recent_order() {
        let env = TestEnv::new();

        record(&env.db, EventType::DepartmentCreated, Some(env.admin.id), "first");
        record(&env.db, EventType::ConversationClosed, None, "second");

        let entries = recent(&env.db, 5).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "second");
        assert_eq!(entries[0].user_name, "System");
        assert_eq!(entries[1].event_type, "DEPARTMENT_CREATED");
        assert_eq!(entries[1].user_name, env.admin.name);
    }

    #[test]
    fn test_record_failure_is_swallowed() {
        let env = TestEnv::new();
        // Unknown user id violates the foreign key; the call must still return.
        record(&env.db, EventType::UserCreated, Some(424242), "dangling");
        assert!(recent(&env.db, 5).unwrap().is_empty());
    }
}
