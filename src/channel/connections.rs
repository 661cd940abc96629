//! Registered messaging-channel connections (business numbers).

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::phone::normalize_phone;
use crate::store;

#[derive(Serialize, Clone, Debug)]
pub struct ChannelConnection {
    pub id: i64,
    pub phone_number: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub verify_token: String,
    pub business_account_id: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NewConnection {
    pub phone_number: String,
    pub access_token: String,
    pub webhook_verify_token: String,
    pub business_account_id: String,
}

const SELECT_CONNECTION: &str = "SELECT id, phone_number, access_token, verify_token, business_account_id, is_active, created_at
     FROM channel_connections";

fn map_connection(row: &Row<'_>) -> rusqlite::Result<ChannelConnection> {
    Ok(ChannelConnection {
        id: row.get(0)?,
        phone_number: row.get(1)?,
        access_token: row.get(2)?,
        verify_token: row.get(3)?,
        business_account_id: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn connect(conn: &Connection, new: &NewConnection) -> Result<ChannelConnection> {
    let required = [
        ("phone_number", &new.phone_number),
        ("access_token", &new.access_token),
        ("webhook_verify_token", &new.webhook_verify_token),
        ("business_account_id", &new.business_account_id),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(Error::invalid(format!("{} is required", field)));
        }
    }

    let phone = normalize_phone(&new.phone_number)?;
    let existing: Option<i64> = store::query_opt(
        conn,
        "SELECT id FROM channel_connections WHERE phone_number = ?1",
        [&phone],
        |row| row.get(0),
    )?;
    if existing.is_some() {
        return Err(Error::Conflict(format!("number {} is already connected", phone)));
    }

    store::execute_unique(
        conn,
        "INSERT INTO channel_connections (phone_number, access_token, verify_token, business_account_id, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, 1, ?5)",
        params![
            phone,
            new.access_token.trim(),
            new.webhook_verify_token.trim(),
            new.business_account_id.trim(),
            Utc::now()
        ],
        || format!("number {} is already connected", phone),
    )?;
    let id = conn.last_insert_rowid();
    store::query_opt(conn, &format!("{SELECT_CONNECTION} WHERE id = ?1"), [id], map_connection)?
        .ok_or_else(|| Error::Other(format!("connection {} missing after insert", id)))
}

pub fn list_active(conn: &Connection) -> Result<Vec<ChannelConnection>> {
    let mut stmt = conn.prepare(&format!("{SELECT_CONNECTION} WHERE is_active = 1 ORDER BY id"))?;
    let rows = stmt.query_map([], map_connection)?;
    let mut connections = Vec::new();
    for row in rows {
        connections.push(row?);
    }
    Ok(connections)
}

pub fn find_active_by_verify_token(conn: &Connection, token: &str) -> Result<Option<ChannelConnection>> {
    store::query_opt(
        conn,
        &format!("{SELECT_CONNECTION} WHERE verify_token = ?1 AND is_active = 1"),
        [token],
        map_connection,
    )
}

/// Deactivate a connection. The row stays for reference.
pub fn disconnect(conn: &Connection, id: i64) -> Result<ChannelConnection> {
    let updated = conn.execute(
        "UPDATE channel_connections SET is_active = 0 WHERE id = ?1",
        [id],
    )?;
    if updated == 0 {
        return Err(Error::not_found(format!("channel connection {}", id)));
    }
    store::query_opt(conn, &format!("{SELECT_CONNECTION} WHERE id = ?1"), [id], map_connection)?
        .ok_or_else(|| Error::not_found(format!("channel connection {}", id)))
}
