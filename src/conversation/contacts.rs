//! Address book.

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::phone::normalize_phone;
use crate::store;

use super::models::{Contact, NewContact};

const SELECT_CONTACT: &str = "SELECT c.id, c.name, c.phone_number, c.email, c.created_by_user_id, u.name, c.created_at
     FROM contacts c LEFT JOIN users u ON u.id = c.created_by_user_id";

fn map_contact(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        name: row.get(1)?,
        phone_number: row.get(2)?,
        email: row.get(3)?,
        created_by_user_id: row.get(4)?,
        created_by: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn get_contact(conn: &Connection, id: i64) -> Result<Option<Contact>> {
    store::query_opt(conn, &format!("{SELECT_CONTACT} WHERE c.id = ?1"), [id], map_contact)
}

pub fn require_contact(conn: &Connection, id: i64) -> Result<Contact> {
    get_contact(conn, id)?.ok_or_else(|| Error::not_found(format!("contact {}", id)))
}

pub fn list_contacts(conn: &Connection) -> Result<Vec<Contact>> {
    let mut stmt = conn.prepare(&format!("{SELECT_CONTACT} ORDER BY c.name"))?;
    let rows = stmt.query_map([], map_contact)?;
    let mut contacts = Vec::new();
    for row in rows {
        contacts.push(row?);
    }
    Ok(contacts)
}

pub fn create_contact(conn: &Connection, new: &NewContact, created_by: Option<i64>) -> Result<Contact> {
    let name = new.name.trim();
    if name.is_empty() || new.phone_number.trim().is_empty() {
        return Err(Error::invalid("name and phone_number are required"));
    }
    let phone = normalize_phone(&new.phone_number)?;

    let existing: Option<i64> = store::query_opt(
        conn,
        "SELECT id FROM contacts WHERE phone_number = ?1",
        [&phone],
        |row| row.get(0),
    )?;
    if existing.is_some() {
        return Err(Error::Conflict(format!(
            "phone number {} is already in the address book",
            phone
        )));
    }

    let email = new
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    store::execute_unique(
        conn,
        "INSERT INTO contacts (name, phone_number, email, created_by_user_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![name, phone, email, created_by, Utc::now()],
        || format!("phone number {} is already in the address book", phone),
    )?;
    require_contact(conn, conn.last_insert_rowid())
}
