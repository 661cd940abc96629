//! User repository.

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::store;

use super::departments;
use super::models::{NewUser, User, UserUpdate};

const SELECT_USER: &str = "SELECT u.id, u.username, u.name, u.email, u.password_hash, u.role,
        u.department_id, d.name, u.is_active, u.created_at, u.updated_at
     FROM users u LEFT JOIN departments d ON d.id = u.department_id";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        password_hash: row.get(4)?,
        role: row.get(5)?,
        department_id: row.get(6)?,
        department_name: row.get(7)?,
        is_active: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub fn get_user(conn: &Connection, id: i64) -> Result<Option<User>> {
    store::query_opt(conn, &format!("{SELECT_USER} WHERE u.id = ?1"), [id], map_user)
}

pub fn require_user(conn: &Connection, id: i64) -> Result<User> {
    get_user(conn, id)?.ok_or_else(|| Error::not_found(format!("user {}", id)))
}

pub fn find_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    store::query_opt(
        conn,
        &format!("{SELECT_USER} WHERE u.username = ?1"),
        [username],
        map_user,
    )
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!("{SELECT_USER} ORDER BY u.name"))?;
    let rows = stmt.query_map([], map_user)?;
    let mut users = Vec::new();
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}

fn validate_identity(username: &str, name: &str, email: &str) -> Result<()> {
    if username.trim().is_empty() || name.trim().is_empty() || email.trim().is_empty() {
        return Err(Error::invalid("username, name and email are required"));
    }
    if !email.contains('@') {
        return Err(Error::invalid(format!("'{}' is not an email address", email)));
    }
    Ok(())
}

fn ensure_unique(conn: &Connection, column: &str, value: &str, except_id: Option<i64>) -> Result<()> {
    let taken: Option<i64> = store::query_opt(
        conn,
        &format!("SELECT id FROM users WHERE {column} = ?1"),
        [value],
        |row| row.get(0),
    )?;
    match taken {
        Some(id) if Some(id) != except_id => Err(Error::Conflict(format!(
            "{} '{}' is already in use",
            column, value
        ))),
        _ => Ok(()),
    }
}

fn ensure_department(conn: &Connection, department_id: Option<i64>) -> Result<()> {
    if let Some(id) = department_id {
        departments::require_department(conn, id)?;
    }
    Ok(())
}

pub fn create_user(conn: &Connection, new: &NewUser) -> Result<User> {
    let username = new.username.trim();
    let email = new.email.trim();
    validate_identity(username, &new.name, email)?;
    ensure_unique(conn, "username", username, None)?;
    ensure_unique(conn, "email", email, None)?;
    ensure_department(conn, new.department_id)?;

    let now = Utc::now();
    store::execute_unique(
        conn,
        "INSERT INTO users (username, name, email, password_hash, role, department_id, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
        params![
            username,
            new.name.trim(),
            email,
            new.password_hash,
            new.role,
            new.department_id,
            now
        ],
        || format!("username '{}' or email '{}' is already in use", username, email),
    )?;
    require_user(conn, conn.last_insert_rowid())
}

pub fn update_user(conn: &Connection, id: i64, update: &UserUpdate) -> Result<User> {
    let mut user = require_user(conn, id)?;

    if let Some(name) = &update.name {
        user.name = name.trim().to_string();
    }
    if let Some(email) = &update.email {
        user.email = email.trim().to_string();
        ensure_unique(conn, "email", &user.email, Some(id))?;
    }
    if let Some(role) = update.role {
        user.role = role;
    }
    if let Some(department_id) = update.department_id {
        ensure_department(conn, department_id)?;
        user.department_id = department_id;
    }
    if let Some(is_active) = update.is_active {
        user.is_active = is_active;
    }
    if let Some(hash) = &update.password_hash {
        user.password_hash = hash.clone();
    }
    validate_identity(&user.username, &user.name, &user.email)?;

    store::execute_unique(
        conn,
        "UPDATE users SET name = ?1, email = ?2, password_hash = ?3, role = ?4,
            department_id = ?5, is_active = ?6, updated_at = ?7
         WHERE id = ?8",
        params![
            user.name,
            user.email,
            user.password_hash,
            user.role,
            user.department_id,
            user.is_active,
            Utc::now(),
            id
        ],
        || format!("email '{}' is already in use", user.email),
    )?;
    require_user(conn, id)
}

/// Users that belong to a department, active ones only.
pub fn list_department_members(conn: &Connection, department_id: i64) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_USER} WHERE u.department_id = ?1 AND u.is_active = 1 ORDER BY u.name"
    ))?;
    let rows = stmt.query_map([department_id], map_user)?;
    let mut users = Vec::new();
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}
