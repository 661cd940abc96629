//! Department repository.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Error, Result};
use crate::store;

use super::models::{Department, DepartmentUpdate};

const SELECT_DEPARTMENT: &str = "SELECT d.id, d.name, d.description, d.is_active,
        (SELECT COUNT(*) FROM users u WHERE u.department_id = d.id),
        d.created_at, d.updated_at
     FROM departments d";

fn map_department(row: &Row<'_>) -> rusqlite::Result<Department> {
    Ok(Department {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        is_active: row.get(3)?,
        user_count: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub fn get_department(conn: &Connection, id: i64) -> Result<Option<Department>> {
    store::query_opt(
        conn,
        &format!("{SELECT_DEPARTMENT} WHERE d.id = ?1"),
        [id],
        map_department,
    )
}

pub fn require_department(conn: &Connection, id: i64) -> Result<Department> {
    get_department(conn, id)?.ok_or_else(|| Error::not_found(format!("department {}", id)))
}

pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Department>> {
    store::query_opt(
        conn,
        &format!("{SELECT_DEPARTMENT} WHERE d.name = ?1"),
        [name],
        map_department,
    )
}

pub fn list_departments(conn: &Connection) -> Result<Vec<Department>> {
    let mut stmt = conn.prepare(&format!("{SELECT_DEPARTMENT} ORDER BY d.name"))?;
    let rows = stmt.query_map([], map_department)?;
    let mut departments = Vec::new();
    for row in rows {
        departments.push(row?);
    }
    Ok(departments)
}

pub fn create_department(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
) -> Result<Department> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid("department name is required"));
    }
    if find_by_name(conn, name)?.is_some() {
        return Err(Error::Conflict(format!("department '{}' already exists", name)));
    }

    let now = Utc::now();
    store::execute_unique(
        conn,
        "INSERT INTO departments (name, description, is_active, created_at, updated_at)
         VALUES (?1, ?2, 1, ?3, ?3)",
        params![name, description, now],
        || format!("department '{}' already exists", name),
    )?;
    require_department(conn, conn.last_insert_rowid())
}

/// Id of the named department, creating it when absent.
pub fn ensure_department(conn: &Connection, name: &str) -> Result<i64> {
    let now = Utc::now();
    conn.execute(
        "INSERT OR IGNORE INTO departments (name, description, is_active, created_at, updated_at)
         VALUES (?1, NULL, 1, ?2, ?2)",
        params![name, now],
    )?;
    let id = conn
        .query_row("SELECT id FROM departments WHERE name = ?1", [name], |row| row.get(0))
        .optional()?;
    id.ok_or_else(|| Error::Other(format!("department '{}' vanished after insert", name)))
}

pub fn update_department(conn: &Connection, id: i64, update: &DepartmentUpdate) -> Result<Department> {
    let mut department = require_department(conn, id)?;

    if let Some(name) = &update.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid("department name is required"));
        }
        if let Some(other) = find_by_name(conn, name)? {
            if other.id != id {
                return Err(Error::Conflict(format!("department '{}' already exists", name)));
            }
        }
        department.name = name.to_string();
    }
    if let Some(description) = &update.description {
        department.description = Some(description.clone());
    }
    if let Some(is_active) = update.is_active {
        department.is_active = is_active;
    }

    store::execute_unique(
        conn,
        "UPDATE departments SET name = ?1, description = ?2, is_active = ?3, updated_at = ?4 WHERE id = ?5",
        params![department.name, department.description, department.is_active, Utc::now(), id],
        || format!("department '{}' already exists", department.name),
    )?;
    require_department(conn, id)
}

/// Delete a department nobody references any more.
pub fn delete_department(conn: &Connection, id: i64) -> Result<Department> {
    let department = require_department(conn, id)?;

    let users = store::count(conn, "SELECT COUNT(*) FROM users WHERE department_id = ?1", [id])?;
    let conversations = store::count(
        conn,
        "SELECT COUNT(*) FROM conversations WHERE department_id = ?1",
        [id],
    )?;
    let transfers = store::count(
        conn,
        "SELECT COUNT(*) FROM transfers WHERE from_department_id = ?1 OR to_department_id = ?1",
        [id],
    )?;
    if users + conversations + transfers > 0 {
        return Err(Error::Conflict(format!(
            "department '{}' is still referenced by {} users, {} conversations and {} transfers",
            department.name, users, conversations, transfers
        )));
    }

    conn.execute("DELETE FROM departments WHERE id = ?1", [id])?;
    Ok(department)
}
