//! Runtime key/value settings (company name, greeting text, ...).
//!
//! Kept in the database so admins can change them from the API without
//! touching `settings.json`.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::store;

const MAX_KEY_LEN: usize = 50;
const MAX_VALUE_LEN: usize = 255;

/// Settings as served to clients. Unset values are `null`.
pub type SettingsMap = BTreeMap<String, Option<String>>;

pub fn load_all(conn: &Connection) -> Result<SettingsMap> {
    let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
    })?;
    let mut settings = SettingsMap::new();
    for row in rows {
        let (key, value) = row?;
        settings.insert(key, value);
    }
    Ok(settings)
}

fn stored_value(key: &str, value: &Value) -> Result<Option<String>> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => {
            return Err(Error::invalid(format!("setting '{}' must be a scalar", key)))
        }
    };
    if text.chars().count() > MAX_VALUE_LEN {
        return Err(Error::invalid(format!(
            "setting '{}' exceeds {} characters",
            key, MAX_VALUE_LEN
        )));
    }
    Ok(Some(text))
}

/// Insert or overwrite every key in `values`, all or nothing.
pub fn upsert(conn: &mut Connection, values: &BTreeMap<String, Value>) -> Result<SettingsMap> {
    if values.is_empty() {
        return Err(Error::invalid("no settings given"));
    }

    let mut rows = Vec::with_capacity(values.len());
    for (key, value) in values {
        let key = key.trim();
        if key.is_empty() || key.chars().count() > MAX_KEY_LEN {
            return Err(Error::invalid(format!(
                "setting keys must be 1 to {} characters",
                MAX_KEY_LEN
            )));
        }
        rows.push((key, stored_value(key, value)?));
    }

    let tx = store::begin_write(conn)?;
    let now = Utc::now();
    for (key, value) in &rows {
        tx.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
    }
    tx.commit()?;

    load_all(conn)
}
