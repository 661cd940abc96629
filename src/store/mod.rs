//! SQLite persistence store.
//!
//! The store is the single source of truth. Each unit of work opens its
//! own connection; mutations that touch several rows run inside one
//! `IMMEDIATE` transaction so concurrent writers serialize on the file lock.

mod schema;

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::error::{Error, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the on-disk database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Open (creating if needed) the database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Self { path };
        let conn = db.connect()?;
        conn.execute_batch(schema::SCHEMA)?;
        tracing::debug!("Database ready at {}", db.path.display());
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh connection with the pragmas every unit of work relies on.
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        // journal_mode returns a row, so it cannot go through execute().
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        Ok(conn)
    }
}

/// Begin a write transaction that takes the database write lock up front.
pub fn begin_write(conn: &mut Connection) -> Result<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

/// Run a `SELECT COUNT(*)` query.
pub fn count<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<i64> {
    Ok(conn.query_row(sql, params, |row| row.get(0))?)
}

/// Run a write guarded by a UNIQUE column. A constraint violation, such as
/// a concurrent writer taking the value after our pre-check, becomes
/// `Conflict` with the message built by `conflict`.
pub fn execute_unique<P, F>(conn: &Connection, sql: &str, params: P, conflict: F) -> Result<usize>
where
    P: rusqlite::Params,
    F: FnOnce() -> String,
{
    match conn.execute(sql, params).map_err(Error::from) {
        Err(e) if e.is_constraint_violation() => Err(Error::Conflict(conflict())),
        other => other,
    }
}

/// Run a single-row query, mapping "no rows" to `None`.
pub fn query_opt<T, P, F>(conn: &Connection, sql: &str, params: P, map: F) -> Result<Option<T>>
where
    P: rusqlite::Params,
    F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
{
    conn.query_row(sql, params, map).optional().map_err(Error::from)
}

/// Store a string-backed enum as TEXT. The type needs `as_str()` and a
/// `FromStr` impl whose error converts to `String`.
macro_rules! sql_text_enum {
    ($ty:ty) => {
        impl rusqlite::types::ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $ty {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse::<$ty>()
                    .map_err(|e| rusqlite::types::FromSqlError::Other(e.into()))
            }
        }
    };
}

pub(crate) use sql_text_enum;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_is_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("app.db");

        let db = Database::open(&path).unwrap();
        Database::open(&path).unwrap();

        let conn = db.connect().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'conversations'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = Database::open(temp_dir.path().join("app.db")).unwrap();
        let conn = db.connect().unwrap();

        let result = conn.execute(
            "INSERT INTO messages (conversation_id, sender_type, content, message_type, timestamp)
             VALUES (999, 'customer', 'hi', 'text', '2024-01-01T00:00:00Z')",
            [],
        );
        let err = Error::from(result.unwrap_err());
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_execute_unique_reports_conflict() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = Database::open(temp_dir.path().join("app.db")).unwrap();
        let conn = db.connect().unwrap();

        let insert = "INSERT INTO departments (name, is_active, created_at, updated_at)
             VALUES ('Vendas', 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')";
        assert_eq!(execute_unique(&conn, insert, [], || "taken".into()).unwrap(), 1);

        let err = execute_unique(&conn, insert, [], || "department 'Vendas' already exists".into())
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(ref m) if m.contains("Vendas")));
    }
}
