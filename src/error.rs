//! Error types for Switchboard.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Relay failure: {0}")]
    UpstreamRelayFailure(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stable machine-readable kind, safe to hand to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::AccessDenied(_) => "access_denied",
            Error::Conflict(_) => "conflict",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::Unauthenticated(_) => "unauthenticated",
            Error::UpstreamRelayFailure(_) => "upstream_relay_failure",
            Error::Config(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Database(_)
            | Error::Other(_) => "internal",
        }
    }

    /// Whether this error is a unique/foreign-key constraint violation in SQLite.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Error::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn denied(why: impl Into<String>) -> Self {
        Error::AccessDenied(why.into())
    }

    pub fn invalid(why: impl Into<String>) -> Self {
        Error::InvalidArgument(why.into())
    }
}
