//! # Database Error Types
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  sqlx::Error                    CoreError (bad specification)          │
//! │       │                              │                                  │
//! │       ▼                              ▼                                  │
//! │  DbError::Persistence { operation, source }   ← source kept unmodified │
//! │  DbError::NotFound    { table, id }           ← no row for the key     │
//! │  DbError::Mapping     { table, source }       ← row ≠ model shape      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Caller branches on NotFound vs everything else                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use strata_core::CoreError;
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// No row matched the identifier.
    ///
    /// ## When This Occurs
    /// - `find_by_id` with an unknown key
    /// - `delete` / `delete_by_id` affected zero rows
    #[error("{table} not found: {id}")]
    NotFound { table: String, id: String },

    /// The backend rejected or failed a statement.
    ///
    /// The sqlx error is kept as-is; only the operation name is added.
    #[error("{operation} failed: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// A returned row could not be decoded into the model.
    ///
    /// ## When This Occurs
    /// - The model's `FromRow` fields don't match the table's columns
    /// - `Table::attach` failed to decode preloaded rows
    ///
    /// This is a configuration error: the model/table pairing is wrong.
    #[error("Row from {table} does not match its model: {source}")]
    Mapping {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// A preload directive named a relationship the model never declared.
    #[error("{table} has no association named '{name}'")]
    UnknownAssociation { table: String, name: String },

    /// A specification was malformed.
    #[error("Invalid specification: {0}")]
    InvalidSpecification(#[from] CoreError),

    /// Schema introspection failed.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A value could not be bound to a statement.
    #[error("Failed to bind value: {0}")]
    Bind(String),

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created
    /// - File permissions issue
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

impl DbError {
    /// Creates a NotFound error for a given table and key.
    pub fn not_found(table: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            table: table.into(),
            id: id.to_string(),
        }
    }

    /// Wraps a sqlx error with the name of the failing operation.
    pub fn persistence(operation: &'static str, source: sqlx::Error) -> Self {
        DbError::Persistence { operation, source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. })
    }

    /// True when SQLite reported a UNIQUE constraint failure.
    ///
    /// SQLite message format: `"UNIQUE constraint failed: <table>.<column>"`
    pub fn is_unique_violation(&self) -> bool {
        self.database_message()
            .is_some_and(|msg| msg.contains("UNIQUE constraint failed"))
    }

    /// True when SQLite reported a FOREIGN KEY constraint failure.
    pub fn is_foreign_key_violation(&self) -> bool {
        self.database_message()
            .is_some_and(|msg| msg.contains("FOREIGN KEY constraint failed"))
    }

    fn database_message(&self) -> Option<&str> {
        match self {
            DbError::Persistence {
                source: sqlx::Error::Database(db_err),
                ..
            } => Some(db_err.message()),
            _ => None,
        }
    }
}

/// Bare `?` on a sqlx error, outside any named repository operation.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),
            other => DbError::persistence("query", other),
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
