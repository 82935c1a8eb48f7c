//! Error types for the entity store.

use rusqlite::ErrorCode;

/// Errors returned by entity store operations.
///
/// [`StoreError::NotFound`] is a normal outcome of a lookup, not a failure:
/// callers branch on it with [`StoreError::is_not_found`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No row matched the id within the tenant.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The write would violate an entity invariant.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No connection to the store could be obtained.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] r2d2::Error),

    /// The request was malformed (for example both `after` and `before`).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A SQL statement failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A JSON column could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: &str) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// `true` for failures of the store itself rather than of the request:
    /// pool exhaustion, or SQLite reporting the database busy or unopenable.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen
            ),
            _ => false,
        }
    }
}

/// Result type for entity store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
