//! Error types for reconciliation.

use vault_store::StoreError;

/// Errors that abort a reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A store operation failed. Includes `NotFound` for a connection
    /// notification whose job was never created.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The job exists but tracks a different protocol.
    #[error("job {job_id} tracks {found}, not {expected}")]
    ProtocolMismatch {
        job_id: String,
        expected: &'static str,
        found: &'static str,
    },

    /// An update arrived for an unseen run without the offer payload needed
    /// to synthesize it.
    #[error("job {0}: update without offer payload for an unknown run")]
    MissingPayload(String),

    /// A pending job does not reference its protocol entity.
    #[error("job {0} has no protocol entity")]
    MissingEntity(String),

    /// The blocking reconciliation task panicked or was cancelled.
    #[error("reconciliation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(StoreError::from(err))
    }
}

impl From<r2d2::Error> for SyncError {
    fn from(err: r2d2::Error) -> Self {
        Self::Store(StoreError::from(err))
    }
}

impl SyncError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_not_found())
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_unavailable())
    }
}

/// Result type for reconciliation.
pub type Result<T> = std::result::Result<T, SyncError>;
