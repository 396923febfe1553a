use navmap_types::{DiffId, DiffStatus, ProjectId};

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested document was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A diff with this id already exists.
    #[error("diff already exists: {0}")]
    AlreadyExists(DiffId),

    /// The map was written by someone else since it was read.
    #[error("concurrent modification of the map of project {project}")]
    Conflict { project: ProjectId },

    /// A guarded status transition found the diff in an unexpected state.
    #[error("diff {diff} is {found}, expected {expected}")]
    StatusConflict {
        diff: DiffId,
        expected: DiffStatus,
        found: DiffStatus,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend cannot serve requests (poisoned lock, lost connection).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
