//! Error types for the merge engine.

use navmap_store::StoreError;
use navmap_types::{DiffId, ProjectId};

/// Errors that can occur during merge operations.
///
/// Every variant is surfaced to the caller verbatim. Resolver overrides and
/// demotions are not errors; they are reported in [`crate::MergeResult`].
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// A referenced diff or project does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The diff is not pending, or was consumed concurrently.
    #[error("diff {diff} cannot be merged: {reason}")]
    InvalidState { diff: DiffId, reason: String },

    /// The request payload is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The map kept changing underneath the merge until the retry budget ran
    /// out. Nothing was committed.
    #[error("map of project {project} changed concurrently; gave up after {attempts} attempts")]
    Conflict { project: ProjectId, attempts: u32 },

    /// Infrastructure failure in a store.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A computed map would violate the no-dangling-route invariant.
    #[error("map invariant violated: {0}")]
    Invariant(String),
}

impl MergeError {
    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Conflict { .. } => "conflict",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Invariant(_) => "invariant",
        }
    }

    /// Returns `true` if resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::StoreUnavailable(_))
    }
}

impl From<StoreError> for MergeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::AlreadyExists(id) => {
                Self::InvalidArgument(format!("diff {id} already exists"))
            }
            StoreError::Conflict { project } => Self::Conflict {
                project,
                attempts: 1,
            },
            StoreError::StatusConflict { diff, found, .. } => Self::InvalidState {
                diff,
                reason: format!("diff is {found}"),
            },
            StoreError::Serialization(msg) => Self::StoreUnavailable(format!("corrupt document: {msg}")),
            StoreError::Io(e) => Self::StoreUnavailable(e.to_string()),
            StoreError::Unavailable(msg) => Self::StoreUnavailable(msg),
        }
    }
}

/// Convenience type alias for merge operations.
pub type Result<T> = std::result::Result<T, MergeError>;
