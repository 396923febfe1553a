use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid {kind} {value:?}: {reason}")]
    InvalidId {
        kind: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid item key {0:?}: expected page:<node_id> or route:<edge_id>")]
    InvalidItemKey(String),

    #[error("invalid decision {0:?}: expected approved, rejected or pending")]
    InvalidDecision(String),

    #[error("invalid diff status {0:?}")]
    InvalidStatus(String),

    #[error("route {edge} references page {page} which is absent from the map")]
    DanglingRoute { edge: String, page: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}
