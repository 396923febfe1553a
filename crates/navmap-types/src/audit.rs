//! Audit trail entries recorded for every merge decision.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diff::{Decision, ReasonCode};
use crate::ids::{DiffId, ItemKey};

/// What a merge did with one item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Approved and genuinely new to the map.
    Inserted,
    /// Approved but already in the map; no structural change.
    AlreadyPresent,
    /// Left undecided and carried into the remainder diff.
    Deferred,
    /// Rejected by the reviewer.
    Rejected,
}

impl AuditOutcome {
    /// Returns `true` if the item is part of the map after the merge.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Inserted | Self::AlreadyPresent)
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inserted => write!(f, "inserted"),
            Self::AlreadyPresent => write!(f, "already_present"),
            Self::Deferred => write!(f, "deferred"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// One append-only record of a decision on a diff item.
///
/// Entries are keyed by `diff_id` + `item_key` + `timestamp`. A merge call
/// appends exactly one entry per item of the diff it consumed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub diff_id: DiffId,
    pub item_key: ItemKey,
    /// The decision after dependency expansion.
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
    pub outcome: AuditOutcome,
    /// Map version read at the start of the committed attempt.
    pub previous_map_version: u64,
    /// Map version immediately after the merge.
    pub resulting_map_version: u64,
    pub timestamp: DateTime<Utc>,
    /// Opaque reviewer identity, passed through from the caller.
    pub actor: String,
}

impl AuditEntry {
    /// Returns `true` if this entry records a rejection that the resolver
    /// overrode.
    pub fn is_override(&self) -> bool {
        matches!(self.reason, Some(ReasonCode::RejectionOverridden { .. }))
    }
}
