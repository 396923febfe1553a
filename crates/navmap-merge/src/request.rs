//! Inputs and outputs of the merge engine's operations.

use std::collections::BTreeMap;

use navmap_types::{Decision, DiffId, DiffItem, DiffStatus, ItemKey, Map, ProjectId, ReasonCode};
use serde::{Deserialize, Serialize};

use crate::error::{MergeError, Result};

/// Actor recorded when the caller does not name one.
pub const ANONYMOUS_ACTOR: &str = "anonymous";

/// Reviewer decisions submitted with a merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decisions {
    /// Per-item decisions. Items not mentioned keep their stored decision.
    PerItem(BTreeMap<ItemKey, Decision>),
    /// All-or-nothing shorthand: approve or reject every item.
    All { approve: bool },
}

impl Default for Decisions {
    fn default() -> Self {
        Self::PerItem(BTreeMap::new())
    }
}

impl Decisions {
    pub fn approve_all() -> Self {
        Self::All { approve: true }
    }

    pub fn reject_all() -> Self {
        Self::All { approve: false }
    }

    /// Per-item decisions from `(key, decision)` pairs.
    pub fn per_item(pairs: impl IntoIterator<Item = (ItemKey, Decision)>) -> Self {
        Self::PerItem(pairs.into_iter().collect())
    }
}

/// A request to merge one diff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeRequest {
    pub diff_id: DiffId,
    pub decisions: Decisions,
    /// Opaque reviewer identity copied into every audit entry.
    pub actor: String,
}

impl MergeRequest {
    pub fn new(diff_id: DiffId, decisions: Decisions) -> Self {
        Self {
            diff_id,
            decisions,
            actor: ANONYMOUS_ACTOR.to_string(),
        }
    }

    /// Builder-style actor setter.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }
}

/// Transport form of a merge request body.
///
/// Either `decisions` (per item) or the `approve` shorthand may be given,
/// not both. Neither means "use the decisions stored on the items".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSubmission {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decisions: Option<BTreeMap<ItemKey, Decision>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approve: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl MergeSubmission {
    /// Validate the body and turn it into [`Decisions`].
    pub fn to_decisions(&self) -> Result<Decisions> {
        match (&self.decisions, self.approve) {
            (Some(_), Some(_)) => Err(MergeError::InvalidArgument(
                "give either per-item decisions or the approve flag, not both".into(),
            )),
            (Some(per_item), None) => Ok(Decisions::PerItem(per_item.clone())),
            (None, Some(approve)) => Ok(Decisions::All { approve }),
            (None, None) => Ok(Decisions::default()),
        }
    }

    /// Build a [`MergeRequest`], falling back to `default_actor`.
    pub fn into_request(self, diff_id: DiffId, default_actor: &str) -> Result<MergeRequest> {
        let decisions = self.to_decisions()?;
        let actor = self
            .actor
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| default_actor.to_string());
        Ok(MergeRequest {
            diff_id,
            decisions,
            actor,
        })
    }
}

/// Outcome of a committed merge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    /// Map version after the merge.
    pub map_version: u64,
    /// Map version the committed attempt started from.
    pub previous_version: u64,
    /// Items merged into the map, including ones that were already present.
    pub applied_count: usize,
    /// Items that were genuinely new to the map.
    pub inserted_count: usize,
    /// The remainder diff holding undecided items, if one was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_diff_id: Option<DiffId>,
    /// Distinct pages whose explicit rejection was overridden.
    pub conflicts_overridden: usize,
    /// Approved routes held back by the resolver.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub demoted: Vec<ItemKey>,
    /// Final status of the merged diff.
    pub diff_status: DiffStatus,
    /// Read-resolve-write attempts it took to commit.
    pub attempts: u32,
}

/// What a merge would do against the live map, without committing it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MergePreview {
    pub diff_id: DiffId,
    pub base_version: u64,
    /// The map as it would look after the merge.
    pub map: Map,
    pub decisions: BTreeMap<ItemKey, Decision>,
    pub reasons: BTreeMap<ItemKey, ReasonCode>,
    pub to_apply: Vec<ItemKey>,
    pub remainder: Vec<ItemKey>,
    pub inserted_count: usize,
    pub conflicts_overridden: usize,
}

/// A diff submitted by the diff computation collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewDiff {
    pub project_id: ProjectId,
    /// The map version the items were computed against. Defaults to the live
    /// version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<u64>,
    pub items: Vec<DiffItem>,
}
