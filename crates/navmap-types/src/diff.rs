//! Diffs: batches of proposed pages and routes awaiting review.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::ids::{DiffId, EdgeId, ItemKey, NodeId, ProjectId};
use crate::map::{PageNode, RouteEdge};

/// A reviewer's decision on a single diff item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Not decided yet; the item is deferred to a remainder diff.
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl Decision {
    /// Map the all-or-nothing `approve` flag onto a per-item decision.
    pub fn from_approve(approve: bool) -> Self {
        if approve {
            Self::Approved
        } else {
            Self::Rejected
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for Decision {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "defer" | "deferred" => Ok(Self::Pending),
            "approved" | "approve" => Ok(Self::Approved),
            "rejected" | "reject" => Ok(Self::Rejected),
            _ => Err(TypeError::InvalidDecision(s.to_string())),
        }
    }
}

/// Lifecycle state of a diff.
///
/// Only `Pending` diffs can be merged. Every other state is terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    #[default]
    Pending,
    /// Merged with a remainder diff holding the undecided items.
    PartiallyApplied,
    Applied,
    /// Every item was explicitly rejected.
    Rejected,
}

impl DiffStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::PartiallyApplied => write!(f, "partially_applied"),
            Self::Applied => write!(f, "applied"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for DiffStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "partially_applied" => Ok(Self::PartiallyApplied),
            "applied" => Ok(Self::Applied),
            "rejected" => Ok(Self::Rejected),
            _ => Err(TypeError::InvalidStatus(s.to_string())),
        }
    }
}

/// Why the dependency resolver changed or withheld an item's decision.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ReasonCode {
    /// A pending page was approved because an approved route needs it.
    ForcedByRoute { route: EdgeId },
    /// An explicitly rejected page was approved because an approved route
    /// needs it.
    RejectionOverridden { route: EdgeId },
    /// A route endpoint exists neither in the map nor in the diff.
    DanglingReference { page: NodeId },
    /// A route endpoint was rejected and the route was held back instead of
    /// overriding the rejection.
    EndpointRejected { page: NodeId },
}

impl ReasonCode {
    /// Stable short code, suitable for logs and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ForcedByRoute { .. } => "forced_by_route",
            Self::RejectionOverridden { .. } => "rejection_overridden",
            Self::DanglingReference { .. } => "dangling_reference",
            Self::EndpointRejected { .. } => "endpoint_rejected",
        }
    }

    /// Returns `true` for reasons that held an item back from the merge.
    pub fn is_demotion(&self) -> bool {
        matches!(
            self,
            Self::DanglingReference { .. } | Self::EndpointRejected { .. }
        )
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForcedByRoute { route } => write!(f, "forced_by_route({route})"),
            Self::RejectionOverridden { route } => write!(f, "rejection_overridden({route})"),
            Self::DanglingReference { page } => write!(f, "dangling_reference({page})"),
            Self::EndpointRejected { page } => write!(f, "endpoint_rejected({page})"),
        }
    }
}

/// The entity a diff item proposes to add.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffPayload {
    Page(PageNode),
    Route(RouteEdge),
}

/// One mergeable unit within a diff.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiffItem {
    #[serde(flatten)]
    pub payload: DiffPayload,
    #[serde(default)]
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
}

impl DiffItem {
    pub fn page(page: PageNode) -> Self {
        Self {
            payload: DiffPayload::Page(page),
            decision: Decision::Pending,
            reason: None,
        }
    }

    pub fn route(route: RouteEdge) -> Self {
        Self {
            payload: DiffPayload::Route(route),
            decision: Decision::Pending,
            reason: None,
        }
    }

    /// Builder-style decision setter.
    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = decision;
        self
    }

    /// The item's identity within its diff.
    pub fn key(&self) -> ItemKey {
        match &self.payload {
            DiffPayload::Page(page) => ItemKey::Page(page.node_id.clone()),
            DiffPayload::Route(route) => ItemKey::Route(route.edge_id.clone()),
        }
    }

    pub fn as_page(&self) -> Option<&PageNode> {
        match &self.payload {
            DiffPayload::Page(page) => Some(page),
            DiffPayload::Route(_) => None,
        }
    }

    pub fn as_route(&self) -> Option<&RouteEdge> {
        match &self.payload {
            DiffPayload::Route(route) => Some(route),
            DiffPayload::Page(_) => None,
        }
    }
}

/// A batch of proposed page/route additions for one project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub diff_id: DiffId,
    pub project_id: ProjectId,
    /// The map version the items were computed against.
    pub base_version: u64,
    #[serde(default)]
    pub status: DiffStatus,
    /// Items in submission order.
    pub items: Vec<DiffItem>,
    /// The diff this one was split off from, for remainder diffs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_diff_id: Option<DiffId>,
    pub created_at: DateTime<Utc>,
}

impl Diff {
    /// Create a new pending diff with a fresh id.
    pub fn new(project_id: ProjectId, base_version: u64, items: Vec<DiffItem>) -> Self {
        Self {
            diff_id: DiffId::new(),
            project_id,
            base_version,
            status: DiffStatus::Pending,
            items,
            parent_diff_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item keys in submission order.
    pub fn item_keys(&self) -> Vec<ItemKey> {
        self.items.iter().map(DiffItem::key).collect()
    }

    /// Returns the item with the given key, if any.
    pub fn item(&self, key: &ItemKey) -> Option<&DiffItem> {
        self.items.iter().find(|item| &item.key() == key)
    }

    /// Keys that occur more than once, each reported once, sorted.
    pub fn duplicate_keys(&self) -> Vec<ItemKey> {
        let mut seen = BTreeSet::new();
        let mut duplicates = BTreeSet::new();
        for key in self.items.iter().map(DiffItem::key) {
            if !seen.insert(key.clone()) {
                duplicates.insert(key);
            }
        }
        duplicates.into_iter().collect()
    }
}
