//! A merge plan: the resolved decisions applied to a working copy of the map.
//!
//! Building a plan has no side effects. The engine commits it; preview only
//! reports it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use navmap_types::{
    AuditEntry, AuditOutcome, Decision, Diff, DiffId, DiffItem, DiffPayload, DiffStatus, ItemKey,
    Map, ReasonCode,
};

use crate::error::{MergeError, Result};
use crate::resolver::Resolution;

/// What happens to each item of a diff in one merge attempt.
#[derive(Clone, Debug)]
pub struct MergePlan {
    map: Map,
    previous_version: u64,
    to_apply: Vec<ItemKey>,
    remainder: Vec<DiffItem>,
    outcomes: Vec<(ItemKey, Decision, AuditOutcome)>,
    reasons: BTreeMap<ItemKey, ReasonCode>,
    inserted: usize,
}

impl MergePlan {
    /// Apply the approved subset of `diff` to a copy of `current`.
    ///
    /// The version is bumped by exactly one if at least one entity was
    /// genuinely new. The resulting map is checked for dangling routes.
    pub fn build(diff: &Diff, resolution: &Resolution, current: &Map) -> Result<Self> {
        let mut map = current.clone();
        let mut to_apply = Vec::new();
        let mut remainder = Vec::new();
        let mut outcomes = Vec::with_capacity(diff.items.len());
        let mut inserted = 0;

        // Pages first so a route never lands before its endpoints.
        let (pages, routes): (Vec<&DiffItem>, Vec<&DiffItem>) = diff
            .items
            .iter()
            .partition(|item| matches!(item.payload, DiffPayload::Page(_)));

        let mut applied: BTreeMap<ItemKey, bool> = BTreeMap::new();
        for item in pages.into_iter().chain(routes) {
            let key = item.key();
            if applied.contains_key(&key) || !resolution.decision(&key).is_approved() {
                continue;
            }
            let is_new = match &item.payload {
                DiffPayload::Page(page) => map.insert_page(page.clone()),
                DiffPayload::Route(route) => map.insert_route(route.clone()),
            };
            if is_new {
                inserted += 1;
            }
            applied.insert(key, is_new);
        }

        for item in &diff.items {
            let key = item.key();
            let decision = resolution.decision(&key);
            let outcome = match applied.get(&key) {
                Some(true) => AuditOutcome::Inserted,
                Some(false) => AuditOutcome::AlreadyPresent,
                None if decision.is_rejected() => AuditOutcome::Rejected,
                None => AuditOutcome::Deferred,
            };
            if outcome.is_applied() {
                if !to_apply.contains(&key) {
                    to_apply.push(key.clone());
                }
            } else {
                remainder.push(DiffItem {
                    payload: item.payload.clone(),
                    decision: Decision::Pending,
                    reason: resolution.reason(&key).cloned(),
                });
            }
            outcomes.push((key, decision, outcome));
        }

        if inserted > 0 {
            map.version = current.version + 1;
        }

        if let Some(dangling) = map.dangling_routes().into_iter().next() {
            return Err(MergeError::Invariant(format!(
                "route {} would reference missing page {}",
                dangling.edge_id, dangling.missing_page
            )));
        }

        Ok(Self {
            map,
            previous_version: current.version,
            to_apply,
            remainder,
            outcomes,
            reasons: resolution.reasons().clone(),
            inserted,
        })
    }

    /// The map after the merge.
    pub fn map(&self) -> &Map {
        &self.map
    }

    pub fn into_map(self) -> Map {
        self.map
    }

    pub fn previous_version(&self) -> u64 {
        self.previous_version
    }

    pub fn resulting_version(&self) -> u64 {
        self.map.version
    }

    /// Keys of the items merged into the map, in submission order.
    pub fn to_apply(&self) -> &[ItemKey] {
        &self.to_apply
    }

    /// Items carried into the remainder diff, decisions reset to pending.
    pub fn remainder(&self) -> &[DiffItem] {
        &self.remainder
    }

    pub fn remainder_keys(&self) -> Vec<ItemKey> {
        self.remainder.iter().map(DiffItem::key).collect()
    }

    /// Number of applied items, counting ones that were already present.
    pub fn applied_count(&self) -> usize {
        self.to_apply.len()
    }

    /// Number of entities that were genuinely new to the map.
    pub fn inserted_count(&self) -> usize {
        self.inserted
    }

    /// Returns `true` if the map must be written.
    pub fn has_changes(&self) -> bool {
        self.inserted > 0
    }

    /// Returns `true` if every item of the diff ended up rejected.
    pub fn all_rejected(&self) -> bool {
        !self.outcomes.is_empty()
            && self
                .outcomes
                .iter()
                .all(|(_, _, outcome)| *outcome == AuditOutcome::Rejected)
    }

    /// Whether a remainder diff should be created for this plan.
    pub fn needs_remainder(&self) -> bool {
        !self.remainder.is_empty() && !self.all_rejected()
    }

    /// Status the consumed diff moves to.
    pub fn final_status(&self) -> DiffStatus {
        if self.all_rejected() {
            DiffStatus::Rejected
        } else if self.needs_remainder() {
            DiffStatus::PartiallyApplied
        } else {
            DiffStatus::Applied
        }
    }

    /// The remainder diff of `parent`, if one is needed.
    pub fn remainder_diff(&self, parent: &Diff, created_at: DateTime<Utc>) -> Option<Diff> {
        if !self.needs_remainder() {
            return None;
        }
        Some(Diff {
            diff_id: DiffId::remainder_of(&parent.diff_id),
            project_id: parent.project_id.clone(),
            base_version: self.resulting_version(),
            status: DiffStatus::Pending,
            items: self.remainder.clone(),
            parent_diff_id: Some(parent.diff_id),
            created_at,
        })
    }

    /// One audit entry per item of the diff.
    pub fn audit_entries(
        &self,
        diff_id: DiffId,
        actor: &str,
        timestamp: DateTime<Utc>,
    ) -> Vec<AuditEntry> {
        self.outcomes
            .iter()
            .map(|(key, decision, outcome)| AuditEntry {
                diff_id,
                item_key: key.clone(),
                decision: *decision,
                reason: self.reasons.get(key).cloned(),
                outcome: *outcome,
                previous_map_version: self.previous_version,
                resulting_map_version: self.resulting_version(),
                timestamp,
                actor: actor.to_string(),
            })
            .collect()
    }
}
