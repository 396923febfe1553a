use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use navmap_store::{AuditLog, DiffStore, MapStore, StoreError, VersionedMap};
use navmap_types::{AuditEntry, Decision, Diff, DiffId, DiffStatus, ItemKey, Map, ProjectId};
use tracing::{debug, info, warn};

use crate::config::{MergeConfig, UnknownKeyPolicy};
use crate::error::{MergeError, Result};
use crate::plan::MergePlan;
use crate::request::{Decisions, MergePreview, MergeRequest, MergeResult, NewDiff};
use crate::resolver::{DependencyResolver, Resolution};

// ---------------------------------------------------------------------------
// MergeEngine
// ---------------------------------------------------------------------------

/// Applies reviewed diffs to the live map of their project.
///
/// The engine holds no state between calls beyond its store handles. Every
/// merge reads the map fresh, and the only coordination between concurrent
/// merges is the concurrency token of the map document.
pub struct MergeEngine {
    maps: Arc<dyn MapStore>,
    diffs: Arc<dyn DiffStore>,
    audit: Arc<dyn AuditLog>,
    config: MergeConfig,
}

impl MergeEngine {
    /// Create an engine backed by one store implementing all three traits.
    pub fn new<S>(store: Arc<S>, config: MergeConfig) -> Self
    where
        S: MapStore + DiffStore + AuditLog + 'static,
    {
        Self {
            maps: store.clone(),
            diffs: store.clone(),
            audit: store,
            config,
        }
    }

    /// Create an engine over separate map, diff and audit stores.
    pub fn with_stores(
        maps: Arc<dyn MapStore>,
        diffs: Arc<dyn DiffStore>,
        audit: Arc<dyn AuditLog>,
        config: MergeConfig,
    ) -> Self {
        Self {
            maps,
            diffs,
            audit,
            config,
        }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    fn resolver(&self) -> DependencyResolver {
        DependencyResolver::new(self.config.rejection_policy)
    }

    // -----------------------------------------------------------------------
    // Merging
    // -----------------------------------------------------------------------

    /// Merge the approved subset of a pending diff into the live map.
    ///
    /// Whatever stays undecided is carried into a new pending remainder diff.
    /// On a map conflict the whole attempt is redone against the fresh map,
    /// up to [`MergeConfig::max_attempts`] times; nothing outside the map is
    /// written before the map commit succeeds.
    pub fn merge_diff_partial(&self, request: MergeRequest) -> Result<MergeResult> {
        let diff = self.pending_diff(&request.diff_id)?;
        let raw = self.raw_decisions(&diff, &request.decisions)?;
        let resolver = self.resolver();
        let budget = self.config.attempt_budget();

        for attempt in 1..=budget {
            let VersionedMap { map, token } = self.maps.read_map(&diff.project_id)?;
            let resolution = resolver.resolve(&diff.items, &raw, &map);
            let plan = MergePlan::build(&diff, &resolution, &map)?;
            debug!(
                diff = %diff.diff_id,
                attempt,
                base = map.version,
                inserted = plan.inserted_count(),
                remainder = plan.remainder().len(),
                "merge attempt"
            );

            if plan.has_changes() {
                match self
                    .maps
                    .write_map_if_unchanged(&diff.project_id, plan.map(), &token)
                {
                    Ok(_) => {}
                    Err(StoreError::Conflict { .. }) => {
                        warn!(
                            project = %diff.project_id,
                            diff = %diff.diff_id,
                            attempt,
                            "map changed concurrently; retrying"
                        );
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            return self.finish(&diff, &request.actor, plan, &resolution, attempt);
        }

        warn!(project = %diff.project_id, diff = %diff.diff_id, budget, "merge gave up");
        Err(MergeError::Conflict {
            project: diff.project_id,
            attempts: budget,
        })
    }

    /// Side effects after a committed map write: remainder, status, audit.
    fn finish(
        &self,
        diff: &Diff,
        actor: &str,
        plan: MergePlan,
        resolution: &Resolution,
        attempts: u32,
    ) -> Result<MergeResult> {
        let now = Utc::now();

        let new_diff_id = match plan.remainder_diff(diff, now) {
            Some(remainder) => Some(self.create_remainder(diff, &remainder)?),
            None => None,
        };

        let status = plan.final_status();
        self.diffs
            .write_diff_status(&diff.diff_id, DiffStatus::Pending, status)?;

        let entries = plan.audit_entries(diff.diff_id, actor, now);
        self.audit.append_audit(&entries)?;

        let result = MergeResult {
            map_version: plan.resulting_version(),
            previous_version: plan.previous_version(),
            applied_count: plan.applied_count(),
            inserted_count: plan.inserted_count(),
            new_diff_id,
            conflicts_overridden: resolution.conflicts_overridden(),
            demoted: resolution.demoted(),
            diff_status: status,
            attempts,
        };
        info!(
            project = %diff.project_id,
            diff = %diff.diff_id,
            version = result.map_version,
            applied = result.applied_count,
            inserted = result.inserted_count,
            overridden = result.conflicts_overridden,
            status = %status,
            actor,
            "diff merged"
        );
        Ok(result)
    }

    fn create_remainder(&self, parent: &Diff, remainder: &Diff) -> Result<DiffId> {
        match self.diffs.create_diff(remainder) {
            Ok(id) => Ok(id),
            Err(StoreError::AlreadyExists(_)) => Err(MergeError::InvalidState {
                diff: parent.diff_id,
                reason: "diff was consumed by a concurrent merge".into(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Dry-run a merge against the live map. Nothing is written.
    pub fn preview(&self, diff_id: &DiffId, decisions: &Decisions) -> Result<MergePreview> {
        let diff = self.pending_diff(diff_id)?;
        let raw = self.raw_decisions(&diff, decisions)?;
        let VersionedMap { map, .. } = self.maps.read_map(&diff.project_id)?;
        let resolution = self.resolver().resolve(&diff.items, &raw, &map);
        let plan = MergePlan::build(&diff, &resolution, &map)?;

        Ok(MergePreview {
            diff_id: diff.diff_id,
            base_version: map.version,
            to_apply: plan.to_apply().to_vec(),
            remainder: plan.remainder_keys(),
            inserted_count: plan.inserted_count(),
            conflicts_overridden: resolution.conflicts_overridden(),
            decisions: resolution.decisions().clone(),
            reasons: resolution.reasons().clone(),
            map: plan.into_map(),
        })
    }

    /// Load a diff that may still be merged.
    fn pending_diff(&self, diff_id: &DiffId) -> Result<Diff> {
        let diff = self.diff(diff_id)?;
        if !diff.status.is_pending() {
            return Err(MergeError::InvalidState {
                diff: diff.diff_id,
                reason: format!("diff is {}", diff.status),
            });
        }
        Ok(diff)
    }

    /// The raw decision for every item: the request's, else the stored one.
    ///
    /// Duplicate keys take the first stored decision.
    fn raw_decisions(
        &self,
        diff: &Diff,
        decisions: &Decisions,
    ) -> Result<BTreeMap<ItemKey, Decision>> {
        let mut raw = BTreeMap::new();
        for item in &diff.items {
            raw.entry(item.key()).or_insert(item.decision);
        }

        match decisions {
            Decisions::All { approve } => {
                let decision = Decision::from_approve(*approve);
                raw.values_mut().for_each(|d| *d = decision);
            }
            Decisions::PerItem(requested) => {
                for (key, decision) in requested {
                    match raw.get_mut(key) {
                        Some(slot) => *slot = *decision,
                        None if self.config.unknown_keys == UnknownKeyPolicy::Strict => {
                            return Err(MergeError::InvalidArgument(format!(
                                "diff {} has no item {key}",
                                diff.diff_id
                            )));
                        }
                        None => {
                            warn!(diff = %diff.diff_id, item = %key, "ignoring decision for unknown item");
                        }
                    }
                }
            }
        }
        Ok(raw)
    }

    // -----------------------------------------------------------------------
    // Intake and queries
    // -----------------------------------------------------------------------

    /// Store a new pending diff.
    ///
    /// The base version defaults to the live map version and may not be ahead
    /// of it.
    pub fn submit_diff(&self, new: NewDiff) -> Result<Diff> {
        if new.items.is_empty() {
            return Err(MergeError::InvalidArgument("diff has no items".into()));
        }

        let live = self.maps.read_map(&new.project_id)?.map.version;
        let base_version = new.base_version.unwrap_or(live);
        if base_version > live {
            return Err(MergeError::InvalidArgument(format!(
                "base version {base_version} is ahead of map version {live}"
            )));
        }

        let diff = Diff::new(new.project_id, base_version, new.items);
        let duplicates = diff.duplicate_keys();
        if !duplicates.is_empty() {
            let keys: Vec<String> = duplicates.iter().map(ToString::to_string).collect();
            return Err(MergeError::InvalidArgument(format!(
                "duplicate items: {}",
                keys.join(", ")
            )));
        }

        self.diffs.create_diff(&diff)?;
        info!(
            project = %diff.project_id,
            diff = %diff.diff_id,
            items = diff.len(),
            base = base_version,
            "diff submitted"
        );
        Ok(diff)
    }

    /// The live map of a project.
    pub fn current_map(&self, project: &ProjectId) -> Result<Map> {
        Ok(self.maps.read_map(project)?.map)
    }

    /// Fetch a diff by id.
    pub fn diff(&self, diff_id: &DiffId) -> Result<Diff> {
        self.diffs
            .read_diff(diff_id)?
            .ok_or_else(|| MergeError::NotFound(format!("diff {diff_id}")))
    }

    pub fn diffs(&self, project: &ProjectId, status: Option<DiffStatus>) -> Result<Vec<Diff>> {
        Ok(self.diffs.list_diffs(project, status)?)
    }

    /// Audit entries recorded for a diff, oldest first.
    pub fn audit_trail(&self, diff_id: &DiffId) -> Result<Vec<AuditEntry>> {
        let entries = self.audit.audit_for_diff(diff_id)?;
        if entries.is_empty() {
            // Distinguish "never merged" from "no such diff".
            self.diff(diff_id)?;
        }
        Ok(entries)
    }
}

impl std::fmt::Debug for MergeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
