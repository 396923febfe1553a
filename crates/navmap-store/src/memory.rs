//! In-memory store for tests and embedding.
//!
//! [`InMemoryStore`] keeps maps, diffs and audit entries in `HashMap`s behind
//! `RwLock`s and implements all three storage traits. Data is lost when the
//! store is dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use navmap_types::{AuditEntry, Diff, DiffId, DiffStatus, Map, ProjectId};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::token::{ConcurrencyToken, VersionedMap};
use crate::traits::{AuditLog, DiffStore, MapStore};

#[derive(Debug)]
struct StoredMap {
    map: Map,
    generation: u64,
}

impl StoredMap {
    fn token(&self) -> ConcurrencyToken {
        ConcurrencyToken::new(format!("g{}", self.generation))
    }
}

/// Diffs partitioned by project, plus an id → partition index.
#[derive(Debug, Default)]
struct DiffPartitions {
    partitions: HashMap<ProjectId, BTreeMap<DiffId, Diff>>,
    index: HashMap<DiffId, ProjectId>,
}

impl DiffPartitions {
    fn point_read(&self, id: &DiffId) -> Option<&Diff> {
        let project = self.index.get(id)?;
        self.partitions.get(project)?.get(id)
    }

    fn scan(&self, id: &DiffId) -> Option<&Diff> {
        self.partitions.values().find_map(|partition| partition.get(id))
    }

    fn locate_mut(&mut self, id: &DiffId) -> Option<&mut Diff> {
        let project = match self.index.get(id) {
            Some(project) if self.partitions.get(project).is_some_and(|p| p.contains_key(id)) => {
                project.clone()
            }
            _ => {
                let project = self
                    .partitions
                    .iter()
                    .find(|(_, partition)| partition.contains_key(id))
                    .map(|(project, _)| project.clone())?;
                self.index.insert(*id, project.clone());
                project
            }
        };
        self.partitions.get_mut(&project)?.get_mut(id)
    }
}

/// An in-memory implementation of [`MapStore`], [`DiffStore`] and
/// [`AuditLog`].
///
/// Map tokens are per-project generation counters bumped on every
/// successful conditional write.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    maps: RwLock<HashMap<ProjectId, StoredMap>>,
    diffs: RwLock<DiffPartitions>,
    audit: RwLock<Vec<AuditEntry>>,
}

fn read_lock<T>(lock: &RwLock<T>) -> StoreResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
}

fn write_lock<T>(lock: &RwLock<T>) -> StoreResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of diffs across all projects.
    pub fn diff_count(&self) -> usize {
        self.diffs
            .read()
            .map(|d| d.partitions.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    /// Total number of audit entries.
    pub fn audit_len(&self) -> usize {
        self.audit.read().map(|a| a.len()).unwrap_or(0)
    }

    /// Drop the index entry of a diff, leaving the document in its
    /// partition. Subsequent reads must go through the fallback scan.
    pub fn forget_diff_index(&self, id: &DiffId) -> StoreResult<bool> {
        let mut diffs = write_lock(&self.diffs)?;
        Ok(diffs.index.remove(id).is_some())
    }
}

impl MapStore for InMemoryStore {
    fn read_map(&self, project: &ProjectId) -> StoreResult<VersionedMap> {
        let maps = read_lock(&self.maps)?;
        Ok(match maps.get(project) {
            Some(stored) => VersionedMap {
                map: stored.map.clone(),
                token: stored.token(),
            },
            None => VersionedMap {
                map: Map::empty(project.clone()),
                token: ConcurrencyToken::absent(),
            },
        })
    }

    fn write_map_if_unchanged(
        &self,
        project: &ProjectId,
        map: &Map,
        expected: &ConcurrencyToken,
    ) -> StoreResult<ConcurrencyToken> {
        let mut maps = write_lock(&self.maps)?;
        let current = maps
            .get(project)
            .map(StoredMap::token)
            .unwrap_or_else(ConcurrencyToken::absent);
        if &current != expected {
            debug!(project = %project, expected = %expected, current = %current, "map CAS rejected");
            return Err(StoreError::Conflict {
                project: project.clone(),
            });
        }

        let generation = maps.get(project).map_or(1, |s| s.generation + 1);
        let stored = StoredMap {
            map: map.clone(),
            generation,
        };
        let token = stored.token();
        maps.insert(project.clone(), stored);
        Ok(token)
    }
}

impl DiffStore for InMemoryStore {
    fn read_diff(&self, id: &DiffId) -> StoreResult<Option<Diff>> {
        {
            let diffs = read_lock(&self.diffs)?;
            if let Some(diff) = diffs.point_read(id) {
                return Ok(Some(diff.clone()));
            }
            if diffs.scan(id).is_none() {
                return Ok(None);
            }
        }

        // Index miss but the document exists: repair the index.
        let mut diffs = write_lock(&self.diffs)?;
        debug!(diff = %id, "diff index miss; resolved by partition scan");
        Ok(diffs.locate_mut(id).map(|diff| diff.clone()))
    }

    fn create_diff(&self, diff: &Diff) -> StoreResult<DiffId> {
        let mut diffs = write_lock(&self.diffs)?;
        if diffs.index.contains_key(&diff.diff_id) || diffs.scan(&diff.diff_id).is_some() {
            return Err(StoreError::AlreadyExists(diff.diff_id));
        }
        diffs
            .partitions
            .entry(diff.project_id.clone())
            .or_default()
            .insert(diff.diff_id, diff.clone());
        diffs.index.insert(diff.diff_id, diff.project_id.clone());
        Ok(diff.diff_id)
    }

    fn write_diff_status(
        &self,
        id: &DiffId,
        expected: DiffStatus,
        status: DiffStatus,
    ) -> StoreResult<()> {
        let mut diffs = write_lock(&self.diffs)?;
        let diff = diffs
            .locate_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("diff {id}")))?;
        if diff.status != expected {
            return Err(StoreError::StatusConflict {
                diff: *id,
                expected,
                found: diff.status,
            });
        }
        diff.status = status;
        Ok(())
    }

    fn list_diffs(
        &self,
        project: &ProjectId,
        status: Option<DiffStatus>,
    ) -> StoreResult<Vec<Diff>> {
        let diffs = read_lock(&self.diffs)?;
        let mut result: Vec<Diff> = diffs
            .partitions
            .get(project)
            .map(|partition| {
                partition
                    .values()
                    .filter(|d| status.map_or(true, |s| d.status == s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        result.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.diff_id.cmp(&b.diff_id))
        });
        Ok(result)
    }
}

impl AuditLog for InMemoryStore {
    fn append_audit(&self, entries: &[AuditEntry]) -> StoreResult<()> {
        let mut audit = write_lock(&self.audit)?;
        audit.extend_from_slice(entries);
        Ok(())
    }

    fn audit_for_diff(&self, id: &DiffId) -> StoreResult<Vec<AuditEntry>> {
        let audit = read_lock(&self.audit)?;
        Ok(audit.iter().filter(|e| &e.diff_id == id).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use navmap_types::{AuditOutcome, Decision, DiffItem, ItemKey, NodeId, PageNode};

    fn project(name: &str) -> ProjectId {
        ProjectId::new(name).unwrap()
    }

    fn page_diff(project_name: &str, page: &str) -> Diff {
        Diff::new(
            project(project_name),
            0,
            vec![DiffItem::page(PageNode::new(NodeId::new(page).unwrap()))],
        )
    }

    #[test]
    fn first_read_returns_empty_sentinel() {
        let store = InMemoryStore::new();
        let read = store.read_map(&project("shop")).unwrap();
        assert_eq!(read.map, Map::empty(project("shop")));
        assert!(read.token.is_absent());
    }

    #[test]
    fn conditional_write_advances_token() {
        let store = InMemoryStore::new();
        let p = project("shop");
        let mut map = Map::empty(p.clone());
        map.version = 1;

        let t1 = store
            .write_map_if_unchanged(&p, &map, &ConcurrencyToken::absent())
            .unwrap();
        assert!(!t1.is_absent());

        let read = store.read_map(&p).unwrap();
        assert_eq!(read.token, t1);
        assert_eq!(read.map.version, 1);
    }

    #[test]
    fn stale_token_is_rejected() {
        let store = InMemoryStore::new();
        let p = project("shop");
        let map = Map::empty(p.clone());
        store
            .write_map_if_unchanged(&p, &map, &ConcurrencyToken::absent())
            .unwrap();

        let err = store
            .write_map_if_unchanged(&p, &map, &ConcurrencyToken::absent())
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }), "got: {err}");
    }

    #[test]
    fn tokens_are_per_project() {
        let store = InMemoryStore::new();
        let a = project("a");
        let b = project("b");
        store
            .write_map_if_unchanged(&a, &Map::empty(a.clone()), &ConcurrencyToken::absent())
            .unwrap();
        // Project b was never written, so the absent token still matches.
        store
            .write_map_if_unchanged(&b, &Map::empty(b.clone()), &ConcurrencyToken::absent())
            .unwrap();
    }

    #[test]
    fn create_and_read_diff() {
        let store = InMemoryStore::new();
        let diff = page_diff("shop", "P1");
        let id = store.create_diff(&diff).unwrap();
        assert_eq!(store.read_diff(&id).unwrap(), Some(diff));
        assert_eq!(store.read_diff(&DiffId::new()).unwrap(), None);
    }

    #[test]
    fn duplicate_diff_id_is_rejected() {
        let store = InMemoryStore::new();
        let diff = page_diff("shop", "P1");
        store.create_diff(&diff).unwrap();
        let err = store.create_diff(&diff).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == diff.diff_id));
    }

    #[test]
    fn read_falls_back_to_scan_on_index_miss() {
        let store = InMemoryStore::new();
        let diff = page_diff("shop", "P1");
        store.create_diff(&diff).unwrap();
        assert!(store.forget_diff_index(&diff.diff_id).unwrap());

        let read = store.read_diff(&diff.diff_id).unwrap();
        assert_eq!(read.map(|d| d.diff_id), Some(diff.diff_id));
        // The scan repaired the index.
        assert!(store.forget_diff_index(&diff.diff_id).unwrap());
    }

    #[test]
    fn status_write_is_guarded() {
        let store = InMemoryStore::new();
        let diff = page_diff("shop", "P1");
        store.create_diff(&diff).unwrap();

        store
            .write_diff_status(&diff.diff_id, DiffStatus::Pending, DiffStatus::Applied)
            .unwrap();
        let err = store
            .write_diff_status(&diff.diff_id, DiffStatus::Pending, DiffStatus::Rejected)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::StatusConflict {
                found: DiffStatus::Applied,
                ..
            }
        ));
    }

    #[test]
    fn status_write_on_unknown_diff_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .write_diff_status(&DiffId::new(), DiffStatus::Pending, DiffStatus::Applied)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn list_diffs_filters_by_project_and_status() {
        let store = InMemoryStore::new();
        let d1 = page_diff("shop", "P1");
        let d2 = page_diff("shop", "P2");
        let other = page_diff("blog", "P1");
        for d in [&d1, &d2, &other] {
            store.create_diff(d).unwrap();
        }
        store
            .write_diff_status(&d1.diff_id, DiffStatus::Pending, DiffStatus::Applied)
            .unwrap();

        assert_eq!(store.list_diffs(&project("shop"), None).unwrap().len(), 2);
        let pending = store.pending_diffs(&project("shop")).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].diff_id, d2.diff_id);
        assert!(store.pending_diffs(&project("nope")).unwrap().is_empty());
    }

    #[test]
    fn audit_is_filtered_by_diff() {
        let store = InMemoryStore::new();
        let id = DiffId::new();
        let entry = |diff_id| AuditEntry {
            diff_id,
            item_key: ItemKey::Page(NodeId::new("P1").unwrap()),
            decision: Decision::Approved,
            reason: None,
            outcome: AuditOutcome::Inserted,
            previous_map_version: 0,
            resulting_map_version: 1,
            timestamp: Utc::now(),
            actor: "tester".into(),
        };
        store.append_audit(&[entry(id), entry(DiffId::new())]).unwrap();
        assert_eq!(store.audit_for_diff(&id).unwrap().len(), 1);
        assert_eq!(store.audit_len(), 2);
    }
}
