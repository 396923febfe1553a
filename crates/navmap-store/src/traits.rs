//! Storage interfaces consumed by the merge engine.
//!
//! Any backend (in-memory, filesystem, database) implements these traits.
//! They are split by document kind so a deployment can put maps, diffs and
//! audit entries in different places, but every bundled backend implements
//! all three.

use navmap_types::{AuditEntry, Diff, DiffId, DiffStatus, Map, ProjectId};

use crate::error::StoreResult;
use crate::token::{ConcurrencyToken, VersionedMap};

/// Durable storage for one map document per project.
///
/// Implementations must be thread-safe (`Send + Sync`). The concurrency token
/// acts as a compare-and-swap guard: no implementation may block one writer
/// on another.
pub trait MapStore: Send + Sync {
    /// Read the live map of a project.
    ///
    /// A project that has never been written yields [`Map::empty`] with
    /// [`ConcurrencyToken::absent`], never an error.
    fn read_map(&self, project: &ProjectId) -> StoreResult<VersionedMap>;

    /// Replace the map only if its token still equals `expected`.
    ///
    /// Returns the new token on success and
    /// [`StoreError::Conflict`](crate::StoreError::Conflict) if another writer
    /// committed since `expected` was read.
    fn write_map_if_unchanged(
        &self,
        project: &ProjectId,
        map: &Map,
        expected: &ConcurrencyToken,
    ) -> StoreResult<ConcurrencyToken>;
}

/// Durable storage for diff documents.
///
/// Diffs are physically partitioned by project. A point read by id that
/// misses its partition index must fall back to a scan keyed by the logical
/// id; `Ok(None)` is only allowed when the diff exists nowhere.
pub trait DiffStore: Send + Sync {
    /// Read a diff by id. Returns `Ok(None)` if it does not exist.
    fn read_diff(&self, id: &DiffId) -> StoreResult<Option<Diff>>;

    /// Store a new diff.
    ///
    /// Fails with [`StoreError::AlreadyExists`](crate::StoreError::AlreadyExists)
    /// if the id is taken; existing diffs are never overwritten.
    fn create_diff(&self, diff: &Diff) -> StoreResult<DiffId>;

    /// Transition a diff's status, guarded on its current status.
    ///
    /// Fails with
    /// [`StoreError::StatusConflict`](crate::StoreError::StatusConflict) if the
    /// stored status is not `expected`.
    fn write_diff_status(
        &self,
        id: &DiffId,
        expected: DiffStatus,
        status: DiffStatus,
    ) -> StoreResult<()>;

    /// List the diffs of a project, optionally filtered by status, oldest first.
    fn list_diffs(&self, project: &ProjectId, status: Option<DiffStatus>)
        -> StoreResult<Vec<Diff>>;

    /// List only the pending diffs of a project.
    fn pending_diffs(&self, project: &ProjectId) -> StoreResult<Vec<Diff>> {
        self.list_diffs(project, Some(DiffStatus::Pending))
    }
}

/// Append-only log of merge decisions.
pub trait AuditLog: Send + Sync {
    /// Append a batch of entries. Entries are never mutated or deleted.
    fn append_audit(&self, entries: &[AuditEntry]) -> StoreResult<()>;

    /// All entries recorded for a diff, in append order.
    fn audit_for_diff(&self, id: &DiffId) -> StoreResult<Vec<AuditEntry>>;
}
