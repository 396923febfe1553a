//! File-backed store: one JSON document per map and per diff.
//!
//! On-disk layout under the store root:
//!
//! ```text
//! maps/<project>.json           live map of a project
//! diffs/<project>/<diff>.json   diff documents, partitioned by project
//! diffs/.index/<diff>           partition pointer (holds the project id)
//! audit/<diff>.jsonl            append-only audit entries, one per line
//! ```
//!
//! Documents are replaced through a temp file and an atomic rename, so a
//! reader never observes a half-written document. The map token is the
//! BLAKE3 hash of the stored bytes. Compare-and-write sequences are
//! serialized by a process-local mutex; sharing one root between processes
//! is not supported.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use navmap_types::{AuditEntry, Diff, DiffId, DiffStatus, Map, ProjectId};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::token::{ConcurrencyToken, VersionedMap};
use crate::traits::{AuditLog, DiffStore, MapStore};

const INDEX_DIR: &str = ".index";

/// A [`MapStore`], [`DiffStore`] and [`AuditLog`] backed by a directory.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    write_guard: Mutex<()>,
}

fn content_token(bytes: &[u8]) -> ConcurrencyToken {
    ConcurrencyToken::new(hex::encode(blake3::hash(bytes).as_bytes()))
}

/// Read a file, mapping "does not exist" to `None`.
fn read_optional(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replace `path` with `bytes` via a temp file in the same directory.
fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::Unavailable(format!("no parent directory for {}", path.display())))?;
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

impl FsStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("maps"))?;
        fs::create_dir_all(root.join("diffs").join(INDEX_DIR))?;
        fs::create_dir_all(root.join("audit"))?;
        debug!(root = %root.display(), "opened file store");
        Ok(Self {
            root,
            write_guard: Mutex::new(()),
        })
    }

    /// The store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, ()>> {
        self.write_guard
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("write lock poisoned: {e}")))
    }

    fn map_path(&self, project: &ProjectId) -> PathBuf {
        self.root.join("maps").join(format!("{project}.json"))
    }

    fn partition_dir(&self, project: &ProjectId) -> PathBuf {
        self.root.join("diffs").join(project.as_str())
    }

    fn diff_path(&self, project: &ProjectId, id: &DiffId) -> PathBuf {
        self.partition_dir(project).join(format!("{id}.json"))
    }

    fn index_path(&self, id: &DiffId) -> PathBuf {
        self.root.join("diffs").join(INDEX_DIR).join(id.to_string())
    }

    fn audit_path(&self, id: &DiffId) -> PathBuf {
        self.root.join("audit").join(format!("{id}.jsonl"))
    }

    /// Find the file holding a diff: index first, then a scan of every
    /// partition. A scan hit repairs the index.
    fn locate_diff(&self, id: &DiffId) -> StoreResult<Option<PathBuf>> {
        if let Some(bytes) = read_optional(&self.index_path(id))? {
            let indexed = String::from_utf8_lossy(&bytes).trim().to_string();
            if let Ok(project) = ProjectId::new(indexed) {
                let path = self.diff_path(&project, id);
                if path.exists() {
                    return Ok(Some(path));
                }
            }
        }

        let file_name = format!("{id}.json");
        for entry in fs::read_dir(self.root.join("diffs"))? {
            let entry = entry?;
            let name = entry.file_name();
            if name == INDEX_DIR || !entry.file_type()?.is_dir() {
                continue;
            }
            let candidate = entry.path().join(&file_name);
            if candidate.exists() {
                debug!(diff = %id, partition = ?name, "diff index miss; resolved by partition scan");
                write_atomic(&self.index_path(id), name.to_string_lossy().as_bytes())?;
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn load_diff(path: &Path) -> StoreResult<Diff> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl MapStore for FsStore {
    fn read_map(&self, project: &ProjectId) -> StoreResult<VersionedMap> {
        match read_optional(&self.map_path(project))? {
            Some(bytes) => Ok(VersionedMap {
                map: serde_json::from_slice(&bytes)?,
                token: content_token(&bytes),
            }),
            None => Ok(VersionedMap {
                map: Map::empty(project.clone()),
                token: ConcurrencyToken::absent(),
            }),
        }
    }

    fn write_map_if_unchanged(
        &self,
        project: &ProjectId,
        map: &Map,
        expected: &ConcurrencyToken,
    ) -> StoreResult<ConcurrencyToken> {
        let _guard = self.lock()?;
        let path = self.map_path(project);
        let current = read_optional(&path)?
            .map(|bytes| content_token(&bytes))
            .unwrap_or_else(ConcurrencyToken::absent);
        if &current != expected {
            debug!(project = %project, "map CAS rejected");
            return Err(StoreError::Conflict {
                project: project.clone(),
            });
        }

        let bytes = serde_json::to_vec_pretty(map)?;
        write_atomic(&path, &bytes)?;
        Ok(content_token(&bytes))
    }
}

impl DiffStore for FsStore {
    fn read_diff(&self, id: &DiffId) -> StoreResult<Option<Diff>> {
        match self.locate_diff(id)? {
            Some(path) => Self::load_diff(&path).map(Some),
            None => Ok(None),
        }
    }

    fn create_diff(&self, diff: &Diff) -> StoreResult<DiffId> {
        let _guard = self.lock()?;
        if self.locate_diff(&diff.diff_id)?.is_some() {
            return Err(StoreError::AlreadyExists(diff.diff_id));
        }
        let bytes = serde_json::to_vec_pretty(diff)?;
        write_atomic(&self.diff_path(&diff.project_id, &diff.diff_id), &bytes)?;
        write_atomic(
            &self.index_path(&diff.diff_id),
            diff.project_id.as_str().as_bytes(),
        )?;
        Ok(diff.diff_id)
    }

    fn write_diff_status(
        &self,
        id: &DiffId,
        expected: DiffStatus,
        status: DiffStatus,
    ) -> StoreResult<()> {
        let _guard = self.lock()?;
        let path = self
            .locate_diff(id)?
            .ok_or_else(|| StoreError::NotFound(format!("diff {id}")))?;
        let mut diff = Self::load_diff(&path)?;
        if diff.status != expected {
            return Err(StoreError::StatusConflict {
                diff: *id,
                expected,
                found: diff.status,
            });
        }
        diff.status = status;
        write_atomic(&path, &serde_json::to_vec_pretty(&diff)?)
    }

    fn list_diffs(
        &self,
        project: &ProjectId,
        status: Option<DiffStatus>,
    ) -> StoreResult<Vec<Diff>> {
        let dir = self.partition_dir(project);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut diffs = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let diff = Self::load_diff(&path)?;
            if status.map_or(true, |s| diff.status == s) {
                diffs.push(diff);
            }
        }
        diffs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.diff_id.cmp(&b.diff_id))
        });
        Ok(diffs)
    }
}

impl AuditLog for FsStore {
    fn append_audit(&self, entries: &[AuditEntry]) -> StoreResult<()> {
        let _guard = self.lock()?;
        let mut start = 0;
        while start < entries.len() {
            let diff_id = entries[start].diff_id;
            let end = entries[start..]
                .iter()
                .position(|e| e.diff_id != diff_id)
                .map_or(entries.len(), |offset| start + offset);

            let mut buf = Vec::new();
            for entry in &entries[start..end] {
                serde_json::to_writer(&mut buf, entry)?;
                buf.push(b'\n');
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.audit_path(&diff_id))?;
            file.write_all(&buf)?;
            file.sync_all()?;
            start = end;
        }
        Ok(())
    }

    fn audit_for_diff(&self, id: &DiffId) -> StoreResult<Vec<AuditEntry>> {
        let file = match File::open(self.audit_path(id)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let lines: Vec<String> = BufReader::new(file).lines().collect::<io::Result<_>>()?;
        let last = lines.len().saturating_sub(1);
        let mut entries = Vec::with_capacity(lines.len());
        for (n, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                // A torn final line is what a crash mid-append leaves behind.
                Err(e) if n == last => {
                    warn!(diff = %id, line = n + 1, error = %e, "truncated audit entry; ignoring");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(entries)
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

    fn audit_entry(diff_id: DiffId, page: &str) -> AuditEntry {
        AuditEntry {
            diff_id,
            item_key: ItemKey::Page(NodeId::new(page).unwrap()),
            decision: Decision::Approved,
            reason: None,
            outcome: AuditOutcome::Inserted,
            previous_map_version: 0,
            resulting_map_version: 1,
            timestamp: Utc::now(),
            actor: "tester".into(),
        }
    }

    #[test]
    fn map_round_trips_and_token_tracks_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let p = project("shop");

        let first = store.read_map(&p).unwrap();
        assert!(first.token.is_absent());
        assert_eq!(first.map.version, 0);

        let mut map = first.map.clone();
        map.version = 1;
        map.insert_page(PageNode::new(NodeId::new("P1").unwrap()));
        let token = store.write_map_if_unchanged(&p, &map, &first.token).unwrap();

        let read = store.read_map(&p).unwrap();
        assert_eq!(read.map, map);
        assert_eq!(read.token, token);
        assert!(dir.path().join("maps/shop.json").exists());
    }

    #[test]
    fn stale_token_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let p = project("shop");
        let base = store.read_map(&p).unwrap();

        let mut winner = base.map.clone();
        winner.version = 1;
        store.write_map_if_unchanged(&p, &winner, &base.token).unwrap();

        let err = store
            .write_map_if_unchanged(&p, &base.map, &base.token)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.read_map(&p).unwrap().map.version, 1);
    }

    #[test]
    fn diff_lifecycle_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let diff = page_diff("shop", "P1");
        store.create_diff(&diff).unwrap();

        assert!(matches!(
            store.create_diff(&diff),
            Err(StoreError::AlreadyExists(_))
        ));
        assert_eq!(store.read_diff(&diff.diff_id).unwrap(), Some(diff.clone()));

        store
            .write_diff_status(&diff.diff_id, DiffStatus::Pending, DiffStatus::PartiallyApplied)
            .unwrap();
        let err = store
            .write_diff_status(&diff.diff_id, DiffStatus::Pending, DiffStatus::Applied)
            .unwrap_err();
        assert!(matches!(err, StoreError::StatusConflict { .. }));
        assert!(store.pending_diffs(&project("shop")).unwrap().is_empty());
    }

    #[test]
    fn missing_index_falls_back_to_partition_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let diff = page_diff("shop", "P1");
        store.create_diff(&diff).unwrap();

        let index = dir.path().join("diffs/.index").join(diff.diff_id.to_string());
        fs::remove_file(&index).unwrap();

        let read = store.read_diff(&diff.diff_id).unwrap();
        assert_eq!(read.map(|d| d.diff_id), Some(diff.diff_id));
        assert!(index.exists(), "scan should repair the index");
    }

    #[test]
    fn stale_index_falls_back_to_partition_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let diff = page_diff("shop", "P1");
        store.create_diff(&diff).unwrap();

        let index = dir.path().join("diffs/.index").join(diff.diff_id.to_string());
        fs::write(&index, "blog").unwrap();

        assert!(store.read_diff(&diff.diff_id).unwrap().is_some());
        assert_eq!(fs::read_to_string(&index).unwrap(), "shop");
    }

    #[test]
    fn unknown_diff_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        store.create_diff(&page_diff("shop", "P1")).unwrap();
        assert!(store.read_diff(&DiffId::new()).unwrap().is_none());
        assert!(store.list_diffs(&project("blog"), None).unwrap().is_empty());
    }

    #[test]
    fn audit_appends_and_tolerates_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let a = DiffId::new();
        let b = DiffId::new();
        store
            .append_audit(&[audit_entry(a, "P1"), audit_entry(a, "P2"), audit_entry(b, "P1")])
            .unwrap();
        store.append_audit(&[audit_entry(a, "P3")]).unwrap();

        let path = dir.path().join("audit").join(format!("{a}.jsonl"));
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"diff_id\":").unwrap();

        let entries = store.audit_for_diff(&a).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].item_key.to_string(), "page:P3");
        assert_eq!(store.audit_for_diff(&b).unwrap().len(), 1);
    }
}
