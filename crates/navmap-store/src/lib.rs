//! Storage for navmap maps, diffs and audit entries.
//!
//! The merge engine only talks to storage through three traits:
//!
//! - [`MapStore`] -- one map document per project, written with an
//!   optimistic-concurrency token ([`ConcurrencyToken`])
//! - [`DiffStore`] -- diff documents keyed by diff id, partitioned by project
//! - [`AuditLog`] -- append-only decision log
//!
//! # Storage Backends
//!
//! - [`InMemoryStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsStore`] -- JSON documents in a directory, atomic replace on write
//!
//! # Design Rules
//!
//! 1. A map is only ever replaced by a conditional write; a stale token is a
//!    [`StoreError::Conflict`], never a silent overwrite.
//! 2. Reading the map of an unknown project yields the empty map, not an error.
//! 3. Diffs are created once and afterwards only change status, guarded on
//!    the status the caller observed.
//! 4. A point read that misses its index falls back to a scan by logical id.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod memory;
pub mod token;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsStore;
pub use memory::InMemoryStore;
pub use token::{ConcurrencyToken, VersionedMap};
pub use traits::{AuditLog, DiffStore, MapStore};
