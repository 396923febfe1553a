//! Foundation types for navmap.
//!
//! navmap keeps a versioned graph of an application's pages and the routes
//! between them, one map per project. Proposed additions arrive as diffs that
//! a reviewer approves, rejects or defers item by item. Every other navmap
//! crate depends on `navmap-types`.
//!
//! # Key Types
//!
//! - [`ProjectId`], [`NodeId`], [`EdgeId`] -- validated string identities
//! - [`DiffId`] -- UUID v7 diff identifier (v8 for remainder diffs)
//! - [`ItemKey`] -- `page:<id>` / `route:<id>` identity of a diff item
//! - [`Map`] -- the versioned page/route graph
//! - [`Diff`], [`DiffItem`], [`Decision`], [`DiffStatus`] -- review batches
//! - [`ReasonCode`] -- why the dependency resolver touched an item
//! - [`AuditEntry`] -- append-only record of a merge decision

pub mod audit;
pub mod diff;
pub mod error;
pub mod ids;
pub mod map;

pub use audit::{AuditEntry, AuditOutcome};
pub use diff::{Decision, Diff, DiffItem, DiffPayload, DiffStatus, ReasonCode};
pub use error::TypeError;
pub use ids::{DiffId, EdgeId, ItemKey, NodeId, ProjectId};
pub use map::{Attributes, DanglingRoute, Map, PageNode, RouteEdge};
