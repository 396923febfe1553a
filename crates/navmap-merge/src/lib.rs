//! Diff merge engine for navmap.
//!
//! Takes a pending diff plus per-item approve/reject/defer decisions and
//! produces an updated map, an audit trail of the decisions, and a new
//! pending diff holding whatever was left undecided.
//!
//! # Merge Pipeline
//!
//! 1. Load the diff (must be pending) and overlay the request's decisions.
//! 2. Read the live map together with its concurrency token.
//! 3. [`DependencyResolver`] expands route approvals into the page approvals
//!    they depend on, demoting routes whose endpoints cannot be satisfied.
//! 4. [`MergePlan`] applies the approved subset to a working copy and bumps
//!    the version once if anything was genuinely new.
//! 5. The map is written conditionally; a conflict restarts from step 2.
//! 6. The remainder diff is created, the original diff's status moves on,
//!    and one audit entry per item is appended.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use navmap_merge::{Decisions, MergeConfig, MergeEngine, MergeRequest, NewDiff};
//! use navmap_store::InMemoryStore;
//! use navmap_types::{DiffItem, NodeId, PageNode, ProjectId};
//!
//! let engine = MergeEngine::new(Arc::new(InMemoryStore::new()), MergeConfig::default());
//! let diff = engine
//!     .submit_diff(NewDiff {
//!         project_id: ProjectId::new("shop").unwrap(),
//!         base_version: None,
//!         items: vec![DiffItem::page(PageNode::new(NodeId::new("home").unwrap()))],
//!     })
//!     .unwrap();
//!
//! let result = engine
//!     .merge_diff_partial(MergeRequest::new(diff.diff_id, Decisions::approve_all()))
//!     .unwrap();
//! assert_eq!(result.map_version, 1);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod plan;
pub mod request;
pub mod resolver;

pub use config::{MergeConfig, RejectionPolicy, UnknownKeyPolicy};
pub use engine::MergeEngine;
pub use error::{MergeError, Result};
pub use plan::MergePlan;
pub use request::{
    Decisions, MergePreview, MergeRequest, MergeResult, MergeSubmission, NewDiff, ANONYMOUS_ACTOR,
};
pub use resolver::{DependencyResolver, Resolution};
