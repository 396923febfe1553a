use serde::{Deserialize, Serialize};

/// What to do with decisions for item keys the diff does not contain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownKeyPolicy {
    /// Log and drop them. Tolerates clients holding a stale copy of the diff.
    #[default]
    Ignore,
    /// Fail the merge with `InvalidArgument`.
    Strict,
}

/// What to do when an approved route needs a page the reviewer rejected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionPolicy {
    /// Approve the page anyway and record a `rejection_overridden` reason.
    #[default]
    Override,
    /// Keep the page rejected and hold the route back as `endpoint_rejected`.
    DemoteRoute,
}

/// Configuration for the merge engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Maximum number of read-resolve-write attempts before giving up with
    /// `Conflict`. Values below 1 are treated as 1.
    pub max_attempts: u32,
    pub unknown_keys: UnknownKeyPolicy,
    pub rejection_policy: RejectionPolicy,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            unknown_keys: UnknownKeyPolicy::Ignore,
            rejection_policy: RejectionPolicy::Override,
        }
    }
}

impl MergeConfig {
    /// Reject unknown keys instead of ignoring them.
    pub fn strict() -> Self {
        Self {
            unknown_keys: UnknownKeyPolicy::Strict,
            ..Default::default()
        }
    }

    /// The retry budget, never less than one attempt.
    pub fn attempt_budget(&self) -> u32 {
        self.max_attempts.max(1)
    }
}
