//! Secondary-index names and typed key builders.
//!
//! Index keys are tuples of typed components so numeric clock positions
//! order numerically, never lexically. `Min` and `Max` sentinels express
//! open range bounds the way the store's minval/maxval would.

use riverfs_clock::BranchClock;
use serde::{Deserialize, Serialize};

/// Head-of-branch, parent lookup, and branch enumeration over commits:
/// `(repo, branch, n)`.
pub const COMMIT_BRANCH: &str = "CommitBranch";
/// Branches of a repo, over clocks: `(repo, branch)`.
pub const CLOCK_BRANCH: &str = "ClockBranch";
/// All diffs of one commit: `(commit_id)`.
pub const DIFF_COMMIT: &str = "DiffCommit";
/// Diffs touching one path at one ancestor clock: `(repo, path, clock)`.
pub const DIFF_PATH: &str = "DiffPath";
/// Diffs directly under one directory: `(repo, parent_dir, clock)`.
pub const DIFF_PARENT: &str = "DiffParent";
/// Diffs anywhere under a prefix: `(repo, prefix, clock)`.
pub const DIFF_PREFIX: &str = "DiffPrefix";

/// A single component of a secondary-index key.
///
/// The variant order gives `Min < Str(_) < U64(_) < Max`; keys within one
/// index always use the same component type at each position, so string
/// and integer components never compare against each other in practice.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndexVal {
    /// Sorts before every concrete value.
    Min,
    /// A string component.
    Str(String),
    /// An unsigned integer component, numerically ordered.
    U64(u64),
    /// Sorts after every concrete value.
    Max,
}

/// A typed secondary-index key: an ordered tuple of components.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexKey(pub Vec<IndexVal>);

impl IndexKey {
    /// Builds a key from components.
    pub fn new(vals: Vec<IndexVal>) -> Self {
        Self(vals)
    }
}

fn s(v: &str) -> IndexVal {
    IndexVal::Str(v.to_string())
}

/// `CommitBranch` key for an exact `(repo, branch, n)`.
pub fn commit_branch_key(repo: &str, branch: &str, n: u64) -> IndexKey {
    IndexKey(vec![s(repo), s(branch), IndexVal::U64(n)])
}

/// `CommitBranch` bounds covering every `n` of a branch.
pub fn commit_branch_range(repo: &str, branch: &str) -> (IndexKey, IndexKey) {
    (
        IndexKey(vec![s(repo), s(branch), IndexVal::Min]),
        IndexKey(vec![s(repo), s(branch), IndexVal::Max]),
    )
}

/// `CommitBranch` bounds covering `n >= from` of a branch.
pub fn commit_branch_range_from(repo: &str, branch: &str, from: u64) -> (IndexKey, IndexKey) {
    (
        IndexKey(vec![s(repo), s(branch), IndexVal::U64(from)]),
        IndexKey(vec![s(repo), s(branch), IndexVal::Max]),
    )
}

/// `ClockBranch` key for an exact `(repo, branch)`.
pub fn clock_branch_key(repo: &str, branch: &str) -> IndexKey {
    IndexKey(vec![s(repo), s(branch)])
}

/// `ClockBranch` bounds covering every branch of a repo.
pub fn clock_branch_range(repo: &str) -> (IndexKey, IndexKey) {
    (
        IndexKey(vec![s(repo), IndexVal::Min]),
        IndexKey(vec![s(repo), IndexVal::Max]),
    )
}

/// `DiffCommit` key for one commit id.
pub fn diff_commit_key(commit_id: &str) -> IndexKey {
    IndexKey(vec![s(commit_id)])
}

/// `DiffPath` key for one path at one ancestor clock.
pub fn diff_path_key(repo: &str, path: &str, clock: &BranchClock) -> IndexKey {
    IndexKey(vec![s(repo), s(path), s(&clock.index_token())])
}

/// `DiffParent` key for one directory at one ancestor clock.
pub fn diff_parent_key(repo: &str, parent: &str, clock: &BranchClock) -> IndexKey {
    IndexKey(vec![s(repo), s(parent), s(&clock.index_token())])
}

/// `DiffPrefix` key for one prefix at one ancestor clock.
pub fn diff_prefix_key(repo: &str, prefix: &str, clock: &BranchClock) -> IndexKey {
    IndexKey(vec![s(repo), s(prefix), s(&clock.index_token())])
}
