//! Persistent record types for the four metadata tables.

use riverfs_block::BlockRef;
use riverfs_clock::{BranchClock, Clock};
use serde::{Deserialize, Serialize};

use crate::index::{self, IndexKey};
use crate::path;
use crate::types::{FileType, Timestamp};

/// A record that lives in one table under a string primary key and may
/// appear in secondary indexes.
pub trait Record: Clone + Send + Sync + 'static {
    /// Table name.
    const TABLE: &'static str;

    /// Primary key of this record.
    fn key(&self) -> String;

    /// Secondary-index entries this record appears under.
    fn index_entries(&self) -> Vec<(&'static str, IndexKey)> {
        Vec::new()
    }
}

/// A repository: the unit of naming and size accounting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRecord {
    /// Unique repo name, `[A-Za-z0-9_]+`.
    pub name: String,
    /// Creation time.
    pub created: Timestamp,
    /// Total bytes committed, incremented as commits finish.
    pub size_bytes: u64,
}

impl Record for RepoRecord {
    const TABLE: &'static str = "Repos";

    fn key(&self) -> String {
        self.name.clone()
    }
}

/// A commit: one snapshot of one repo, addressed by id and `branch/n`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Opaque process-unique id.
    pub id: String,
    /// Owning repo name.
    pub repo: String,
    /// When the commit was started.
    pub started: Timestamp,
    /// When the commit was finished; `None` while still open.
    pub finished: Option<Timestamp>,
    /// Whether this commit (or an ancestor) was cancelled.
    pub cancelled: bool,
    /// One branch clock per branch this commit appears on. Never empty.
    pub branch_clocks: Vec<BranchClock>,
    /// Upstream commit ids that caused this commit, opaque to the core.
    pub provenance: Vec<String>,
    /// Sum of this commit's diff sizes, computed at finish.
    pub size: u64,
}

impl Record for CommitRecord {
    const TABLE: &'static str = "Commits";

    fn key(&self) -> String {
        self.id.clone()
    }

    fn index_entries(&self) -> Vec<(&'static str, IndexKey)> {
        self.branch_clocks
            .iter()
            .filter_map(|bc| bc.head())
            .map(|clock| {
                (
                    index::COMMIT_BRANCH,
                    index::commit_branch_key(&self.repo, &clock.branch, clock.n),
                )
            })
            .collect()
    }
}

/// A reserved `(repo, branch, n)` slot: both the head-of-branch pointer
/// and the mutex that serializes commit creation on the branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockRecord {
    /// Primary key, `repo/branch/n`.
    pub id: String,
    /// Owning repo name.
    pub repo: String,
    /// Branch this slot belongs to.
    pub branch: String,
    /// Position on the branch.
    pub n: u64,
    /// The commit the slot resolves to.
    pub commit_id: String,
}

impl ClockRecord {
    /// Builds the record for a clock being reserved for a commit.
    pub fn new(repo: &str, clock: &Clock, commit_id: &str) -> Self {
        Self {
            id: format!("{}/{}/{}", repo, clock.branch, clock.n),
            repo: repo.to_string(),
            branch: clock.branch.clone(),
            n: clock.n,
            commit_id: commit_id.to_string(),
        }
    }
}

impl Record for ClockRecord {
    const TABLE: &'static str = "Clocks";

    fn key(&self) -> String {
        self.id.clone()
    }

    fn index_entries(&self) -> Vec<(&'static str, IndexKey)> {
        vec![(
            index::CLOCK_BRANCH,
            index::clock_branch_key(&self.repo, &self.branch),
        )]
    }
}

/// One path's change in one commit: an add, an extend, or a delete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    /// Primary key, `commit_id:path`.
    pub id: String,
    /// Owning repo name.
    pub repo: String,
    /// The commit this diff belongs to.
    pub commit_id: String,
    /// Absolute normalized path.
    pub path: String,
    /// The commit's branch clocks, copied here for index keys.
    pub branch_clocks: Vec<BranchClock>,
    /// What lives at the path after this diff.
    pub file_type: FileType,
    /// Ordered block refs added by this diff; empty for dirs and deletes.
    pub block_refs: Vec<BlockRef>,
    /// Bytes added by this diff.
    pub size: u64,
    /// True if this diff removes the path.
    pub delete: bool,
    /// Last modification time.
    pub modified: Timestamp,
}

impl DiffRecord {
    /// Primary key for the diff of `path` in `commit_id`.
    pub fn id_for(commit_id: &str, path: &str) -> String {
        format!("{commit_id}:{path}")
    }

    /// The branch clock diff indexes are keyed on.
    pub fn clock(&self) -> Option<&BranchClock> {
        self.branch_clocks.first()
    }
}

impl Record for DiffRecord {
    const TABLE: &'static str = "Diffs";

    fn key(&self) -> String {
        self.id.clone()
    }

    fn index_entries(&self) -> Vec<(&'static str, IndexKey)> {
        let mut entries = vec![(index::DIFF_COMMIT, index::diff_commit_key(&self.commit_id))];
        let Some(clock) = self.clock() else {
            return entries;
        };
        entries.push((
            index::DIFF_PATH,
            index::diff_path_key(&self.repo, &self.path, clock),
        ));
        if let Some(parent) = path::parent_dir(&self.path) {
            entries.push((
                index::DIFF_PARENT,
                index::diff_parent_key(&self.repo, &parent, clock),
            ));
        }
        for prefix in path::prefixes(&self.path) {
            entries.push((
                index::DIFF_PREFIX,
                index::diff_prefix_key(&self.repo, &prefix, clock),
            ));
        }
        entries
    }
}
