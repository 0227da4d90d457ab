//! Request and response types of the driver surface.

use riverfs_meta::{FileType, Timestamp};
use serde::{Deserialize, Serialize};

/// Whether a commit is still open for writes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitType {
    /// Finished; contents are immutable and readable.
    Read,
    /// Still open; contents may grow.
    Write,
}

/// A `(repo, commit ref)` pair. The ref may be a raw id, a branch name,
/// or a `branch/n` alias.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    /// Repo the ref is resolved against.
    pub repo: String,
    /// The ref itself.
    pub id: String,
}

/// A `(repo, commit, path)` triple naming one file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Repo name.
    pub repo: String,
    /// Commit ref; any form accepted by resolution.
    pub commit: String,
    /// File path; normalized by the driver.
    pub path: String,
}

impl FileRef {
    /// Convenience constructor.
    pub fn new(
        repo: impl Into<String>,
        commit: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            repo: repo.into(),
            commit: commit.into(),
            path: path.into(),
        }
    }
}

/// What `inspect_repo` and `list_repo` report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    /// Repo name.
    pub name: String,
    /// Creation time.
    pub created: Timestamp,
    /// Total bytes across finished commits.
    pub size_bytes: u64,
}

/// What commit operations report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// The commit id. `inspect_commit` echoes the caller's ref here;
    /// everywhere else this is the canonical id.
    pub commit_id: String,
    /// Owning repo.
    pub repo: String,
    /// Branch the commit lives on.
    pub branch: String,
    /// When the commit was started.
    pub started: Timestamp,
    /// When the commit was finished, if it has been.
    pub finished: Option<Timestamp>,
    /// Whether the commit (or an ancestor) was cancelled.
    pub cancelled: bool,
    /// Read for finished commits, Write for open ones.
    pub commit_type: CommitType,
    /// Sum of the commit's diff sizes.
    pub size_bytes: u64,
}

/// What file operations report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// The file's repo, queried commit, and path.
    pub file: FileRef,
    /// File or Dir; a path folding to nothing reports `FileNotFound`
    /// instead of an info.
    pub file_type: FileType,
    /// Folded size in bytes.
    pub size_bytes: u64,
    /// When the newest contributing diff was written.
    pub modified: Timestamp,
    /// The commit that wrote the newest contributing diff.
    pub commit_modified: String,
    /// Children, populated when inspecting a directory.
    pub children: Vec<FileRef>,
}

/// Parameters for `list_commit`.
#[derive(Clone, Debug, Default)]
pub struct ListCommitRequest {
    /// Repos to list. A repo also mentioned in `from` starts after that
    /// commit instead of listing from the beginning.
    pub repos: Vec<String>,
    /// Restrict to finished (Read) or open (Write) commits.
    pub commit_type: Option<CommitType>,
    /// Per-repo starting points, exclusive.
    pub from: Vec<CommitRef>,
    /// Only commits whose provenance contains all of these.
    pub provenance: Vec<CommitRef>,
    /// Include cancelled commits.
    pub include_cancelled: bool,
    /// If the result is empty, wait for the first matching commit.
    pub block: bool,
}
