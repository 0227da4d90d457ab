//! The wire-visible error taxonomy of the core.

use riverfs_block::BlockError;
use riverfs_clock::ClockError;
use riverfs_meta::MetaError;
use thiserror::Error;

/// Result type alias for driver operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Every failure a driver operation can report.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The named repo does not exist.
    #[error("repo {0} not found")]
    RepoNotFound(String),

    /// A repo with this name already exists.
    #[error("repo {0} already exists")]
    RepoExists(String),

    /// Repo names are restricted to alphanumerics and underscores.
    #[error("repo name ({0}) invalid: only alphanumeric and underscore characters allowed")]
    InvalidRepoName(String),

    /// The commit ref did not resolve to a commit in the repo.
    #[error("commit {commit} not found in repo {repo}")]
    CommitNotFound {
        /// Repo the ref was resolved against.
        repo: String,
        /// The ref as given by the caller.
        commit: String,
    },

    /// The commit is already finished and can no longer be written.
    #[error("commit {commit} in repo {repo} has already been finished")]
    CommitAlreadyFinished {
        /// Repo the commit belongs to.
        repo: String,
        /// The ref as given by the caller.
        commit: String,
    },

    /// The branch already exists.
    #[error("branch {0} already exists")]
    BranchExists(String),

    /// No file at this path in the resolved commit.
    #[error("file {path} not found in commit {repo}/{commit}")]
    FileNotFound {
        /// Repo the lookup ran against.
        repo: String,
        /// The commit ref as given by the caller.
        commit: String,
        /// Normalized path.
        path: String,
    },

    /// A write would give a path a different type than it already has.
    #[error("file type conflict at {0}")]
    FileTypeConflict(String),

    /// The path resolves to a directory where a file was required.
    #[error("file {0} is a directory")]
    NotAFile(String),

    /// The block store handed back more bytes than the read asked for.
    #[error("block store returned more bytes than requested")]
    ReadOverrun,

    /// Reserved operation with no implementation.
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// Clock algebra failure.
    #[error(transparent)]
    Clock(#[from] ClockError),

    /// Metadata adapter failure.
    #[error(transparent)]
    Meta(#[from] MetaError),

    /// Block store failure.
    #[error(transparent)]
    Block(#[from] BlockError),
}
