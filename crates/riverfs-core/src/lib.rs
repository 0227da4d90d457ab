#![warn(missing_docs)]

//! riverfs core: a content-addressed, branchable repository engine.
//!
//! Commits form a DAG addressed by `branch/n` aliases via branch clocks;
//! file state is stored as per-commit diffs and resolved on read by
//! folding every diff on the ancestor interval of the queried commit.
//! The [`Driver`] ties the metadata store and the block store client
//! together and exposes the repo, commit, file, and subscription
//! operations.

pub mod commit;
pub mod driver;
pub mod error;
pub mod file;
pub mod reader;
pub mod repo;
pub mod subscribe;
pub mod types;

pub use driver::Driver;
pub use error::{CoreError, CoreResult};
pub use reader::FileReader;
pub use subscribe::CommitStream;
pub use types::{
    CommitInfo, CommitRef, CommitType, FileInfo, FileRef, ListCommitRequest, RepoInfo,
};

pub use riverfs_block::{Delimiter, Shard};
