#![warn(missing_docs)]

//! riverfs metadata adapter: typed tables over an indexed store.
//!
//! Four tables back the repository engine: `Repos`, `Commits`, `Diffs`,
//! and `Clocks`. Each table supports atomic inserts with conflict
//! handling, read-modify-write updates, secondary-index range scans, and a
//! change feed with snapshot-then-tail semantics and monotone resume
//! positions. [`db::MetaDb`] groups the tables and provides multi-table
//! transactions.

pub mod db;
pub mod error;
pub mod index;
pub mod path;
pub mod record;
pub mod table;
pub mod types;

pub use db::{MetaDb, MetaDbConfig, TxnOp};
pub use error::MetaError;
pub use index::{IndexKey, IndexVal};
pub use record::{ClockRecord, CommitRecord, DiffRecord, Record, RepoRecord};
pub use table::{Feed, FeedEvent, OnConflict, Table};
pub use types::{FileType, Timestamp};
