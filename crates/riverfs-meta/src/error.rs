//! Error type for the metadata adapter.

use thiserror::Error;

/// Errors produced by table operations.
#[derive(Debug, Error)]
pub enum MetaError {
    /// The record does not exist.
    #[error("{key} not found in table {table}")]
    NotFound {
        /// Table the lookup ran against.
        table: &'static str,
        /// Primary key that was looked up.
        key: String,
    },

    /// An insert with `OnConflict::Fail` hit an existing record.
    #[error("conflict inserting {key} into table {table}")]
    Conflict {
        /// Table the insert ran against.
        table: &'static str,
        /// Primary key that conflicted.
        key: String,
    },

    /// A caller-supplied merge function rejected the upsert.
    #[error("merge rejected: {0}")]
    MergeRejected(String),
}
