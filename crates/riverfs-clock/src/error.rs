//! Error type for clock operations.

use thiserror::Error;

/// Errors produced by the clock algebra.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    /// No branch clock in the set ends in the named branch.
    #[error("branch {0} not found in branch clocks")]
    BranchNotFound(String),

    /// A branch clock already ends in the named branch.
    #[error("branch {0} already exists")]
    BranchExists(String),

    /// The string is not a `branch/n` alias.
    #[error("invalid commit alias {0}")]
    InvalidAlias(String),

    /// The `from` clock is not an ancestor of the `to` clock.
    #[error("clock {from} is not an ancestor of {to}")]
    NotAncestor {
        /// The clock the walk was supposed to start after.
        from: String,
        /// The clock the walk was supposed to end at.
        to: String,
    },
}
