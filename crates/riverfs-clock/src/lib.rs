#![warn(missing_docs)]

//! riverfs branch-clock algebra: the naming and ordering scheme for commits.
//!
//! A commit's position in the multi-branch DAG is a [`BranchClock`], an
//! ordered sequence of `(branch, n)` steps whose last entry is the commit's
//! canonical `branch/n` address. Branching appends a step; committing
//! increments the last step. Every operation here is pure and
//! deterministic, so index keys derived from clocks match across processes.

pub mod clock;
pub mod error;
pub mod interval;

pub use clock::{
    branch_off_branch_clocks, child_of_branch_clocks, get_clock_for_branch, new_branch_clocks,
    BranchClock, Clock,
};
pub use error::ClockError;
pub use interval::{clock_intervals, interval_to_clocks, ClockInterval};
