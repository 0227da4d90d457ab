//! Ancestry walks decomposed into per-branch linear runs.
//!
//! The ancestors of a commit at `[(master,3),(dev,2)]` are `master/0..3`
//! followed by `dev/0..2`. [`clock_intervals`] computes those runs for the
//! walk from an optional `from` clock (exclusive) to a target clock
//! (inclusive); [`interval_to_clocks`] flattens them into the individual
//! branch clocks that diff index keys are joined against.

use serde::{Deserialize, Serialize};

use crate::clock::{BranchClock, Clock};
use crate::error::ClockError;

/// A linear run of commits on a single branch, bounds inclusive.
///
/// `lower` and `upper` share every clock except the last `n`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockInterval {
    /// First branch clock of the run.
    pub lower: BranchClock,
    /// Last branch clock of the run.
    pub upper: BranchClock,
}

impl ClockInterval {
    /// Number of clocks in the run.
    pub fn len(&self) -> u64 {
        match (self.lower.head(), self.upper.head()) {
            (Some(lo), Some(hi)) => hi.n.saturating_sub(lo.n) + 1,
            _ => 0,
        }
    }

    /// True if the run contains no clocks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decomposes the ancestry walk from `from` (exclusive; root if `None`) to
/// `to` (inclusive) into per-branch runs, oldest branch first.
///
/// `from` must be an ancestor of `to`: its non-tail clocks must equal the
/// corresponding clocks of `to` (they are frozen branch points), and its
/// tail must sit on `to`'s lineage at or before the matching level.
pub fn clock_intervals(
    from: Option<&BranchClock>,
    to: &BranchClock,
) -> Result<Vec<ClockInterval>, ClockError> {
    let from_clocks: &[Clock] = from.map(|bc| bc.clocks.as_slice()).unwrap_or(&[]);
    let depth = from_clocks.len();
    if depth > to.clocks.len() {
        return Err(not_ancestor(from, to));
    }

    let mut intervals = Vec::new();
    for (i, tc) in to.clocks.iter().enumerate() {
        if i + 1 < depth {
            // Frozen branch point covered by `from`; must match exactly.
            if from_clocks[i] != *tc {
                return Err(not_ancestor(from, to));
            }
            continue;
        }
        let start = if i + 1 == depth {
            let fc = &from_clocks[i];
            if fc.branch != tc.branch || fc.n > tc.n {
                return Err(not_ancestor(from, to));
            }
            fc.n + 1
        } else {
            0
        };
        if start > tc.n {
            continue;
        }
        let prefix = &to.clocks[..i];
        let mut lower = prefix.to_vec();
        lower.push(Clock::new(tc.branch.clone(), start));
        let mut upper = prefix.to_vec();
        upper.push(tc.clone());
        intervals.push(ClockInterval {
            lower: BranchClock { clocks: lower },
            upper: BranchClock { clocks: upper },
        });
    }
    Ok(intervals)
}

/// Flattens intervals into the ordered sequence of individual branch clocks.
///
/// Ascending (oldest first) by default; `reverse` walks newest first.
pub fn interval_to_clocks(intervals: &[ClockInterval], reverse: bool) -> Vec<BranchClock> {
    let mut clocks = Vec::new();
    for interval in intervals {
        let (Some(lo), Some(hi)) = (interval.lower.head(), interval.upper.head()) else {
            continue;
        };
        for n in lo.n..=hi.n {
            let mut bc = interval.lower.clone();
            if let Some(last) = bc.clocks.last_mut() {
                last.n = n;
            }
            clocks.push(bc);
        }
    }
    if reverse {
        clocks.reverse();
    }
    clocks
}

fn not_ancestor(from: Option<&BranchClock>, to: &BranchClock) -> ClockError {
    ClockError::NotAncestor {
        from: from.map(|bc| bc.index_token()).unwrap_or_default(),
        to: to.index_token(),
    }
}
