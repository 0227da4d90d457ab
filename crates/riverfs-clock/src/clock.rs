//! Clock and branch-clock types plus the operations that move them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ClockError;

/// One step on one branch: the branch name and a monotone counter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Clock {
    /// The branch this step belongs to.
    pub branch: String,
    /// Position on the branch, starting at 0.
    pub n: u64,
}

impl Clock {
    /// Creates a clock for the given branch and position.
    pub fn new(branch: impl Into<String>, n: u64) -> Self {
        Self {
            branch: branch.into(),
            n,
        }
    }

    /// Parses a `branch/n` alias such as `master/3`.
    ///
    /// Branch names cannot contain `/`, so the alias form is unambiguous.
    /// Callers use a parse failure to fall back to other ref forms.
    pub fn parse_alias(alias: &str) -> Result<Clock, ClockError> {
        let mut parts = alias.split('/');
        let (branch, n) = match (parts.next(), parts.next(), parts.next()) {
            (Some(branch), Some(n), None) if !branch.is_empty() => (branch, n),
            _ => return Err(ClockError::InvalidAlias(alias.to_string())),
        };
        let n = n
            .parse::<u64>()
            .map_err(|_| ClockError::InvalidAlias(alias.to_string()))?;
        Ok(Clock::new(branch, n))
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.branch, self.n)
    }
}

/// An ordered sequence of clocks describing a commit's position in the DAG.
///
/// All branches in the sequence are distinct. The last clock is the commit's
/// canonical `branch/n` address; earlier clocks record where each enclosing
/// branch was forked from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchClock {
    /// The clock steps, outermost branch first. Never empty.
    pub clocks: Vec<Clock>,
}

impl BranchClock {
    /// Creates the first clock of a fresh branch: `[(branch, 0)]`.
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            clocks: vec![Clock::new(branch, 0)],
        }
    }

    /// The last clock, which names the branch the commit lives on.
    pub fn head(&self) -> Option<&Clock> {
        self.clocks.last()
    }

    /// The name of the branch the commit lives on.
    pub fn branch(&self) -> Option<&str> {
        self.head().map(|c| c.branch.as_str())
    }

    /// The next commit on the same branch: last `n` incremented by one.
    pub fn child(&self) -> BranchClock {
        let mut clocks = self.clocks.clone();
        if let Some(last) = clocks.last_mut() {
            last.n += 1;
        }
        BranchClock { clocks }
    }

    /// A fork of this position onto a new branch: `(new_branch, 0)` appended.
    pub fn branch_off(&self, new_branch: impl Into<String>) -> BranchClock {
        let mut clocks = self.clocks.clone();
        clocks.push(Clock::new(new_branch, 0));
        BranchClock { clocks }
    }

    /// Deterministic token used as a secondary-index component for diffs.
    ///
    /// Equal branch clocks always render the same token, byte for byte,
    /// so keys computed from clocks match across processes.
    pub fn index_token(&self) -> String {
        let parts: Vec<String> = self.clocks.iter().map(|c| c.to_string()).collect();
        parts.join(";")
    }
}

impl fmt::Display for BranchClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index_token())
    }
}

/// The branch clocks of a commit starting a fresh branch.
pub fn new_branch_clocks(branch: &str) -> Vec<BranchClock> {
    vec![BranchClock::new(branch)]
}

/// The branch clocks of a commit extending `branch` from a parent's clocks.
pub fn child_of_branch_clocks(
    bcs: &[BranchClock],
    branch: &str,
) -> Result<Vec<BranchClock>, ClockError> {
    let bc = find_branch_clock(bcs, branch)?;
    Ok(vec![bc.child()])
}

/// The branch clocks of a commit forking `new_branch` off `parent_branch`.
///
/// Fails with [`ClockError::BranchExists`] if any existing branch clock
/// already ends in `new_branch`.
pub fn branch_off_branch_clocks(
    bcs: &[BranchClock],
    parent_branch: &str,
    new_branch: &str,
) -> Result<Vec<BranchClock>, ClockError> {
    if bcs.iter().any(|bc| bc.branch() == Some(new_branch)) {
        return Err(ClockError::BranchExists(new_branch.to_string()));
    }
    let bc = find_branch_clock(bcs, parent_branch)?;
    Ok(vec![bc.branch_off(new_branch)])
}

/// The head clock of the branch clock ending in `branch`.
pub fn get_clock_for_branch<'a>(
    bcs: &'a [BranchClock],
    branch: &str,
) -> Result<&'a Clock, ClockError> {
    let bc = find_branch_clock(bcs, branch)?;
    bc.head()
        .ok_or_else(|| ClockError::BranchNotFound(branch.to_string()))
}

fn find_branch_clock<'a>(
    bcs: &'a [BranchClock],
    branch: &str,
) -> Result<&'a BranchClock, ClockError> {
    bcs.iter()
        .find(|bc| bc.branch() == Some(branch))
        .ok_or_else(|| ClockError::BranchNotFound(branch.to_string()))
}
