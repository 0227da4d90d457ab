//! The four metadata tables plus multi-table transactions.

use crate::error::MetaError;
use crate::record::{ClockRecord, CommitRecord, DiffRecord, RepoRecord};
use crate::table::Table;

/// Configuration for [`MetaDb`].
#[derive(Clone, Copy, Debug)]
pub struct MetaDbConfig {
    /// Events buffered per change-feed subscriber before it has to
    /// resynchronize from the table.
    pub feed_capacity: usize,
}

impl Default for MetaDbConfig {
    fn default() -> Self {
        Self {
            feed_capacity: 1024,
        }
    }
}

/// One operation inside a multi-table transaction. Puts replace.
pub enum TxnOp {
    /// Insert or replace a repo.
    PutRepo(RepoRecord),
    /// Delete a repo by name.
    DeleteRepo(String),
    /// Insert or replace a commit.
    PutCommit(CommitRecord),
    /// Delete a commit by id.
    DeleteCommit(String),
    /// Insert or replace a diff.
    PutDiff(DiffRecord),
    /// Delete a diff by id.
    DeleteDiff(String),
    /// Insert or replace a clock.
    PutClock(ClockRecord),
    /// Delete a clock by id.
    DeleteClock(String),
}

/// The metadata store: `Repos`, `Commits`, `Diffs`, and `Clocks`.
pub struct MetaDb {
    /// Repo records keyed by name.
    pub repos: Table<RepoRecord>,
    /// Commit records keyed by id.
    pub commits: Table<CommitRecord>,
    /// Diff records keyed by `commit_id:path`.
    pub diffs: Table<DiffRecord>,
    /// Clock records keyed by `repo/branch/n`.
    pub clocks: Table<ClockRecord>,
}

impl MetaDb {
    /// Creates an empty store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(MetaDbConfig::default())
    }

    /// Creates an empty store with the given configuration.
    pub fn with_config(config: MetaDbConfig) -> Self {
        Self {
            repos: Table::new(config.feed_capacity),
            commits: Table::new(config.feed_capacity),
            diffs: Table::new(config.feed_capacity),
            clocks: Table::new(config.feed_capacity),
        }
    }

    /// Applies every op atomically: all four table locks are taken (in a
    /// fixed order, so concurrent transactions cannot deadlock) and held
    /// until the last op lands. Feed events publish before the locks drop.
    pub fn transaction(&self, ops: Vec<TxnOp>) -> Result<(), MetaError> {
        let mut diffs = self.diffs.shared.state.write().expect("lock poisoned");
        let mut clocks = self.clocks.shared.state.write().expect("lock poisoned");
        let mut commits = self.commits.shared.state.write().expect("lock poisoned");
        let mut repos = self.repos.shared.state.write().expect("lock poisoned");

        for op in ops {
            match op {
                TxnOp::PutRepo(record) => {
                    let event = repos.upsert(record);
                    self.repos.shared.publish(event);
                }
                TxnOp::DeleteRepo(name) => {
                    repos.remove(&name);
                }
                TxnOp::PutCommit(record) => {
                    let event = commits.upsert(record);
                    self.commits.shared.publish(event);
                }
                TxnOp::DeleteCommit(id) => {
                    commits.remove(&id);
                }
                TxnOp::PutDiff(record) => {
                    let event = diffs.upsert(record);
                    self.diffs.shared.publish(event);
                }
                TxnOp::DeleteDiff(id) => {
                    diffs.remove(&id);
                }
                TxnOp::PutClock(record) => {
                    let event = clocks.upsert(record);
                    self.clocks.shared.publish(event);
                }
                TxnOp::DeleteClock(id) => {
                    clocks.remove(&id);
                }
            }
        }
        Ok(())
    }
}

impl Default for MetaDb {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::OnConflict;
    use crate::types::Timestamp;

    #[test]
    fn test_transaction_applies_across_tables() {
        let db = MetaDb::new();
        db.repos
            .insert(
                RepoRecord {
                    name: "r".to_string(),
                    created: Timestamp::now(),
                    size_bytes: 0,
                },
                OnConflict::Fail,
            )
            .unwrap();
        db.clocks
            .insert(
                ClockRecord {
                    id: "r/master/0".to_string(),
                    repo: "r".to_string(),
                    branch: "master".to_string(),
                    n: 0,
                    commit_id: "c1".to_string(),
                },
                OnConflict::Fail,
            )
            .unwrap();

        db.transaction(vec![
            TxnOp::DeleteClock("r/master/0".to_string()),
            TxnOp::DeleteRepo("r".to_string()),
        ])
        .unwrap();

        assert!(db.repos.get("r").is_none());
        assert!(db.clocks.get("r/master/0").is_none());
    }

    #[test]
    fn test_transaction_delete_is_idempotent() {
        let db = MetaDb::new();
        db.transaction(vec![TxnOp::DeleteRepo("ghost".to_string())])
            .unwrap();
    }
}
