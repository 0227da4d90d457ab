//! Repo operations: create, inspect, list, delete.

use riverfs_meta::record::RepoRecord;
use riverfs_meta::table::OnConflict;
use riverfs_meta::{MetaError, Timestamp, TxnOp};
use tracing::debug;

use crate::driver::{validate_repo_name, Driver};
use crate::error::{CoreError, CoreResult};
use crate::types::RepoInfo;

fn repo_to_info(record: &RepoRecord) -> RepoInfo {
    RepoInfo {
        name: record.name.clone(),
        created: record.created,
        size_bytes: record.size_bytes,
    }
}

impl Driver {
    /// Creates a repo. Fails with [`CoreError::RepoExists`] on conflict.
    pub async fn create_repo(&self, name: &str) -> CoreResult<()> {
        validate_repo_name(name)?;
        let record = RepoRecord {
            name: name.to_string(),
            created: Timestamp::now(),
            size_bytes: 0,
        };
        self.meta
            .repos
            .insert(record, OnConflict::Fail)
            .map_err(|err| match err {
                MetaError::Conflict { .. } => CoreError::RepoExists(name.to_string()),
                other => other.into(),
            })
    }

    /// Fetches a repo's info.
    pub async fn inspect_repo(&self, name: &str) -> CoreResult<RepoInfo> {
        let record = self
            .meta
            .repos
            .get(name)
            .ok_or_else(|| CoreError::RepoNotFound(name.to_string()))?;
        Ok(repo_to_info(&record))
    }

    /// Every repo, in name order.
    pub async fn list_repo(&self) -> CoreResult<Vec<RepoInfo>> {
        Ok(self.meta.repos.all().iter().map(repo_to_info).collect())
    }

    /// Deletes a repo and purges every commit, clock, and diff bearing its
    /// name, in one transaction (diffs, then clocks, then commits, then
    /// the repo record). Deleting an absent repo is not an error.
    pub async fn delete_repo(&self, name: &str) -> CoreResult<()> {
        let mut ops = Vec::new();
        for diff in self.meta.diffs.all() {
            if diff.repo == name {
                ops.push(TxnOp::DeleteDiff(diff.id));
            }
        }
        for clock in self.meta.clocks.all() {
            if clock.repo == name {
                ops.push(TxnOp::DeleteClock(clock.id));
            }
        }
        for commit in self.meta.commits.all() {
            if commit.repo == name {
                ops.push(TxnOp::DeleteCommit(commit.id));
            }
        }
        ops.push(TxnOp::DeleteRepo(name.to_string()));
        debug!("delete_repo {}: purging {} records", name, ops.len());
        self.meta.transaction(ops)?;
        Ok(())
    }
}
