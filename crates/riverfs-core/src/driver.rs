//! The driver: the two service handles plus ref resolution.

use std::sync::Arc;

use riverfs_block::BlockStore;
use riverfs_clock::Clock;
use riverfs_meta::record::CommitRecord;
use riverfs_meta::{index, MetaDb};

use crate::error::{CoreError, CoreResult};

/// The repository engine: every operation runs against the metadata store
/// and the block store client handed in at construction. The driver holds
/// no other state, so it can be cloned cheaply and shared across tasks.
#[derive(Clone)]
pub struct Driver {
    pub(crate) meta: Arc<MetaDb>,
    pub(crate) blocks: Arc<dyn BlockStore>,
}

impl Driver {
    /// Creates a driver over the given service handles.
    pub fn new(meta: Arc<MetaDb>, blocks: Arc<dyn BlockStore>) -> Self {
        Self { meta, blocks }
    }

    /// The metadata store this driver runs against.
    pub fn meta(&self) -> &MetaDb {
        &self.meta
    }

    /// Resolves an ambiguous commit ref, in order: a `branch/n` alias,
    /// then a bare branch name (meaning the head of that branch), then a
    /// raw commit id.
    pub(crate) fn resolve_commit(
        &self,
        repo: &str,
        commit_ref: &str,
    ) -> CoreResult<CommitRecord> {
        if let Ok(clock) = Clock::parse_alias(commit_ref) {
            return self
                .meta
                .commits
                .get_all_by_index(
                    index::COMMIT_BRANCH,
                    &index::commit_branch_key(repo, &clock.branch, clock.n),
                )
                .into_iter()
                .next()
                .ok_or_else(|| CoreError::CommitNotFound {
                    repo: repo.to_string(),
                    commit: commit_ref.to_string(),
                });
        }
        if let Some(head) = self.head_of_branch(repo, commit_ref) {
            return Ok(head);
        }
        self.meta
            .commits
            .get(commit_ref)
            .filter(|commit| commit.repo == repo)
            .ok_or_else(|| CoreError::CommitNotFound {
                repo: repo.to_string(),
                commit: commit_ref.to_string(),
            })
    }

    /// The newest commit on a branch, if the branch has any.
    pub(crate) fn head_of_branch(&self, repo: &str, branch: &str) -> Option<CommitRecord> {
        let (lo, hi) = index::commit_branch_range(repo, branch);
        self.meta
            .commits
            .range_by_index(index::COMMIT_BRANCH, &lo, &hi, true)
            .into_iter()
            .next()
    }

    /// Resolves a commit and requires it to still be open.
    pub(crate) fn resolve_open_commit(
        &self,
        repo: &str,
        commit_ref: &str,
    ) -> CoreResult<CommitRecord> {
        let commit = self.resolve_commit(repo, commit_ref)?;
        if commit.finished.is_some() {
            return Err(CoreError::CommitAlreadyFinished {
                repo: repo.to_string(),
                commit: commit_ref.to_string(),
            });
        }
        Ok(commit)
    }
}

/// Checks a repo name against `[A-Za-z0-9_]+`.
pub(crate) fn validate_repo_name(name: &str) -> CoreResult<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(CoreError::InvalidRepoName(name.to_string()));
    }
    Ok(())
}
