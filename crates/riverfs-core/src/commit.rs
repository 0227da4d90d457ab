//! Commit operations: start, finish, inspect, list, branches.

use std::collections::BTreeMap;

use riverfs_clock::{
    branch_off_branch_clocks, child_of_branch_clocks, get_clock_for_branch, new_branch_clocks,
    BranchClock, Clock, ClockError,
};
use riverfs_meta::record::{ClockRecord, CommitRecord};
use riverfs_meta::table::OnConflict;
use riverfs_meta::{index, MetaError, Timestamp};
use tracing::warn;
use uuid::Uuid;

use crate::driver::Driver;
use crate::error::{CoreError, CoreResult};
use crate::types::{CommitInfo, CommitType, ListCommitRequest};

pub(crate) fn commit_to_info(commit: &CommitRecord) -> CommitInfo {
    let branch = commit
        .branch_clocks
        .first()
        .and_then(|bc| bc.branch())
        .unwrap_or_default()
        .to_string();
    CommitInfo {
        commit_id: commit.id.clone(),
        repo: commit.repo.clone(),
        branch,
        started: commit.started,
        finished: commit.finished,
        cancelled: commit.cancelled,
        commit_type: if commit.finished.is_some() {
            CommitType::Read
        } else {
            CommitType::Write
        },
        size_bytes: commit.size,
    }
}

impl Driver {
    /// Starts a commit and returns its canonical id.
    ///
    /// With no parent and no branch hint, a fresh branch named by a uuid
    /// is created. With no parent and a branch hint, the commit extends
    /// that branch's head (or begins the branch). With a parent ref, the
    /// commit extends the parent's branch, or forks `branch` off it when
    /// the hint names a different branch.
    ///
    /// The new head is reserved by inserting its clock record before the
    /// commit record lands; if the commit insert then fails, the
    /// reservation is released best-effort. A crash between the two
    /// writes leaves the branch with a reserved but unreachable slot.
    pub async fn start_commit(
        &self,
        repo: &str,
        parent: Option<&str>,
        branch: Option<&str>,
        provenance: Vec<String>,
    ) -> CoreResult<String> {
        self.meta
            .repos
            .get(repo)
            .ok_or_else(|| CoreError::RepoNotFound(repo.to_string()))?;

        let commit_id = Uuid::new_v4().simple().to_string();
        let (branch_clocks, reserved) = match parent {
            None => self.reserve_on_branch(repo, branch, &commit_id)?,
            Some(parent_ref) => self.reserve_from_parent(repo, parent_ref, branch, &commit_id)?,
        };

        let commit = CommitRecord {
            id: commit_id.clone(),
            repo: repo.to_string(),
            started: Timestamp::now(),
            finished: None,
            cancelled: false,
            branch_clocks,
            provenance,
            size: 0,
        };
        if let Err(err) = self.meta.commits.insert(commit, OnConflict::Fail) {
            // release the reserved head so the slot is not orphaned
            warn!(
                "commit insert failed after reserving clock {}; releasing it",
                reserved
            );
            self.meta.clocks.delete(&reserved);
            return Err(err.into());
        }
        Ok(commit_id)
    }

    /// Head-extension path: loop until our clock insert wins the race.
    fn reserve_on_branch(
        &self,
        repo: &str,
        branch: Option<&str>,
        commit_id: &str,
    ) -> CoreResult<(Vec<BranchClock>, String)> {
        let branch = branch
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        loop {
            let branch_clocks = match self.head_of_branch(repo, &branch) {
                Some(parent) => child_of_branch_clocks(&parent.branch_clocks, &branch)?,
                None => new_branch_clocks(&branch),
            };
            let clock = get_clock_for_branch(&branch_clocks, &branch)?.clone();
            let record = ClockRecord::new(repo, &clock, commit_id);
            let key = record.id.clone();
            match self.meta.clocks.insert(record, OnConflict::Fail) {
                Ok(()) => return Ok((branch_clocks, key)),
                // another writer claimed this slot; re-read the head
                Err(MetaError::Conflict { .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Explicit-parent path: derive the clocks once, reserve or fail.
    fn reserve_from_parent(
        &self,
        repo: &str,
        parent_ref: &str,
        branch: Option<&str>,
        commit_id: &str,
    ) -> CoreResult<(Vec<BranchClock>, String)> {
        let parent = self.resolve_commit(repo, parent_ref)?;
        let parent_branch = parent
            .branch_clocks
            .first()
            .and_then(|bc| bc.branch())
            .ok_or_else(|| CoreError::CommitNotFound {
                repo: repo.to_string(),
                commit: parent_ref.to_string(),
            })?
            .to_string();

        let tail_branch;
        let branch_clocks = match branch {
            Some(requested) if requested != parent_branch => {
                tail_branch = requested.to_string();
                branch_off_branch_clocks(&parent.branch_clocks, &parent_branch, requested)
                    .map_err(|err| match err {
                        ClockError::BranchExists(b) => CoreError::BranchExists(b),
                        other => other.into(),
                    })?
            }
            _ => {
                tail_branch = parent_branch;
                child_of_branch_clocks(&parent.branch_clocks, &tail_branch)?
            }
        };

        let clock = get_clock_for_branch(&branch_clocks, &tail_branch)?.clone();
        let record = ClockRecord::new(repo, &clock, commit_id);
        let key = record.id.clone();
        self.meta
            .clocks
            .insert(record, OnConflict::Fail)
            .map_err(|err| match err {
                MetaError::Conflict { .. } => CoreError::BranchExists(tail_branch.clone()),
                other => other.into(),
            })?;
        Ok((branch_clocks, key))
    }

    /// Finishes a commit, blocking until its parent is finished.
    ///
    /// The parent's `cancelled` flag cascades into this commit, combined
    /// with the caller's `cancel`. The repo size update and the
    /// commit-finish write are two separate writes; a failure between
    /// them over-reports the repo size until reconciled.
    pub async fn finish_commit(
        &self,
        repo: &str,
        commit_ref: &str,
        cancel: bool,
    ) -> CoreResult<()> {
        let commit = self.resolve_commit(repo, commit_ref)?;
        if commit.finished.is_some() {
            return Err(CoreError::CommitAlreadyFinished {
                repo: repo.to_string(),
                commit: commit_ref.to_string(),
            });
        }

        let size = self.compute_commit_size(&commit.id);

        let mut parent_cancelled = false;
        if let Some(parent) = self.parent_of(&commit)? {
            if parent.finished.is_some() {
                parent_cancelled = parent.cancelled;
            } else {
                let parent_id = parent.id.clone();
                let mut feed = self.meta.commits.change_feed(
                    move |c| c.id == parent_id && c.finished.is_some(),
                    true,
                    None,
                );
                if let Some(event) = feed.next().await {
                    parent_cancelled = event.record.cancelled;
                }
            }
        }

        self.meta
            .repos
            .update(&commit.repo, |repo| repo.size_bytes += size)
            .map_err(|err| match err {
                MetaError::NotFound { .. } => CoreError::RepoNotFound(commit.repo.clone()),
                other => other.into(),
            })?;

        let finished = Timestamp::now();
        self.meta.commits.update(&commit.id, |c| {
            c.finished = Some(finished);
            c.cancelled = cancel || parent_cancelled;
            c.size = size;
        })?;
        Ok(())
    }

    /// Fetches a commit's info. The caller's ref is echoed back as the
    /// returned `commit_id`; for open commits the size is computed on
    /// demand from the commit's diffs.
    pub async fn inspect_commit(&self, repo: &str, commit_ref: &str) -> CoreResult<CommitInfo> {
        let commit = self.resolve_commit(repo, commit_ref)?;
        let mut info = commit_to_info(&commit);
        if commit.finished.is_none() {
            info.size_bytes = self.compute_commit_size(&commit.id);
        }
        info.commit_id = commit_ref.to_string();
        Ok(info)
    }

    /// Lists commits per repo, newest first within each branch, applying
    /// the request's type, provenance, and cancellation filters. When the
    /// result is empty and `block` is set, waits for the first matching
    /// commit instead of returning nothing.
    pub async fn list_commit(&self, request: ListCommitRequest) -> CoreResult<Vec<CommitInfo>> {
        let mut from_by_repo: BTreeMap<String, Option<Clock>> = BTreeMap::new();
        for repo in &request.repos {
            from_by_repo.insert(repo.clone(), None);
        }
        for from in &request.from {
            let commit = self.resolve_commit(&from.repo, &from.id)?;
            let clock = commit
                .branch_clocks
                .first()
                .and_then(|bc| bc.head())
                .cloned();
            from_by_repo.insert(from.repo.clone(), clock);
        }

        let mut provenance_ids = Vec::new();
        for p in &request.provenance {
            provenance_ids.push(self.resolve_commit(&p.repo, &p.id)?.id);
        }

        let mut candidates = Vec::new();
        for (repo, from) in &from_by_repo {
            match from {
                None => {
                    for branch in self.branches_of(repo) {
                        let (lo, hi) = index::commit_branch_range(repo, &branch);
                        candidates.extend(self.meta.commits.range_by_index(
                            index::COMMIT_BRANCH,
                            &lo,
                            &hi,
                            true,
                        ));
                    }
                }
                Some(clock) => {
                    let (lo, hi) =
                        index::commit_branch_range_from(repo, &clock.branch, clock.n + 1);
                    candidates.extend(self.meta.commits.range_by_index(
                        index::COMMIT_BRANCH,
                        &lo,
                        &hi,
                        true,
                    ));
                }
            }
        }

        let include_cancelled = request.include_cancelled;
        let commit_type = request.commit_type;
        let passes = move |commit: &CommitRecord| -> bool {
            let from = match from_by_repo.get(&commit.repo) {
                Some(from) => from,
                None => return false,
            };
            if let Some(clock) = from {
                let head = commit.branch_clocks.first().and_then(|bc| bc.head());
                match head {
                    Some(h) if h.branch == clock.branch && h.n > clock.n => {}
                    _ => return false,
                }
            }
            if !include_cancelled && commit.cancelled {
                return false;
            }
            match commit_type {
                Some(CommitType::Read) if commit.finished.is_none() => return false,
                Some(CommitType::Write) if commit.finished.is_some() => return false,
                _ => {}
            }
            provenance_ids
                .iter()
                .all(|id| commit.provenance.contains(id))
        };

        let matched: Vec<CommitInfo> = candidates
            .iter()
            .filter(|c| passes(c))
            .map(commit_to_info)
            .collect();
        if !matched.is_empty() || !request.block {
            return Ok(matched);
        }

        // Block for the first commit matching the same filters.
        let mut feed = self.meta.commits.change_feed(passes, true, None);
        match feed.next().await {
            Some(event) => Ok(vec![commit_to_info(&event.record)]),
            None => Ok(Vec::new()),
        }
    }

    /// Every branch of a repo with its head commit, in branch order.
    pub async fn list_branch(&self, repo: &str) -> CoreResult<Vec<CommitInfo>> {
        let mut infos = Vec::new();
        for branch in self.branches_of(repo) {
            if let Some(head) = self.head_of_branch(repo, &branch) {
                let mut info = commit_to_info(&head);
                info.branch = branch;
                infos.push(info);
            }
        }
        Ok(infos)
    }

    /// Commits are immutable; deletion is reserved and unsupported.
    pub async fn delete_commit(&self, _repo: &str, _commit_ref: &str) -> CoreResult<()> {
        Err(CoreError::Unsupported("DeleteCommit"))
    }

    /// Merge is reserved and unsupported.
    pub async fn merge(&self, _repo: &str, _refs: &[String]) -> CoreResult<Vec<CommitInfo>> {
        Err(CoreError::Unsupported("Merge"))
    }

    /// Distinct branch names of a repo, in lexicographic order.
    pub(crate) fn branches_of(&self, repo: &str) -> Vec<String> {
        let (lo, hi) = index::clock_branch_range(repo);
        let mut branches: Vec<String> = self
            .meta
            .clocks
            .range_by_index(index::CLOCK_BRANCH, &lo, &hi, false)
            .into_iter()
            .map(|clock| clock.branch)
            .collect();
        branches.dedup();
        branches
    }

    /// Sum of a commit's diff sizes.
    pub(crate) fn compute_commit_size(&self, commit_id: &str) -> u64 {
        self.meta
            .diffs
            .get_all_by_index(index::DIFF_COMMIT, &index::diff_commit_key(commit_id))
            .iter()
            .map(|diff| diff.size)
            .sum()
    }

    /// The parent of a commit, derived from its clock tail: `n-1` on the
    /// same branch, or the branch point one level up for `n == 0`.
    pub(crate) fn parent_of(&self, commit: &CommitRecord) -> CoreResult<Option<CommitRecord>> {
        let bc = match commit.branch_clocks.first() {
            Some(bc) => bc,
            None => return Ok(None),
        };
        let parent_clock = match bc.head() {
            Some(head) if head.n > 0 => Clock::new(head.branch.clone(), head.n - 1),
            Some(_) if bc.clocks.len() >= 2 => bc.clocks[bc.clocks.len() - 2].clone(),
            _ => return Ok(None),
        };
        self.meta
            .commits
            .get_all_by_index(
                index::COMMIT_BRANCH,
                &index::commit_branch_key(&commit.repo, &parent_clock.branch, parent_clock.n),
            )
            .into_iter()
            .next()
            .map(Some)
            .ok_or_else(|| CoreError::CommitNotFound {
                repo: commit.repo.clone(),
                commit: parent_clock.to_string(),
            })
    }
}
