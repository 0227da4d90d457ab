//! Long-polling subscription to a repo's new commits.

use riverfs_meta::record::CommitRecord;
use riverfs_meta::table::Feed;

use crate::commit::commit_to_info;
use crate::driver::Driver;
use crate::error::CoreResult;
use crate::types::CommitInfo;

impl Driver {
    /// Opens a stream of the repo's commits started after `since`
    /// (after the beginning of time if `None`), in insertion order.
    pub async fn subscribe_commit(
        &self,
        repo: &str,
        since: Option<&str>,
    ) -> CoreResult<CommitStream> {
        let position = match since {
            Some(commit_ref) => {
                let commit = self.resolve_commit(repo, commit_ref)?;
                self.meta.commits.insert_order(&commit.id)
            }
            None => None,
        };
        Ok(self.subscribe_commit_at(repo, position))
    }

    /// Resumes a stream from a position previously read off
    /// [`CommitStream::position`]. Positions are monotone and opaque;
    /// resuming from one never re-delivers or skips a commit.
    pub fn subscribe_commit_at(&self, repo: &str, position: Option<u64>) -> CommitStream {
        let repo = repo.to_string();
        let feed = self
            .meta
            .commits
            .change_feed(move |commit| commit.repo == repo, true, position);
        CommitStream {
            feed,
            last_seq: position.unwrap_or(0),
        }
    }
}

/// A live stream of one repo's commits in insertion order.
pub struct CommitStream {
    feed: Feed<CommitRecord>,
    last_seq: u64,
}

impl CommitStream {
    /// Waits for the next commit. Updates to already-delivered commits
    /// are skipped, so each commit is delivered exactly once.
    pub async fn next(&mut self) -> Option<CommitInfo> {
        loop {
            let event = self.feed.next().await?;
            if event.seq <= self.last_seq {
                continue;
            }
            self.last_seq = event.seq;
            return Some(commit_to_info(&event.record));
        }
    }

    /// The resume position: pass to `subscribe_commit_at` after a
    /// disconnect to continue from the last delivered commit.
    pub fn position(&self) -> u64 {
        self.last_seq
    }
}
