//! File operations: puts, reads, listings, and deletes as diff inserts
//! and diff folds.
//!
//! Every read computes the ancestor clock interval of the queried commit,
//! joins it against the diff indexes, and folds the matches oldest first:
//! a delete diff resets the accumulator, any other diff extends it. The
//! final accumulator is the effective state of the path at that commit.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use riverfs_block::{block_in_shard, file_in_shard, Delimiter, Shard};
use riverfs_clock::{clock_intervals, interval_to_clocks, BranchClock};
use riverfs_meta::path::{clean_path, first_component_under, prefixes};
use riverfs_meta::record::{CommitRecord, DiffRecord};
use riverfs_meta::table::OnConflict;
use riverfs_meta::{index, FileType, MetaError, Timestamp};
use tokio::io::AsyncRead;
use tracing::debug;

use crate::driver::Driver;
use crate::error::{CoreError, CoreResult};
use crate::reader::FileReader;
use crate::types::{FileInfo, FileRef};

/// Replays diffs (already in clock order) into the effective state.
fn fold_diffs(diffs: &[DiffRecord]) -> DiffRecord {
    let mut acc = DiffRecord {
        id: String::new(),
        repo: String::new(),
        commit_id: String::new(),
        path: String::new(),
        branch_clocks: Vec::new(),
        file_type: FileType::None,
        block_refs: Vec::new(),
        size: 0,
        delete: false,
        modified: Timestamp::default(),
    };
    for diff in diffs {
        acc.repo = diff.repo.clone();
        acc.commit_id = diff.commit_id.clone();
        acc.path = diff.path.clone();
        acc.file_type = diff.file_type;
        acc.modified = diff.modified;
        if diff.delete {
            acc.block_refs = diff.block_refs.clone();
            acc.size = diff.size;
        } else {
            acc.block_refs.extend(diff.block_refs.iter().cloned());
            acc.size += diff.size;
        }
    }
    acc
}

/// The conflict resolver for diff upserts within one commit: refs and
/// sizes concatenate, the new type wins only over `None`, anything else
/// is a type conflict.
fn merge_diffs(old: &DiffRecord, new: &DiffRecord) -> Result<DiffRecord, MetaError> {
    if old.file_type != FileType::None && old.file_type != new.file_type {
        return Err(MetaError::MergeRejected(format!(
            "file type conflict at {}",
            new.path
        )));
    }
    let mut merged = old.clone();
    merged.block_refs.extend(new.block_refs.iter().cloned());
    merged.size += new.size;
    merged.file_type = new.file_type;
    merged.modified = new.modified;
    Ok(merged)
}

/// Flattened ancestor clocks from `from` (exclusive) to `to` (inclusive),
/// oldest first.
fn ancestor_clocks(
    from: Option<&CommitRecord>,
    to: &CommitRecord,
) -> CoreResult<Vec<BranchClock>> {
    let Some(to_bc) = to.branch_clocks.first() else {
        return Ok(Vec::new());
    };
    let from_bc = from.and_then(|c| c.branch_clocks.first());
    let intervals = clock_intervals(from_bc, to_bc)?;
    Ok(interval_to_clocks(&intervals, false))
}

/// Groups matched diffs by path and folds each group. The map iterates in
/// path order; each group keeps its clock order.
fn group_and_fold(matched: Vec<DiffRecord>) -> BTreeMap<String, DiffRecord> {
    let mut groups: BTreeMap<String, Vec<DiffRecord>> = BTreeMap::new();
    for diff in matched {
        groups.entry(diff.path.clone()).or_default().push(diff);
    }
    groups
        .into_iter()
        .map(|(path, diffs)| (path, fold_diffs(&diffs)))
        .collect()
}

impl Driver {
    /// Streams bytes into the block store and records them at `path` in
    /// the open commit, along with directory diffs for every ancestor of
    /// the path. Fails with [`CoreError::FileTypeConflict`] if the path or
    /// an ancestor already has a different type at this commit.
    pub async fn put_file(
        &self,
        file: &FileRef,
        delimiter: Delimiter,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> CoreResult<()> {
        let commit = self.resolve_open_commit(&file.repo, &file.commit)?;
        let path = clean_path(&file.path);

        let refs = self.blocks.put_block(delimiter, reader).await?;
        let size: u64 = refs.iter().map(|r| r.size()).sum();
        let now = Timestamp::now();

        // A put's diffs carry the tombstone flag along with their refs:
        // the fold's replace branch then swaps in this commit's content,
        // so a commit supersedes its ancestors at the paths it touches
        // while same-commit puts still concatenate through the merge.
        let mut planned = Vec::new();
        for prefix in prefixes(&path) {
            if prefix == "/" {
                continue;
            }
            planned.push(DiffRecord {
                id: DiffRecord::id_for(&commit.id, &prefix),
                repo: commit.repo.clone(),
                commit_id: commit.id.clone(),
                path: prefix,
                branch_clocks: commit.branch_clocks.clone(),
                file_type: FileType::Dir,
                block_refs: Vec::new(),
                size: 0,
                delete: true,
                modified: now,
            });
        }
        planned.push(DiffRecord {
            id: DiffRecord::id_for(&commit.id, &path),
            repo: commit.repo.clone(),
            commit_id: commit.id.clone(),
            path: path.clone(),
            branch_clocks: commit.branch_clocks.clone(),
            file_type: FileType::File,
            block_refs: refs,
            size,
            delete: true,
            modified: now,
        });

        // Reject type conflicts against the effective state at this commit
        // before writing anything.
        for diff in &planned {
            let probe = FileRef::new(file.repo.clone(), file.commit.clone(), diff.path.clone());
            match self.folded_diff(&probe, None, None) {
                Ok(existing) if existing.file_type != diff.file_type => {
                    return Err(CoreError::FileTypeConflict(diff.path.clone()));
                }
                Ok(_) | Err(CoreError::FileNotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }

        debug!(
            "put_file {}/{}{}: {} bytes in {} diffs",
            file.repo,
            file.commit,
            path,
            size,
            planned.len()
        );
        // Parents land before the leaf, so a crash mid-way cannot leave a
        // leaf without its directories.
        for diff in planned {
            let diff_path = diff.path.clone();
            self.meta
                .diffs
                .insert(diff, OnConflict::Merge(Box::new(merge_diffs)))
                .map_err(|err| match err {
                    MetaError::MergeRejected(_) => CoreError::FileTypeConflict(diff_path),
                    other => other.into(),
                })?;
        }
        Ok(())
    }

    /// Returns a reader over the file's bytes at the resolved commit,
    /// honoring `offset` and `size` and serving only block refs accepted
    /// by the filter shard.
    pub async fn get_file(
        &self,
        file: &FileRef,
        filter_shard: Option<&Shard>,
        offset: u64,
        size: Option<u64>,
        from: Option<&str>,
    ) -> CoreResult<FileReader> {
        let folded = self.folded_diff(file, filter_shard, from)?;
        if folded.file_type == FileType::Dir {
            return Err(CoreError::NotAFile(folded.path));
        }
        Ok(FileReader::new(
            Arc::clone(&self.blocks),
            folded.block_refs,
            offset,
            size,
        ))
    }

    /// The effective state of a path at the resolved commit. Directories
    /// come back with their children populated.
    pub async fn inspect_file(
        &self,
        file: &FileRef,
        filter_shard: Option<&Shard>,
        from: Option<&str>,
    ) -> CoreResult<FileInfo> {
        let folded = self.folded_diff(file, filter_shard, from)?;
        let path = clean_path(&file.path);
        let mut info = FileInfo {
            file: FileRef::new(file.repo.clone(), file.commit.clone(), path.clone()),
            file_type: folded.file_type,
            size_bytes: folded.size,
            modified: folded.modified,
            commit_modified: folded.commit_id,
            children: Vec::new(),
        };
        if folded.file_type == FileType::Dir {
            let to = self.resolve_commit(&file.repo, &file.commit)?;
            let from_commit = self.resolve_from(&file.repo, from)?;
            for child in self.get_children(&file.repo, &path, from_commit.as_ref(), &to)? {
                info.children
                    .push(FileRef::new(file.repo.clone(), child.commit_id, child.path));
            }
        }
        Ok(info)
    }

    /// Lists a path: a file lists as itself; a directory (or the root)
    /// lists its children, recursively if asked, with descendant sizes
    /// merged into each direct child.
    pub async fn list_file(
        &self,
        file: &FileRef,
        filter_shard: Option<&Shard>,
        from: Option<&str>,
        recurse: bool,
    ) -> CoreResult<Vec<FileInfo>> {
        let path = clean_path(&file.path);
        // the root is always a directory, diff or no diff
        if path != "/" {
            let info = self.inspect_file(file, filter_shard, from).await?;
            if info.file_type == FileType::File {
                return Ok(vec![info]);
            }
        }

        let to = self.resolve_commit(&file.repo, &file.commit)?;
        let from_commit = self.resolve_from(&file.repo, from)?;
        let children = if recurse {
            self.get_children_recursive(&file.repo, &path, from_commit.as_ref(), &to)?
        } else {
            self.get_children(&file.repo, &path, from_commit.as_ref(), &to)?
        };
        Ok(children
            .into_iter()
            .map(|diff| FileInfo {
                file: FileRef::new(file.repo.clone(), file.commit.clone(), diff.path.clone()),
                file_type: diff.file_type,
                size_bytes: diff.size,
                modified: diff.modified,
                commit_modified: diff.commit_id,
                children: Vec::new(),
            })
            .collect())
    }

    /// Deletes a path and every live descendant in the open commit by
    /// inserting delete diffs, leaves first.
    pub async fn delete_file(&self, file: &FileRef) -> CoreResult<()> {
        let commit = self.resolve_open_commit(&file.repo, &file.commit)?;
        let prefix = clean_path(&file.path);

        let clocks = ancestor_clocks(None, &commit)?;
        let mut matched = Vec::new();
        for clock in &clocks {
            matched.extend(self.meta.diffs.get_all_by_index(
                index::DIFF_PREFIX,
                &index::diff_prefix_key(&file.repo, &prefix, clock),
            ));
        }
        let mut paths: Vec<String> = group_and_fold(matched)
            .into_iter()
            .filter(|(_, diff)| diff.file_type != FileType::None)
            .map(|(path, _)| path)
            .collect();
        paths.sort_by(|a, b| b.cmp(a));
        paths.push(prefix.clone());

        debug!(
            "delete_file {}/{}{}: {} paths",
            file.repo,
            file.commit,
            prefix,
            paths.len()
        );
        let now = Timestamp::now();
        for path in paths {
            let diff = DiffRecord {
                id: DiffRecord::id_for(&commit.id, &path),
                repo: commit.repo.clone(),
                commit_id: commit.id.clone(),
                path,
                branch_clocks: commit.branch_clocks.clone(),
                file_type: FileType::None,
                block_refs: Vec::new(),
                size: 0,
                delete: true,
                modified: now,
            };
            self.meta.diffs.insert(diff, OnConflict::Replace)?;
        }
        Ok(())
    }

    /// Directories exist implicitly through their children's diffs.
    pub async fn make_directory(&self, _file: &FileRef) -> CoreResult<()> {
        Ok(())
    }

    /// The single-path fold behind gets and inspects, with shard
    /// filtering applied to the folded block refs.
    pub(crate) fn folded_diff(
        &self,
        file: &FileRef,
        filter_shard: Option<&Shard>,
        from: Option<&str>,
    ) -> CoreResult<DiffRecord> {
        let path = clean_path(&file.path);
        let not_found = || CoreError::FileNotFound {
            repo: file.repo.clone(),
            commit: file.commit.clone(),
            path: path.clone(),
        };
        if !file_in_shard(filter_shard, &path) {
            return Err(not_found());
        }

        let to = self.resolve_commit(&file.repo, &file.commit)?;
        let from_commit = self.resolve_from(&file.repo, from)?;
        let clocks = ancestor_clocks(from_commit.as_ref(), &to)?;
        let mut matched = Vec::new();
        for clock in &clocks {
            matched.extend(self.meta.diffs.get_all_by_index(
                index::DIFF_PATH,
                &index::diff_path_key(&file.repo, &path, clock),
            ));
        }
        if matched.is_empty() {
            return Err(not_found());
        }
        let mut folded = fold_diffs(&matched);
        if folded.file_type == FileType::None {
            return Err(not_found());
        }

        if folded.block_refs.is_empty() {
            // an empty file is still seen by exactly one shard
            if !block_in_shard(filter_shard, &path, None) {
                return Err(not_found());
            }
        } else {
            folded
                .block_refs
                .retain(|r| block_in_shard(filter_shard, &path, Some(&r.hash)));
            if folded.block_refs.is_empty() {
                return Err(not_found());
            }
        }
        Ok(folded)
    }

    fn resolve_from(&self, repo: &str, from: Option<&str>) -> CoreResult<Option<CommitRecord>> {
        match from {
            Some(commit_ref) => Ok(Some(self.resolve_commit(repo, commit_ref)?)),
            None => Ok(None),
        }
    }

    /// Direct children of a directory, folded and live, in path order.
    fn get_children(
        &self,
        repo: &str,
        parent: &str,
        from: Option<&CommitRecord>,
        to: &CommitRecord,
    ) -> CoreResult<Vec<DiffRecord>> {
        let clocks = ancestor_clocks(from, to)?;
        let mut matched = Vec::new();
        for clock in &clocks {
            matched.extend(self.meta.diffs.get_all_by_index(
                index::DIFF_PARENT,
                &index::diff_parent_key(repo, parent, clock),
            ));
        }
        Ok(group_and_fold(matched)
            .into_values()
            .filter(|diff| diff.file_type != FileType::None)
            .collect())
    }

    /// Live descendants of `prefix` grouped into direct children: one
    /// entry per first path component, sizes summed, the shortest path in
    /// each group as the representative.
    fn get_children_recursive(
        &self,
        repo: &str,
        prefix: &str,
        from: Option<&CommitRecord>,
        to: &CommitRecord,
    ) -> CoreResult<Vec<DiffRecord>> {
        let clocks = ancestor_clocks(from, to)?;
        let mut matched = Vec::new();
        for clock in &clocks {
            matched.extend(self.meta.diffs.get_all_by_index(
                index::DIFF_PREFIX,
                &index::diff_prefix_key(repo, prefix, clock),
            ));
        }

        let mut groups: BTreeMap<String, DiffRecord> = BTreeMap::new();
        for diff in group_and_fold(matched)
            .into_values()
            .filter(|diff| diff.file_type != FileType::None)
        {
            let Some(component) = first_component_under(prefix, &diff.path) else {
                continue;
            };
            match groups.entry(component) {
                Entry::Vacant(entry) => {
                    entry.insert(diff);
                }
                Entry::Occupied(mut entry) => {
                    let rep = entry.get_mut();
                    rep.size += diff.size;
                    if diff.path < rep.path {
                        let total = rep.size;
                        *rep = diff;
                        rep.size = total;
                    }
                }
            }
        }
        Ok(groups.into_values().collect())
    }
}
