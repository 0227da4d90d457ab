//! A typed table with secondary indexes and a change feed.
//!
//! Rows live in a `BTreeMap` behind an `RwLock`; secondary indexes map
//! typed keys to row keys. Every row carries the store-assigned insertion
//! sequence number that change-feed consumers use as a monotone resume
//! position. Feed events are published while the write lock is held and a
//! feed snapshot subscribes under the read lock, so `include_initial` is
//! atomic: no event between snapshot and tail can be missed.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ops::Bound::Included;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::warn;

use crate::error::MetaError;
use crate::index::IndexKey;
use crate::record::Record;

/// One change-feed event: a row's current state and its insertion order.
#[derive(Clone, Debug)]
pub struct FeedEvent<R> {
    /// Insertion sequence of the row (stable across updates).
    pub seq: u64,
    /// The row as of the event.
    pub record: R,
}

/// What an insert does when the primary key already exists.
pub enum OnConflict<R> {
    /// Fail with [`MetaError::Conflict`].
    Fail,
    /// Replace the existing row.
    Replace,
    /// Merge old and new with a caller-supplied function.
    Merge(Box<dyn Fn(&R, &R) -> Result<R, MetaError> + Send + Sync>),
}

struct Row<R> {
    seq: u64,
    record: R,
}

pub(crate) struct TableState<R> {
    rows: BTreeMap<String, Row<R>>,
    index: BTreeMap<(&'static str, IndexKey), BTreeSet<String>>,
    next_seq: u64,
}

impl<R: Record> TableState<R> {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            index: BTreeMap::new(),
            next_seq: 1,
        }
    }

    fn unindex(&mut self, record: &R, key: &str) {
        for entry in record.index_entries() {
            if let Some(keys) = self.index.get_mut(&entry) {
                keys.remove(key);
                if keys.is_empty() {
                    self.index.remove(&entry);
                }
            }
        }
    }

    pub(crate) fn upsert(&mut self, record: R) -> FeedEvent<R> {
        let key = record.key();
        let seq = match self.rows.get(&key) {
            Some(old) => {
                let seq = old.seq;
                let old_record = old.record.clone();
                self.unindex(&old_record, &key);
                seq
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                seq
            }
        };
        for entry in record.index_entries() {
            self.index.entry(entry).or_default().insert(key.clone());
        }
        let event = FeedEvent {
            seq,
            record: record.clone(),
        };
        self.rows.insert(key, Row { seq, record });
        event
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<R> {
        let row = self.rows.remove(key)?;
        self.unindex(&row.record, key);
        Some(row.record)
    }

    fn get(&self, key: &str) -> Option<R> {
        self.rows.get(key).map(|row| row.record.clone())
    }

    fn scan_exact(&self, index: &'static str, key: &IndexKey) -> Vec<R> {
        self.index
            .get(&(index, key.clone()))
            .map(|keys| keys.iter().filter_map(|k| self.get(k)).collect())
            .unwrap_or_default()
    }

    fn scan_range(
        &self,
        index: &'static str,
        lo: &IndexKey,
        hi: &IndexKey,
        descending: bool,
    ) -> Vec<R> {
        let range = self.index.range((
            Included(&(index, lo.clone())),
            Included(&(index, hi.clone())),
        ));
        let mut out = Vec::new();
        for (_, keys) in range {
            for key in keys {
                if let Some(record) = self.get(key) {
                    out.push(record);
                }
            }
        }
        if descending {
            out.reverse();
        }
        out
    }

    fn snapshot(
        &self,
        filter: &(dyn Fn(&R) -> bool + Send + Sync),
        after: Option<u64>,
    ) -> Vec<FeedEvent<R>> {
        let mut events: Vec<FeedEvent<R>> = self
            .rows
            .values()
            .filter(|row| after.map_or(true, |a| row.seq > a) && filter(&row.record))
            .map(|row| FeedEvent {
                seq: row.seq,
                record: row.record.clone(),
            })
            .collect();
        events.sort_by_key(|ev| ev.seq);
        events
    }
}

pub(crate) struct TableShared<R> {
    pub(crate) state: RwLock<TableState<R>>,
    pub(crate) feed: broadcast::Sender<FeedEvent<R>>,
}

impl<R: Record> TableShared<R> {
    pub(crate) fn publish(&self, event: FeedEvent<R>) {
        // no receivers is fine
        let _ = self.feed.send(event);
    }
}

/// A typed table: atomic writes, index scans, and a change feed.
pub struct Table<R: Record> {
    pub(crate) shared: Arc<TableShared<R>>,
}

impl<R: Record> Table<R> {
    /// Creates an empty table whose change feed buffers `feed_capacity`
    /// events per subscriber before it forces a resynchronization.
    pub fn new(feed_capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(feed_capacity.max(1));
        Self {
            shared: Arc::new(TableShared {
                state: RwLock::new(TableState::new()),
                feed,
            }),
        }
    }

    /// Fetches a row by primary key.
    pub fn get(&self, key: &str) -> Option<R> {
        self.shared.state.read().expect("lock poisoned").get(key)
    }

    /// Fetches a row by primary key, failing with `NotFound` if absent.
    pub fn get_required(&self, key: &str) -> Result<R, MetaError> {
        self.get(key).ok_or_else(|| MetaError::NotFound {
            table: R::TABLE,
            key: key.to_string(),
        })
    }

    /// Inserts a row, applying `on_conflict` if the key already exists.
    pub fn insert(&self, record: R, on_conflict: OnConflict<R>) -> Result<(), MetaError> {
        let mut state = self.shared.state.write().expect("lock poisoned");
        let key = record.key();
        let to_store = match state.get(&key) {
            None => record,
            Some(old) => match on_conflict {
                OnConflict::Fail => {
                    return Err(MetaError::Conflict {
                        table: R::TABLE,
                        key,
                    })
                }
                OnConflict::Replace => record,
                OnConflict::Merge(merge) => merge(&old, &record)?,
            },
        };
        let event = state.upsert(to_store);
        self.shared.publish(event);
        Ok(())
    }

    /// Atomically patches a row in place. Fails with `NotFound` if absent.
    pub fn update(&self, key: &str, patch: impl FnOnce(&mut R)) -> Result<(), MetaError> {
        let mut state = self.shared.state.write().expect("lock poisoned");
        let mut record = state.get(key).ok_or_else(|| MetaError::NotFound {
            table: R::TABLE,
            key: key.to_string(),
        })?;
        patch(&mut record);
        let event = state.upsert(record);
        self.shared.publish(event);
        Ok(())
    }

    /// Deletes a row. Deleting an absent key is not an error.
    pub fn delete(&self, key: &str) {
        let mut state = self.shared.state.write().expect("lock poisoned");
        state.remove(key);
    }

    /// All rows with exactly this index key.
    pub fn get_all_by_index(&self, index: &'static str, key: &IndexKey) -> Vec<R> {
        self.shared
            .state
            .read()
            .expect("lock poisoned")
            .scan_exact(index, key)
    }

    /// All rows whose index key falls in `[lo, hi]`, in index order.
    pub fn range_by_index(
        &self,
        index: &'static str,
        lo: &IndexKey,
        hi: &IndexKey,
        descending: bool,
    ) -> Vec<R> {
        self.shared
            .state
            .read()
            .expect("lock poisoned")
            .scan_range(index, lo, hi, descending)
    }

    /// Every row in the table, in primary-key order.
    pub fn all(&self) -> Vec<R> {
        let state = self.shared.state.read().expect("lock poisoned");
        state.rows.values().map(|row| row.record.clone()).collect()
    }

    /// The insertion sequence of a row, if it exists.
    pub fn insert_order(&self, key: &str) -> Option<u64> {
        let state = self.shared.state.read().expect("lock poisoned");
        state.rows.get(key).map(|row| row.seq)
    }

    /// Opens a change feed over the table.
    ///
    /// With `include_initial`, rows matching `filter` (with sequence
    /// greater than `after`, when given) are delivered first in insertion
    /// order, then the live tail follows; the handoff is atomic. Without
    /// it, only changes from now on are delivered.
    pub fn change_feed(
        &self,
        filter: impl Fn(&R) -> bool + Send + Sync + 'static,
        include_initial: bool,
        after: Option<u64>,
    ) -> Feed<R> {
        let filter: Arc<dyn Fn(&R) -> bool + Send + Sync> = Arc::new(filter);
        let state = self.shared.state.read().expect("lock poisoned");
        let rx = self.shared.feed.subscribe();
        let queue = if include_initial {
            state.snapshot(filter.as_ref(), after).into()
        } else {
            VecDeque::new()
        };
        drop(state);
        Feed {
            shared: Arc::clone(&self.shared),
            rx,
            filter,
            after,
            queue,
        }
    }
}

/// A change feed: buffered snapshot rows followed by a live tail.
///
/// A feed that falls behind the broadcast buffer resynchronizes from the
/// table; resynchronization may re-deliver rows, so consumers that need
/// exactly-once delivery deduplicate on [`FeedEvent::seq`].
pub struct Feed<R: Record> {
    shared: Arc<TableShared<R>>,
    rx: broadcast::Receiver<FeedEvent<R>>,
    filter: Arc<dyn Fn(&R) -> bool + Send + Sync>,
    after: Option<u64>,
    queue: VecDeque<FeedEvent<R>>,
}

impl<R: Record> Feed<R> {
    /// Waits for the next matching event. Returns `None` only if the
    /// table itself is gone.
    pub async fn next(&mut self) -> Option<FeedEvent<R>> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(event);
            }
            match self.rx.recv().await {
                Ok(event) => {
                    if self.passes(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("change feed lagged by {} events; resynchronizing", n);
                    self.resync();
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn passes(&self, event: &FeedEvent<R>) -> bool {
        self.after.map_or(true, |a| event.seq > a) && (self.filter)(&event.record)
    }

    fn resync(&mut self) {
        let state = self.shared.state.read().expect("lock poisoned");
        self.queue = state.snapshot(self.filter.as_ref(), self.after).into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RepoRecord;
    use crate::types::Timestamp;

    fn repo(name: &str) -> RepoRecord {
        RepoRecord {
            name: name.to_string(),
            created: Timestamp::now(),
            size_bytes: 0,
        }
    }

    #[test]
    fn test_insert_fail_on_conflict() {
        let table = Table::new(16);
        table.insert(repo("a"), OnConflict::Fail).unwrap();
        let err = table.insert(repo("a"), OnConflict::Fail).unwrap_err();
        assert!(matches!(err, MetaError::Conflict { .. }));
    }

    #[test]
    fn test_insert_replace() {
        let table = Table::new(16);
        table.insert(repo("a"), OnConflict::Fail).unwrap();
        let mut newer = repo("a");
        newer.size_bytes = 9;
        table.insert(newer, OnConflict::Replace).unwrap();
        assert_eq!(table.get("a").unwrap().size_bytes, 9);
    }

    #[test]
    fn test_insert_merge() {
        let table = Table::new(16);
        let mut a = repo("a");
        a.size_bytes = 3;
        table.insert(a, OnConflict::Fail).unwrap();
        let mut b = repo("a");
        b.size_bytes = 4;
        table
            .insert(
                b,
                OnConflict::Merge(Box::new(|old, new| {
                    let mut merged = new.clone();
                    merged.size_bytes = old.size_bytes + new.size_bytes;
                    Ok(merged)
                })),
            )
            .unwrap();
        assert_eq!(table.get("a").unwrap().size_bytes, 7);
    }

    #[test]
    fn test_update_patches_in_place() {
        let table = Table::new(16);
        table.insert(repo("a"), OnConflict::Fail).unwrap();
        table.update("a", |r| r.size_bytes += 5).unwrap();
        table.update("a", |r| r.size_bytes += 5).unwrap();
        assert_eq!(table.get("a").unwrap().size_bytes, 10);
        assert!(table.update("missing", |_| {}).is_err());
    }

    #[test]
    fn test_insert_order_is_stable_across_updates() {
        let table = Table::new(16);
        table.insert(repo("a"), OnConflict::Fail).unwrap();
        table.insert(repo("b"), OnConflict::Fail).unwrap();
        let a_seq = table.insert_order("a").unwrap();
        table.update("a", |r| r.size_bytes = 1).unwrap();
        assert_eq!(table.insert_order("a").unwrap(), a_seq);
        assert!(table.insert_order("b").unwrap() > a_seq);
    }

    #[tokio::test]
    async fn test_feed_include_initial_then_tail() {
        let table = Table::new(16);
        table.insert(repo("a"), OnConflict::Fail).unwrap();
        let mut feed = table.change_feed(|_| true, true, None);
        let first = feed.next().await.unwrap();
        assert_eq!(first.record.name, "a");

        table.insert(repo("b"), OnConflict::Fail).unwrap();
        let second = feed.next().await.unwrap();
        assert_eq!(second.record.name, "b");
        assert!(second.seq > first.seq);
    }

    #[tokio::test]
    async fn test_feed_after_filters_old_rows() {
        let table = Table::new(16);
        table.insert(repo("a"), OnConflict::Fail).unwrap();
        let a_seq = table.insert_order("a").unwrap();
        table.insert(repo("b"), OnConflict::Fail).unwrap();
        let mut feed = table.change_feed(|_| true, true, Some(a_seq));
        let ev = feed.next().await.unwrap();
        assert_eq!(ev.record.name, "b");
    }

    #[tokio::test]
    async fn test_feed_sees_updates() {
        let table = Table::new(16);
        table.insert(repo("a"), OnConflict::Fail).unwrap();
        let mut feed = table.change_feed(|r| r.size_bytes > 0, false, None);
        table.update("a", |r| r.size_bytes = 1).unwrap();
        let ev = feed.next().await.unwrap();
        assert_eq!(ev.record.size_bytes, 1);
    }
}
