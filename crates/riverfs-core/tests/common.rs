//! Shared fixtures for driver integration tests.

use std::sync::Arc;

use riverfs_block::{MemBlockStore, MemBlockStoreConfig};
use riverfs_core::{Delimiter, Driver, FileRef};
use riverfs_meta::MetaDb;

/// A driver over fresh in-memory stores. Blocks are kept small so reads
/// exercise the multi-ref path.
pub fn driver() -> Driver {
    let meta = Arc::new(MetaDb::new());
    let blocks = Arc::new(MemBlockStore::with_config(MemBlockStoreConfig {
        target_block_bytes: 16,
    }));
    Driver::new(meta, blocks)
}

/// Writes `bytes` to `path` in an open commit.
pub async fn put(driver: &Driver, repo: &str, commit: &str, path: &str, bytes: &[u8]) {
    let mut reader: &[u8] = bytes;
    driver
        .put_file(
            &FileRef::new(repo, commit, path),
            Delimiter::None,
            &mut reader,
        )
        .await
        .unwrap();
}

/// Reads the whole file at `(repo, commit, path)`.
pub async fn get(driver: &Driver, repo: &str, commit: &str, path: &str) -> Vec<u8> {
    driver
        .get_file(&FileRef::new(repo, commit, path), None, 0, None, None)
        .await
        .unwrap()
        .read_to_end()
        .await
        .unwrap()
}

/// One finished commit on `branch` writing `path` = `bytes`; returns the
/// canonical commit id.
#[allow(dead_code)]
pub async fn commit_file(
    driver: &Driver,
    repo: &str,
    branch: &str,
    path: &str,
    bytes: &[u8],
) -> String {
    let id = driver
        .start_commit(repo, None, Some(branch), Vec::new())
        .await
        .unwrap();
    put(driver, repo, &id, path, bytes).await;
    driver.finish_commit(repo, &id, false).await.unwrap();
    id
}
