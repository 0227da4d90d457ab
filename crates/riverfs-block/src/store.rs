//! The block store client trait and an in-memory implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::delimiter::{split_ranges, Delimiter};
use crate::error::{BlockError, BlockResult};

/// A reference to a byte range inside a content-addressed block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    /// Content address of the block.
    pub hash: String,
    /// Start offset of the range within the block, inclusive.
    pub lower: u64,
    /// End offset of the range within the block, exclusive.
    pub upper: u64,
}

impl BlockRef {
    /// Number of bytes the reference covers.
    pub fn size(&self) -> u64 {
        self.upper.saturating_sub(self.lower)
    }
}

/// Client interface to the block store service.
///
/// The store is stateless from the caller's perspective and concurrent
/// uploads are safe: blocks are content-addressed, so the same bytes land
/// on the same hash no matter who writes them.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Ingests a byte stream, cutting it into blocks at delimiter
    /// boundaries, and returns ordered refs covering the stream.
    async fn put_block(
        &self,
        delimiter: Delimiter,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> BlockResult<Vec<BlockRef>>;

    /// Reads from a block starting at `offset` within it, returning at most
    /// `size` bytes (all remaining bytes if `size` is `None`).
    async fn get_block(&self, hash: &str, offset: u64, size: Option<u64>)
        -> BlockResult<Vec<u8>>;
}

/// Configuration for [`MemBlockStore`].
#[derive(Clone, Copy, Debug)]
pub struct MemBlockStoreConfig {
    /// Target block size in bytes; records larger than this become
    /// oversized blocks of their own.
    pub target_block_bytes: usize,
}

impl Default for MemBlockStoreConfig {
    fn default() -> Self {
        Self {
            // 8 MiB, the conventional chunk size for pipeline data
            target_block_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Operation counters for the in-memory store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemBlockStoreStats {
    /// Number of put_block calls.
    pub puts: u64,
    /// Number of get_block calls.
    pub gets: u64,
    /// Blocks whose content was already present.
    pub dedup_hits: u64,
    /// Total distinct bytes stored.
    pub bytes_stored: u64,
}

/// In-memory content-addressed block store.
///
/// Blocks are keyed by the hex SHA-256 of their content, so identical
/// chunks written by different commits share storage.
pub struct MemBlockStore {
    config: MemBlockStoreConfig,
    blocks: Mutex<HashMap<String, Vec<u8>>>,
    stats: Mutex<MemBlockStoreStats>,
}

impl MemBlockStore {
    /// Creates an empty store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(MemBlockStoreConfig::default())
    }

    /// Creates an empty store with the given configuration.
    pub fn with_config(config: MemBlockStoreConfig) -> Self {
        Self {
            config,
            blocks: Mutex::new(HashMap::new()),
            stats: Mutex::new(MemBlockStoreStats::default()),
        }
    }

    /// Returns a snapshot of the operation counters.
    pub fn stats(&self) -> MemBlockStoreStats {
        self.stats.lock().expect("lock poisoned").clone()
    }

    /// Number of distinct blocks currently stored.
    pub fn block_count(&self) -> usize {
        self.blocks.lock().expect("lock poisoned").len()
    }
}

impl Default for MemBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockStore for MemBlockStore {
    async fn put_block(
        &self,
        delimiter: Delimiter,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> BlockResult<Vec<BlockRef>> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;

        let ranges = split_ranges(delimiter, &data, self.config.target_block_bytes);
        let mut refs = Vec::with_capacity(ranges.len());
        let mut blocks = self.blocks.lock().expect("lock poisoned");
        let mut stats = self.stats.lock().expect("lock poisoned");
        stats.puts += 1;
        for (lo, hi) in ranges {
            let chunk = &data[lo..hi];
            let hash = hex::encode(Sha256::digest(chunk));
            if blocks.contains_key(&hash) {
                stats.dedup_hits += 1;
            } else {
                stats.bytes_stored += chunk.len() as u64;
                blocks.insert(hash.clone(), chunk.to_vec());
            }
            refs.push(BlockRef {
                hash,
                lower: 0,
                upper: (hi - lo) as u64,
            });
        }
        debug!("put_block: {} bytes in {} refs", data.len(), refs.len());
        Ok(refs)
    }

    async fn get_block(
        &self,
        hash: &str,
        offset: u64,
        size: Option<u64>,
    ) -> BlockResult<Vec<u8>> {
        let blocks = self.blocks.lock().expect("lock poisoned");
        let block = blocks
            .get(hash)
            .ok_or_else(|| BlockError::BlockNotFound(hash.to_string()))?;
        self.stats.lock().expect("lock poisoned").gets += 1;
        let start = (offset as usize).min(block.len());
        let end = match size {
            Some(size) => (start + size as usize).min(block.len()),
            None => block.len(),
        };
        Ok(block[start..end].to_vec())
    }
}
