//! A reader that walks a file's block refs against the block store.

use std::collections::VecDeque;
use std::sync::Arc;

use riverfs_block::{BlockRef, BlockStore};

use crate::error::{CoreError, CoreResult};

/// Streams a file's bytes by reading its ordered block refs one at a
/// time, skipping whole refs until the requested offset falls inside the
/// next one and stopping once the size limit is exhausted.
pub struct FileReader {
    blocks: Arc<dyn BlockStore>,
    refs: VecDeque<BlockRef>,
    skip: u64,
    remaining: Option<u64>,
}

impl std::fmt::Debug for FileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileReader")
            .field("refs", &self.refs)
            .field("skip", &self.skip)
            .field("remaining", &self.remaining)
            .finish()
    }
}

impl FileReader {
    pub(crate) fn new(
        blocks: Arc<dyn BlockStore>,
        refs: Vec<BlockRef>,
        offset: u64,
        size: Option<u64>,
    ) -> Self {
        Self {
            blocks,
            refs: refs.into(),
            skip: offset,
            remaining: size,
        }
    }

    /// The next run of bytes, or `None` at end of file.
    pub async fn next_chunk(&mut self) -> CoreResult<Option<Vec<u8>>> {
        loop {
            if self.remaining == Some(0) {
                return Ok(None);
            }
            let Some(block_ref) = self.refs.pop_front() else {
                return Ok(None);
            };
            let ref_size = block_ref.size();
            if self.skip >= ref_size {
                self.skip -= ref_size;
                continue;
            }
            let offset = block_ref.lower + self.skip;
            let available = ref_size - self.skip;
            self.skip = 0;
            let want = match self.remaining {
                Some(remaining) => remaining.min(available),
                None => available,
            };
            let data = self
                .blocks
                .get_block(&block_ref.hash, offset, Some(want))
                .await?;
            if data.len() as u64 > want {
                return Err(CoreError::ReadOverrun);
            }
            if let Some(remaining) = &mut self.remaining {
                *remaining -= data.len() as u64;
            }
            if data.is_empty() {
                continue;
            }
            return Ok(Some(data));
        }
    }

    /// Drains the reader into one buffer.
    pub async fn read_to_end(&mut self) -> CoreResult<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            out.extend(chunk);
        }
        Ok(out)
    }
}
