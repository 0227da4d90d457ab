#![warn(missing_docs)]

//! riverfs block store surface: the client trait the core consumes, plus an
//! in-memory content-addressed implementation for tests and local use.
//!
//! The core never reimplements block storage. It streams bytes through
//! [`BlockStore::put_block`] and receives ordered [`BlockRef`]s pointing
//! into content-addressed blocks; reads walk those refs through
//! [`BlockStore::get_block`]. Shard predicates filter refs at read time.

pub mod delimiter;
pub mod error;
pub mod shard;
pub mod store;

pub use delimiter::Delimiter;
pub use error::{BlockError, BlockResult};
pub use shard::{block_in_shard, file_in_shard, Shard};
pub use store::{BlockRef, BlockStore, MemBlockStore, MemBlockStoreConfig, MemBlockStoreStats};
