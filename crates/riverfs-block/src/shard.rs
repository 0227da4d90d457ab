//! Shard predicates: which files and blocks a given reader serves.
//!
//! The sharding layer decides placement elsewhere; the core only filters
//! block refs at read time with these predicates. Hashing is SHA-256
//! based so every process agrees on the assignment.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A reader's slice of the keyspace. A modulus of zero disables that
/// dimension of filtering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// This reader's file bucket.
    pub file_number: u64,
    /// Total file buckets; 0 means no file filtering.
    pub file_modulus: u64,
    /// This reader's block bucket.
    pub block_number: u64,
    /// Total block buckets; 0 means no block filtering.
    pub block_modulus: u64,
}

/// True if the file at `path` belongs to the filter shard.
pub fn file_in_shard(filter: Option<&Shard>, path: &str) -> bool {
    match filter {
        Some(shard) if shard.file_modulus > 0 => {
            shard_hash(path.as_bytes()) % shard.file_modulus == shard.file_number
        }
        _ => true,
    }
}

/// True if a block of the file at `path` belongs to the filter shard.
///
/// An empty file has no blocks; passing `None` for the hash assigns the
/// file itself to exactly one block bucket so that one shard reports it.
pub fn block_in_shard(filter: Option<&Shard>, path: &str, block_hash: Option<&str>) -> bool {
    match filter {
        Some(shard) if shard.block_modulus > 0 => {
            let hashed = match block_hash {
                Some(hash) => shard_hash(hash.as_bytes()),
                None => shard_hash(path.as_bytes()),
            };
            hashed % shard.block_modulus == shard.block_number
        }
        _ => true,
    }
}

fn shard_hash(bytes: &[u8]) -> u64 {
    let digest = Sha256::digest(bytes);
    u64::from_be_bytes(digest[..8].try_into().expect("digest shorter than 8 bytes"))
}
