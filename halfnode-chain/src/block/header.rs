use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cached::Cached;
use crate::work::difficulty::CompactDifficulty;

use super::{merkle, Hash};

/// A block header, containing metadata about a block.
///
/// Blocks are chained together via the backwards reference (previous header
/// hash) present in the block header. Each block points backwards to its
/// parent, all the way back to the genesis block.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// The block's version field.
    pub version: u32,

    /// The hash of the previous block, linking this block into a chain.
    ///
    /// All zeroes for a block with no predecessor.
    pub previous_block_hash: Hash,

    /// The root of the transaction merkle tree, binding the header to the
    /// block body.
    pub merkle_root: merkle::Root,

    /// Unix epoch time at which the miner started hashing the header
    /// (according to the miner).
    pub time: DateTime<Utc>,

    /// Compact encoding of the target threshold this header's hash must not
    /// exceed, in the nBits format.
    pub difficulty_threshold: CompactDifficulty,

    /// Miner-chosen field used to search for a hash under the target.
    pub nonce: u32,

    /// The header's own hash, cached on deserialization.
    /// Not part of the consensus serialization.
    hash: Cached<Hash>,
}

impl Header {
    /// Length of a serialized header in bytes.
    pub const fn len() -> usize {
        80
    }

    pub fn new(
        version: u32,
        previous_block_hash: Hash,
        merkle_root: merkle::Root,
        time: DateTime<Utc>,
        difficulty_threshold: CompactDifficulty,
        nonce: u32,
    ) -> Header {
        Header {
            version,
            previous_block_hash,
            merkle_root,
            time,
            difficulty_threshold,
            nonce,
            hash: Cached::new(),
        }
    }

    /// The hash of this header, from the cache when possible.
    pub fn hash(&self) -> Hash {
        match self.hash.value() {
            Some(hash) => hash,
            None => Hash::from(self),
        }
    }

    pub(super) fn with_cached_hash(mut self, hash: Hash) -> Header {
        self.hash = Cached::from(hash);
        self
    }
}
