//! Blocks and block-related structures (heights, headers, merkle roots).

mod hash;
mod header;
mod height;
mod serialize;

pub mod merkle;

use std::{fmt, sync::Arc};

use crate::compactint::CompactInt;
use crate::transaction::Transaction;

pub use hash::Hash;
pub use header::Header;
pub use height::Height;
pub use serialize::MAX_BLOCK_BYTES;

/// A Bitcoin block: a header plus the transactions it commits to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    /// The block header, containing block metadata.
    pub header: Header,
    /// The block transactions.
    pub transactions: Vec<Arc<Transaction>>,
}

impl Block {
    /// Compute the hash of this block.
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// The serialized length (in bytes) of the whole block.
    pub fn serialized_size(&self) -> usize {
        let mut size = Header::len() + CompactInt::size(self.transactions.len());
        for tx in self.transactions.iter() {
            size += tx.len();
        }
        size
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block {{ hash: {} }}", self.hash())
    }
}

impl<'a> From<&'a Block> for Hash {
    fn from(block: &'a Block) -> Hash {
        (&block.header).into()
    }
}
