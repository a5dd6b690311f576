//! Network parameters.

use serde::{Deserialize, Serialize};

use crate::block;

/// The previous block hash for the first block of every chain.
///
/// All known networks use the Bitcoin `null` value (all zeroes) for the
/// parent of the genesis block.
pub const GENESIS_PREVIOUS_BLOCK_HASH: block::Hash = block::Hash([0; 32]);

/// An all-network enumeration of the chains this node can follow.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// The production Bitcoin network.
    Mainnet,
    /// The Bitcoin test network.
    Testnet,
}

impl Network {
    /// The message-start magic bytes that frame every wire message and
    /// every block stored on disk for this network.
    pub fn magic(self) -> Magic {
        match self {
            Network::Mainnet => Magic([0xf9, 0xbe, 0xb4, 0xd9]),
            Network::Testnet => Magic([0x0b, 0x11, 0x09, 0x07]),
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

/// The 4-byte network magic.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Magic(pub [u8; 4]);

impl std::fmt::Debug for Magic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("Magic").field(&hex::encode(&self.0)).finish()
    }
}
