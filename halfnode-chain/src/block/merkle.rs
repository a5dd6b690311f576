//! The Bitcoin transaction merkle tree.

use std::{fmt, io, io::Write, iter::FromIterator};

use serde::{Deserialize, Serialize};

use crate::serialization::{sha256d, BitcoinDeserialize, BitcoinSerialize, SerializationError};
use crate::transaction;

/// The root of the transaction merkle tree.
///
/// Because of a flaw inherited from Bitcoin's design, the root does not
/// always precisely bind the block contents (CVE-2012-2459): a level with an
/// odd number of nodes hashes its last entry against itself, so certain
/// duplicate-transaction layouts collide. Callers must reject blocks with
/// duplicate transactions separately.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Root(pub [u8; 32]);

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.debug_tuple("merkle::Root")
            .field(&hex::encode(&reversed_bytes))
            .finish()
    }
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut writer = sha256d::Writer::default();
    writer
        .write_all(left)
        .and_then(|_| writer.write_all(right))
        .expect("Sha256dWriter is infallible");
    writer.finish()
}

impl FromIterator<transaction::Hash> for Root {
    fn from_iter<I>(hashes: I) -> Self
    where
        I: IntoIterator<Item = transaction::Hash>,
    {
        let mut level: Vec<[u8; 32]> = hashes.into_iter().map(|hash| hash.0).collect();
        if level.is_empty() {
            return Root([0; 32]);
        }
        while level.len() > 1 {
            if level.len() % 2 == 1 {
                // odd levels hash their last node against itself
                let last = *level.last().expect("level is non-empty");
                level.push(last);
            }
            level = level
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
        }
        Root(level[0])
    }
}

impl BitcoinSerialize for Root {
    fn bitcoin_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(target)
    }
}

impl BitcoinDeserialize for Root {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Root(<[u8; 32]>::bitcoin_deserialize(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx_hash(byte: u8) -> transaction::Hash {
        transaction::Hash([byte; 32])
    }

    #[test]
    fn single_hash_is_its_own_root() {
        let root = Root::from_iter(vec![tx_hash(7)]);
        assert_eq!(root.0, [7; 32]);
    }

    #[test]
    fn pair_root_is_order_sensitive() {
        let forward = Root::from_iter(vec![tx_hash(1), tx_hash(2)]);
        let backward = Root::from_iter(vec![tx_hash(2), tx_hash(1)]);
        assert_ne!(forward, backward);
    }

    #[test]
    fn odd_level_duplicates_last_node() {
        // With three leaves the last is paired with itself, so the roots of
        // [a, b, c] and [a, b, c, c] collide.
        let three = Root::from_iter(vec![tx_hash(1), tx_hash(2), tx_hash(3)]);
        let four = Root::from_iter(vec![tx_hash(1), tx_hash(2), tx_hash(3), tx_hash(3)]);
        assert_eq!(three, four);
    }
}
