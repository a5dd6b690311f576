use std::convert::TryInto;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::compactint::CompactInt;
use crate::serialization::{
    sha256d, BitcoinDeserialize, BitcoinSerialize, SerializationError,
};
use crate::transaction::Transaction;
use crate::work::difficulty::CompactDifficulty;

use super::{merkle, Block, Hash, Header};

/// The maximum size of a serialized Bitcoin block, in bytes.
pub const MAX_BLOCK_BYTES: u64 = 4_000_000;

impl BitcoinSerialize for Header {
    fn bitcoin_serialize<W: Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.version.bitcoin_serialize(&mut target)?;
        self.previous_block_hash.bitcoin_serialize(&mut target)?;
        self.merkle_root.bitcoin_serialize(&mut target)?;
        self.time.bitcoin_serialize(&mut target)?;
        self.difficulty_threshold.bitcoin_serialize(&mut target)?;
        self.nonce.bitcoin_serialize(&mut target)
    }
}

/// Deserializes a header, hashing the raw bytes along the way so the hash
/// cache is populated without a round of reserialization.
impl BitcoinDeserialize for Header {
    fn bitcoin_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut raw = [0u8; Header::len()];
        reader.read_exact(&mut raw)?;

        let mut hash_writer = sha256d::Writer::default();
        hash_writer
            .write_all(&raw)
            .expect("Sha256dWriter is infallible");
        let own_hash = Hash(hash_writer.finish());

        let mut src = Cursor::new(&raw[..]);
        let header = Header::new(
            u32::bitcoin_deserialize(&mut src)?,
            Hash::bitcoin_deserialize(&mut src)?,
            merkle::Root::bitcoin_deserialize(&mut src)?,
            <DateTime<Utc>>::bitcoin_deserialize(&mut src)?,
            CompactDifficulty::bitcoin_deserialize(&mut src)?,
            u32::bitcoin_deserialize(&mut src)?,
        );
        Ok(header.with_cached_hash(own_hash))
    }
}

impl BitcoinSerialize for Block {
    fn bitcoin_serialize<W: Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.header.bitcoin_serialize(&mut target)?;
        self.transactions.bitcoin_serialize(&mut target)
    }
}

impl BitcoinDeserialize for Block {
    fn bitcoin_deserialize<R: Read>(reader: R) -> Result<Self, SerializationError> {
        let mut src = reader.take(MAX_BLOCK_BYTES);
        let header = Header::bitcoin_deserialize(&mut src)?;

        let tx_count = CompactInt::bitcoin_deserialize(&mut src)?.value();
        // A transaction needs at least one 36-byte outpoint, so a count
        // beyond this is unsatisfiable and likely hostile.
        if tx_count > MAX_BLOCK_BYTES / 36 {
            return Err(SerializationError::Parse(
                "block claims more transactions than could possibly fit",
            ));
        }
        let mut transactions =
            Vec::with_capacity(tx_count.try_into().expect("count bounded well below usize"));
        for _ in 0..tx_count {
            transactions.push(<Arc<Transaction>>::bitcoin_deserialize(&mut src)?);
        }

        Ok(Block {
            header,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::iter::FromIterator;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::serialization::BitcoinDeserializeInto;
    use crate::transaction::LockTime;
    use crate::transparent;

    fn sample_block() -> Block {
        let coinbase = Transaction::new(
            1,
            vec![transparent::Input::Coinbase {
                data: transparent::CoinbaseData(vec![0x51, 0x51]),
                sequence: u32::MAX,
            }],
            vec![transparent::Output {
                value: crate::amount::Amount(50 * crate::amount::COIN),
                lock_script: transparent::Script(vec![0x51]),
            }],
            LockTime::unlocked(),
        );
        let transactions = vec![Arc::new(coinbase)];
        let merkle_root = merkle::Root::from_iter(transactions.iter().map(|tx| tx.hash()));
        Block {
            header: Header::new(
                1,
                Hash::null(),
                merkle_root,
                Utc.timestamp(1_231_006_505, 0),
                CompactDifficulty(0x207f_ffff),
                42,
            ),
            transactions,
        }
    }

    #[test]
    fn block_roundtrip() {
        let block = sample_block();
        let bytes = block.bitcoin_serialize_to_vec().unwrap();
        assert_eq!(bytes.len(), block.serialized_size());

        let parsed: Block = bytes.as_slice().bitcoin_deserialize_into().unwrap();
        assert_eq!(parsed, block);
        assert_eq!(parsed.hash(), block.hash());
    }

    #[test]
    fn header_hash_is_cached_on_deserialize() {
        let block = sample_block();
        let bytes = block.header.bitcoin_serialize_to_vec().unwrap();
        let parsed: Header = bytes.as_slice().bitcoin_deserialize_into().unwrap();

        // the cached hash must agree with one computed from scratch
        assert_eq!(parsed.hash(), Hash::from(&block.header));
    }

    #[test]
    fn oversized_transaction_count_is_rejected() {
        let block = sample_block();
        let mut bytes = block.header.bitcoin_serialize_to_vec().unwrap();
        // claim 2^32 transactions
        bytes.extend_from_slice(&[0xff, 0, 0, 0, 0, 1, 0, 0, 0]);

        let err = bytes.as_slice().bitcoin_deserialize_into::<Block>();
        assert!(err.is_err());
    }
}
