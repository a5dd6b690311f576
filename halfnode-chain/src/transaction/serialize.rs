//! Wire-format impls for transactions.

use std::io::{self, Read};

use crate::cached::Cached;
use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use crate::transparent;

use super::{Hash, LockTime, Transaction};

/// The maximum size of a serialized transaction, in bytes.
pub const MAX_TX_SIZE: u64 = 1_000_000;

impl BitcoinSerialize for Transaction {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.version.bitcoin_serialize(&mut target)?;
        self.inputs.bitcoin_serialize(&mut target)?;
        self.outputs.bitcoin_serialize(&mut target)?;
        self.locktime.bitcoin_serialize(&mut target)
    }
}

/// Deserializes a transaction, calculating and caching its TxID.
impl BitcoinDeserialize for Transaction {
    fn bitcoin_deserialize<R: Read>(src: R) -> Result<Self, SerializationError> {
        let mut src = src.take(MAX_TX_SIZE);
        let mut tx = Transaction {
            version: i32::bitcoin_deserialize(&mut src)?,
            inputs: <Vec<transparent::Input>>::bitcoin_deserialize(&mut src)?,
            outputs: <Vec<transparent::Output>>::bitcoin_deserialize(&mut src)?,
            locktime: LockTime::bitcoin_deserialize(&mut src)?,
            hash: Cached::new(),
        };
        let own_hash = tx.hash();
        tx.hash = Cached::from(own_hash);
        Ok(tx)
    }
}
