//! Wire-format impls for inputs, outputs, and outpoints.

use std::io::{self, Read};

use crate::amount::Amount;
use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use crate::transaction;

use super::{CoinbaseData, Input, OutPoint, Output, Script};

impl BitcoinSerialize for OutPoint {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.hash.bitcoin_serialize(&mut target)?;
        self.index.bitcoin_serialize(&mut target)
    }
}

impl BitcoinDeserialize for OutPoint {
    fn bitcoin_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(OutPoint {
            hash: transaction::Hash::bitcoin_deserialize(&mut reader)?,
            index: u32::bitcoin_deserialize(&mut reader)?,
        })
    }
}

impl BitcoinSerialize for Input {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        match self {
            Input::PrevOut {
                outpoint,
                unlock_script,
                sequence,
            } => {
                outpoint.bitcoin_serialize(&mut target)?;
                unlock_script.bitcoin_serialize(&mut target)?;
                sequence.bitcoin_serialize(&mut target)
            }
            Input::Coinbase { data, sequence } => {
                OutPoint::null().bitcoin_serialize(&mut target)?;
                data.0.bitcoin_serialize(&mut target)?;
                sequence.bitcoin_serialize(&mut target)
            }
        }
    }
}

/// An input with a null outpoint is a coinbase; anything else is a spend.
impl BitcoinDeserialize for Input {
    fn bitcoin_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let outpoint = OutPoint::bitcoin_deserialize(&mut reader)?;
        let script = Script::bitcoin_deserialize(&mut reader)?;
        let sequence = u32::bitcoin_deserialize(&mut reader)?;

        if outpoint.is_null() {
            Ok(Input::Coinbase {
                data: CoinbaseData(script.0),
                sequence,
            })
        } else {
            Ok(Input::PrevOut {
                outpoint,
                unlock_script: script,
                sequence,
            })
        }
    }
}

impl BitcoinSerialize for Output {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        self.value.bitcoin_serialize(&mut target)?;
        self.lock_script.bitcoin_serialize(&mut target)
    }
}

impl BitcoinDeserialize for Output {
    fn bitcoin_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Output {
            value: Amount::bitcoin_deserialize(&mut reader)?,
            lock_script: Script::bitcoin_deserialize(&mut reader)?,
        })
    }
}
