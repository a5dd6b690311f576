use std::io;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::block::Height;
use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// The earliest point a transaction may be added to the chain.
///
/// The raw `nLockTime` field is a u32 interpreted as a block height below
/// [`LockTime::MIN_TIMESTAMP`], and as a Unix timestamp at or above it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum LockTime {
    /// Unlocked at or after this block height.
    Height(Height),
    /// Unlocked at or after this time.
    Time(DateTime<Utc>),
}

impl LockTime {
    /// Raw values at or above this threshold are timestamps, not heights.
    pub const MIN_TIMESTAMP: u32 = 500_000_000;

    /// The lock time of a transaction with no lock at all.
    pub fn unlocked() -> LockTime {
        LockTime::Height(Height(0))
    }
}

impl BitcoinSerialize for LockTime {
    fn bitcoin_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error> {
        match self {
            LockTime::Height(height) => height.0.bitcoin_serialize(target),
            LockTime::Time(time) => time.bitcoin_serialize(target),
        }
    }
}

impl BitcoinDeserialize for LockTime {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        let raw = u32::bitcoin_deserialize(reader)?;
        if raw < LockTime::MIN_TIMESTAMP {
            Ok(LockTime::Height(Height(raw)))
        } else {
            Ok(LockTime::Time(Utc.timestamp(raw as i64, 0)))
        }
    }
}
