//! Consensus-critical serialization.
//!
//! `BitcoinSerialize` and `BitcoinDeserialize` are analogs of the Serde
//! `Serialize` and `Deserialize` traits, but target the Bitcoin wire
//! encoding: little-endian integers, CompactInt length prefixes, and
//! raw byte arrays. Anything that crosses the wire or the block file
//! goes through these traits so the on-disk bytes stay canonical.

mod deserialize;
mod error;

pub mod sha256d;

pub use deserialize::{BitcoinDeserialize, BitcoinDeserializeInto};
pub use error::SerializationError;

use std::convert::TryFrom;
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{DateTime, Utc};

use crate::compactint::CompactInt;

pub trait BitcoinSerialize {
    fn bitcoin_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error>;

    fn bitcoin_serialize_to_vec(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut data = Vec::new();
        self.bitcoin_serialize(&mut data)?;
        Ok(data)
    }
}

impl BitcoinSerialize for u16 {
    fn bitcoin_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        target.write_u16::<LittleEndian>(*self)
    }
}

impl BitcoinSerialize for u32 {
    fn bitcoin_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        target.write_u32::<LittleEndian>(*self)
    }
}

impl BitcoinSerialize for u64 {
    fn bitcoin_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        target.write_u64::<LittleEndian>(*self)
    }
}

impl BitcoinSerialize for i32 {
    fn bitcoin_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        target.write_i32::<LittleEndian>(*self)
    }
}

impl BitcoinSerialize for i64 {
    fn bitcoin_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        target.write_i64::<LittleEndian>(*self)
    }
}

impl BitcoinSerialize for DateTime<Utc> {
    fn bitcoin_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        // u32 times are valid until 2106; out-of-range times saturate
        let time_u32 = u32::try_from(self.timestamp()).unwrap_or(u32::MAX);
        target.write_u32::<LittleEndian>(time_u32)
    }
}

impl BitcoinSerialize for [u8; 4] {
    fn bitcoin_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        target.write_all(self)
    }
}

impl BitcoinSerialize for [u8; 12] {
    fn bitcoin_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        target.write_all(self)
    }
}

impl BitcoinSerialize for [u8; 32] {
    fn bitcoin_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        target.write_all(self)
    }
}

/// Byte vectors serialize with a CompactInt length prefix.
///
/// Note: there is deliberately no `BitcoinSerialize for u8`, so this does
/// not overlap the generic `Vec<T>` impl below.
impl BitcoinSerialize for Vec<u8> {
    fn bitcoin_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        CompactInt::from(self.len()).bitcoin_serialize(&mut target)?;
        target.write_all(self)
    }
}

impl<T> BitcoinSerialize for Vec<T>
where
    T: BitcoinSerialize,
{
    fn bitcoin_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        CompactInt::from(self.len()).bitcoin_serialize(&mut target)?;
        for item in self.iter() {
            item.bitcoin_serialize(&mut target)?;
        }
        Ok(())
    }
}

impl<T> BitcoinSerialize for Arc<T>
where
    T: BitcoinSerialize,
{
    fn bitcoin_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        T::bitcoin_serialize(self, target)
    }
}
