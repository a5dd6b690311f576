//! The Bitcoin variable-length integer encoding ("CompactSize").

use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use byteorder::{LittleEndian, WriteBytesExt};

/// A length or count in Bitcoin's variable-width wire encoding.
///
/// Values below 253 occupy a single byte; larger values get a one-byte
/// marker followed by a 2-, 4-, or 8-byte little-endian integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactInt(u64);

impl CompactInt {
    pub fn from(value: usize) -> CompactInt {
        CompactInt(value as u64)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The encoded width, in bytes, of `value`.
    pub fn size(value: usize) -> usize {
        if value < 253 {
            1
        } else if value <= u16::MAX as usize {
            3
        } else if value <= u32::MAX as usize {
            5
        } else {
            9
        }
    }
}

impl BitcoinSerialize for CompactInt {
    fn bitcoin_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        if self.0 < 253 {
            target.write_all(&[self.0 as u8])
        } else if self.0 <= u16::MAX as u64 {
            target.write_all(&[253])?;
            target.write_u16::<LittleEndian>(self.0 as u16)
        } else if self.0 <= u32::MAX as u64 {
            target.write_all(&[254])?;
            target.write_u32::<LittleEndian>(self.0 as u32)
        } else {
            target.write_all(&[255])?;
            target.write_u64::<LittleEndian>(self.0)
        }
    }
}

impl BitcoinDeserialize for CompactInt {
    fn bitcoin_deserialize<R: std::io::Read>(
        mut reader: R,
    ) -> Result<CompactInt, SerializationError> {
        let marker = u8::bitcoin_deserialize(&mut reader)?;
        let value = match marker {
            0..=252 => marker as u64,
            253 => u16::bitcoin_deserialize(&mut reader)? as u64,
            254 => u32::bitcoin_deserialize(&mut reader)? as u64,
            255 => u64::bitcoin_deserialize(&mut reader)?,
        };
        Ok(CompactInt(value))
    }
}
