//! Block difficulty targets and accumulated chain work.
//!
//! Targets come off the wire in the 32-bit `nBits` compact form and expand
//! to 256-bit integers for hash comparison. Cumulative chain work is the
//! running sum of per-block work values, compared when choosing between
//! competing chains.

use std::io;

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::block;
use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A difficulty target in the compact `nBits` encoding: a one-byte base-256
/// exponent followed by a three-byte mantissa.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CompactDifficulty(pub u32);

/// A difficulty target expanded to the full 256-bit threshold.
///
/// Comparisons are plain u256 integer comparisons; greater values represent
/// *easier* targets.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct ExpandedDifficulty(U256);

impl CompactDifficulty {
    const SIGN_BIT: u32 = 0x0080_0000;

    /// Expand this target to its 256-bit form.
    ///
    /// Returns `None` for encodings that are negative, zero, or overflow
    /// 256 bits; such targets can never be satisfied.
    pub fn to_expanded(self) -> Option<ExpandedDifficulty> {
        let mantissa = self.0 & 0x007f_ffff;
        let exponent = (self.0 >> 24) as usize;

        if mantissa == 0 || self.0 & Self::SIGN_BIT != 0 {
            return None;
        }

        let target = if exponent <= 3 {
            U256::from(mantissa >> (8 * (3 - exponent)))
        } else {
            let shift = 8 * (exponent - 3);
            let mantissa = U256::from(mantissa);
            if shift > mantissa.leading_zeros() as usize {
                return None;
            }
            mantissa << shift
        };

        if target.is_zero() {
            None
        } else {
            Some(ExpandedDifficulty(target))
        }
    }

    /// The work contributed by a block mined at this target, as accumulated
    /// in block metadata.
    pub fn to_work(self) -> Option<U256> {
        self.to_expanded().map(|expanded| expanded.0)
    }
}

impl ExpandedDifficulty {
    /// Interpret a block hash as a 256-bit integer for target comparison.
    pub fn from_hash(hash: &block::Hash) -> ExpandedDifficulty {
        ExpandedDifficulty(U256::from_little_endian(&hash.0))
    }

    pub fn value(&self) -> U256 {
        self.0
    }
}

impl PartialEq<block::Hash> for ExpandedDifficulty {
    fn eq(&self, other: &block::Hash) -> bool {
        self == &ExpandedDifficulty::from_hash(other)
    }
}

impl PartialOrd<block::Hash> for ExpandedDifficulty {
    fn partial_cmp(&self, other: &block::Hash) -> Option<std::cmp::Ordering> {
        self.partial_cmp(&ExpandedDifficulty::from_hash(other))
    }
}

impl BitcoinSerialize for CompactDifficulty {
    fn bitcoin_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(target)
    }
}

impl BitcoinDeserialize for CompactDifficulty {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(CompactDifficulty(u32::bitcoin_deserialize(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_genesis_target() {
        // 0x1d00ffff expands to 0x00000000ffff << 208
        let expanded = CompactDifficulty(0x1d00_ffff).to_expanded().unwrap();
        assert_eq!(expanded.value(), U256::from(0xffffu64) << 208);
    }

    #[test]
    fn small_exponents_shift_down() {
        let expanded = CompactDifficulty(0x0112_3456).to_expanded().unwrap();
        assert_eq!(expanded.value(), U256::from(0x12u64));
    }

    #[test]
    fn invalid_encodings_are_rejected() {
        // zero mantissa
        assert!(CompactDifficulty(0x1d00_0000).to_expanded().is_none());
        // sign bit set
        assert!(CompactDifficulty(0x1d80_0000).to_expanded().is_none());
        // overflows 256 bits
        assert!(CompactDifficulty(0xff12_3456).to_expanded().is_none());
    }

    #[test]
    fn hash_comparison_uses_integer_order() {
        let target = CompactDifficulty(0x207f_ffff).to_expanded().unwrap();

        // a hash with its top byte clear is below the regtest-style target
        let mut low = [0xffu8; 32];
        low[31] = 0x00;
        assert!(target > block::Hash(low));

        // a hash with the top bit set is above it
        let mut high = [0u8; 32];
        high[31] = 0x80;
        assert!(target < block::Hash(high));
    }
}
