//! On-disk record formats for the key-value index.
//!
//! All records are ASCII: hashes in display-order hex, integers in decimal,
//! big numbers in `0x`-prefixed hex. The formats are stable; they are what
//! lives on disk.

use bitvec::prelude::*;
use primitive_types::U256;

use halfnode_chain::block;

use crate::error::StoreError;

/// Output indexes at or above this bound are never tested or recorded.
pub const MAX_OUTPUT_INDEX: u32 = 100_000;

/// A bitmap over a transaction's outputs: bit n set means output n has been
/// spent on the current best chain.
#[derive(Clone, Debug, Default)]
pub struct SpentMask(BitVec<Lsb0, u8>);

impl SpentMask {
    pub fn new() -> SpentMask {
        SpentMask(BitVec::new())
    }

    pub fn is_set(&self, index: u32) -> bool {
        self.0.get(index as usize).copied().unwrap_or(false)
    }

    pub fn set(&mut self, index: u32) {
        debug_assert!(index < MAX_OUTPUT_INDEX);
        let index = index as usize;
        if index >= self.0.len() {
            self.0.resize(index + 1, false);
        }
        self.0.set(index, true);
    }

    pub fn clear(&mut self, index: u32) {
        let index = index as usize;
        if index < self.0.len() {
            self.0.set(index, false);
        }
    }

    /// Render the mask as a hex integer whose bit n is output n.
    pub fn to_hex(&self) -> String {
        let mut bytes = vec![0u8; (self.0.len() + 7) / 8];
        for (position, bit) in self.0.iter().enumerate() {
            if *bit {
                bytes[position / 8] |= 1 << (position % 8);
            }
        }
        let top = match bytes.iter().rposition(|byte| *byte != 0) {
            None => return "0x0".to_string(),
            Some(top) => top,
        };
        let mut out = format!("0x{:x}", bytes[top]);
        for byte in bytes[..top].iter().rev() {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }

    pub fn from_hex(s: &str) -> Result<SpentMask, StoreError> {
        let digits = s.trim().trim_start_matches("0x");
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StoreError::BadRecord("spent mask is not hex"));
        }
        let padded = if digits.len() % 2 == 1 {
            format!("0{}", digits)
        } else {
            digits.to_string()
        };
        let mut bytes =
            hex::decode(&padded).map_err(|_| StoreError::BadRecord("spent mask is not hex"))?;
        bytes.reverse();
        Ok(SpentMask(BitVec::from_vec(bytes)))
    }
}

/// Per-transaction index record: the block a transaction was confirmed in,
/// plus its spent-output mask.
#[derive(Clone, Debug)]
pub struct TxIdx {
    pub blkhash: block::Hash,
    pub spentmask: SpentMask,
}

impl TxIdx {
    pub fn new(blkhash: block::Hash) -> TxIdx {
        TxIdx {
            blkhash,
            spentmask: SpentMask::new(),
        }
    }

    pub fn serialize(&self) -> String {
        format!("{} {}", self.blkhash, self.spentmask.to_hex())
    }

    pub fn deserialize(s: &str) -> Result<TxIdx, StoreError> {
        let mut parts = s.split_whitespace();
        let blkhash = parts
            .next()
            .ok_or(StoreError::BadRecord("tx record missing block hash"))?
            .parse()
            .map_err(|_| StoreError::BadRecord("tx record block hash is not a hash"))?;
        let spentmask = SpentMask::from_hex(
            parts
                .next()
                .ok_or(StoreError::BadRecord("tx record missing spent mask"))?,
        )?;
        Ok(TxIdx { blkhash, spentmask })
    }
}

/// Per-block metadata: height and cumulative chain work through this block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlkMeta {
    pub height: i64,
    pub work: U256,
}

impl BlkMeta {
    pub fn serialize(&self) -> String {
        format!("{} 0x{:x}", self.height, self.work)
    }

    pub fn deserialize(s: &str) -> Result<BlkMeta, StoreError> {
        let mut parts = s.split_whitespace();
        let height = parts
            .next()
            .ok_or(StoreError::BadRecord("block meta missing height"))?
            .parse()
            .map_err(|_| StoreError::BadRecord("block meta height is not a number"))?;
        let work_digits = parts
            .next()
            .ok_or(StoreError::BadRecord("block meta missing work"))?
            .trim_start_matches("0x");
        let work = U256::from_str_radix(work_digits, 16)
            .map_err(|_| StoreError::BadRecord("block meta work is not hex"))?;
        Ok(BlkMeta { height, work })
    }
}

/// The roster of block hashes known at one height: the best-chain block,
/// losing siblings, and formerly-orphaned relatives alike.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HeightIdx {
    pub blocks: Vec<block::Hash>,
}

impl HeightIdx {
    pub fn serialize(&self) -> String {
        let hex: Vec<String> = self.blocks.iter().map(|hash| hash.to_string()).collect();
        hex.join(" ")
    }

    pub fn deserialize(s: &str) -> Result<HeightIdx, StoreError> {
        let mut blocks = Vec::new();
        for word in s.split_whitespace() {
            blocks.push(
                word.parse()
                    .map_err(|_| StoreError::BadRecord("height roster entry is not a hash"))?,
            );
        }
        Ok(HeightIdx { blocks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spent_mask_set_clear() {
        let mut mask = SpentMask::new();
        assert!(!mask.is_set(0));

        mask.set(0);
        mask.set(9);
        assert!(mask.is_set(0));
        assert!(mask.is_set(9));
        assert!(!mask.is_set(5));

        mask.clear(0);
        assert!(!mask.is_set(0));
        assert!(mask.is_set(9));

        // clearing beyond the mask is a no-op
        mask.clear(1_000);
    }

    #[test]
    fn spent_mask_hex_roundtrip() {
        let mut mask = SpentMask::new();
        assert_eq!(mask.to_hex(), "0x0");

        mask.set(0);
        assert_eq!(mask.to_hex(), "0x1");

        mask.set(9);
        // 2^9 + 2^0
        assert_eq!(mask.to_hex(), "0x201");

        let parsed = SpentMask::from_hex("0x201").unwrap();
        assert!(parsed.is_set(0));
        assert!(parsed.is_set(9));
        assert!(!parsed.is_set(1));
        assert_eq!(parsed.to_hex(), "0x201");
    }

    #[test]
    fn spent_mask_survives_high_bits() {
        let mut mask = SpentMask::new();
        mask.set(99_999);
        let roundtrip = SpentMask::from_hex(&mask.to_hex()).unwrap();
        assert!(roundtrip.is_set(99_999));
        assert!(!roundtrip.is_set(99_998));
    }

    #[test]
    fn blkmeta_roundtrip() {
        let meta = BlkMeta {
            height: 1234,
            work: U256::from(0xdead_beefu64) << 64,
        };
        let parsed = BlkMeta::deserialize(&meta.serialize()).unwrap();
        assert_eq!(parsed, meta);

        // the empty-chain sentinel
        let zero = BlkMeta {
            height: -1,
            work: U256::zero(),
        };
        assert_eq!(zero.serialize(), "-1 0x0");
        assert_eq!(BlkMeta::deserialize("-1 0x0").unwrap(), zero);
    }

    #[test]
    fn heightidx_roundtrip() {
        let idx = HeightIdx {
            blocks: vec![block::Hash([1; 32]), block::Hash([2; 32])],
        };
        let parsed = HeightIdx::deserialize(&idx.serialize()).unwrap();
        assert_eq!(parsed, idx);

        assert_eq!(HeightIdx::deserialize("").unwrap(), HeightIdx::default());
    }

    #[test]
    fn txidx_roundtrip() {
        let mut txidx = TxIdx::new(block::Hash([7; 32]));
        txidx.spentmask.set(2);

        let parsed = TxIdx::deserialize(&txidx.serialize()).unwrap();
        assert_eq!(parsed.blkhash, txidx.blkhash);
        assert!(parsed.spentmask.is_set(2));
        assert!(!parsed.spentmask.is_set(0));
    }

    #[test]
    fn malformed_records_are_rejected() {
        assert!(BlkMeta::deserialize("only-height").is_err());
        assert!(BlkMeta::deserialize("12 zz").is_err());
        assert!(TxIdx::deserialize("deadbeef").is_err());
        assert!(SpentMask::from_hex("").is_err());
        assert!(HeightIdx::deserialize("not-a-hash").is_err());
    }
}
