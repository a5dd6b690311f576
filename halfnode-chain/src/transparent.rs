//! Transparent value transfer: inputs, outputs, and outpoints.

mod script;
mod serialize;

pub use script::Script;

use crate::amount::Amount;
use crate::compactint::CompactInt;
use crate::transaction;

/// Arbitrary data inserted by miners into a coinbase transaction.
///
/// Occupies the position a spending script would in a normal input; its
/// contents carry no consensus meaning here.
#[derive(Clone, Eq, PartialEq)]
pub struct CoinbaseData(pub Vec<u8>);

impl AsRef<[u8]> for CoinbaseData {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl CoinbaseData {
    pub fn serialized_size(&self) -> usize {
        CompactInt::size(self.0.len()) + self.0.len()
    }
}

impl std::fmt::Debug for CoinbaseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let escaped = String::from_utf8(
            self.0
                .iter()
                .cloned()
                .flat_map(std::ascii::escape_default)
                .collect(),
        )
        .expect("ascii::escape_default produces utf8");
        f.debug_tuple("CoinbaseData").field(&escaped).finish()
    }
}

/// A reference to a particular output of a particular transaction.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct OutPoint {
    /// The transaction that created the output being spent.
    pub hash: transaction::Hash,

    /// The index of the output within that transaction; the first output
    /// is 0.
    pub index: u32,
}

impl OutPoint {
    /// The serialized width of an outpoint in bytes.
    #[inline]
    pub const fn len() -> usize {
        36
    }

    /// The outpoint a coinbase input carries: no real predecessor.
    pub fn null() -> OutPoint {
        OutPoint {
            hash: transaction::Hash([0; 32]),
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.hash.0 == [0; 32] && self.index == u32::MAX
    }
}

/// A transparent input to a transaction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Input {
    /// A spend of an output of a previous transaction.
    PrevOut {
        /// The output being consumed.
        outpoint: OutPoint,
        /// The script that authorizes spending `outpoint`.
        unlock_script: Script,
        /// The sequence number for the input.
        sequence: u32,
    },
    /// New coins created by the block reward.
    Coinbase {
        /// Free data inserted by the miner.
        data: CoinbaseData,
        /// The sequence number for the input.
        sequence: u32,
    },
}

impl Input {
    pub fn sequence(&self) -> u32 {
        match self {
            Input::PrevOut { sequence, .. } => *sequence,
            Input::Coinbase { sequence, .. } => *sequence,
        }
    }

    /// The serialized length (in bytes) of this input.
    pub fn len(&self) -> usize {
        match self {
            Input::PrevOut { unlock_script, .. } => {
                OutPoint::len() + unlock_script.serialized_size() + 4
            }
            // a coinbase still serializes the 36-byte null outpoint
            Input::Coinbase { data, .. } => OutPoint::len() + data.serialized_size() + 4,
        }
    }
}

/// A transparent output of a transaction.
///
/// Every coin in the system is an unspent one of these; outputs are
/// indivisible and consumed in their entirety by a later input.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Output {
    /// Output value.
    pub value: Amount,

    /// The lock script defines the conditions under which this output can
    /// be spent.
    pub lock_script: Script,
}

impl Output {
    /// The serialized length (in bytes) of this output.
    pub fn len(&self) -> usize {
        8 + self.lock_script.serialized_size()
    }
}
