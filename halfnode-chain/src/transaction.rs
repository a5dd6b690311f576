//! Transactions and transaction-related structures.

mod hash;
mod lock_time;
mod serialize;

pub use hash::Hash;
pub use lock_time::LockTime;
pub use serialize::MAX_TX_SIZE;

use crate::cached::Cached;
use crate::compactint::CompactInt;
use crate::transparent;

/// A Bitcoin transaction. Pre-SegWit encoding only.
///
/// A transaction moves value by consuming outputs of earlier transactions
/// and creating new ones; the block chain is the ledger of these transfers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// The transaction version.
    pub version: i32,
    /// The transaction inputs.
    pub inputs: Vec<transparent::Input>,
    /// The transaction outputs.
    pub outputs: Vec<transparent::Output>,
    /// Earliest block height or time at which this transaction may confirm.
    pub locktime: LockTime,
    hash: Cached<Hash>,
}

impl Transaction {
    pub fn new(
        version: i32,
        inputs: Vec<transparent::Input>,
        outputs: Vec<transparent::Output>,
        locktime: LockTime,
    ) -> Transaction {
        Transaction {
            version,
            inputs,
            outputs,
            locktime,
            hash: Cached::new(),
        }
    }

    /// Get the hash (TxID) of this transaction.
    pub fn hash(&self) -> Hash {
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        Hash::from(self)
    }

    /// Returns `true` if this transaction is a coinbase transaction.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && matches!(
                self.inputs.get(0),
                Some(transparent::Input::Coinbase { .. })
            )
    }

    pub fn contains_coinbase_input(&self) -> bool {
        self.inputs
            .iter()
            .any(|input| matches!(input, transparent::Input::Coinbase { .. }))
    }

    /// Whether this transaction can be mined immediately.
    ///
    /// A transaction with a lock is still final once every input has opted
    /// out of sequence-based replacement.
    pub fn is_final(&self) -> bool {
        if self.locktime == LockTime::unlocked() {
            return true;
        }
        self.inputs.iter().all(|input| input.sequence() == u32::MAX)
    }

    /// The serialized length (in bytes) of this transaction.
    pub fn len(&self) -> usize {
        let mut size = 4 + CompactInt::size(self.inputs.len());
        for input in self.inputs.iter() {
            size += input.len();
        }
        size += CompactInt::size(self.outputs.len());
        for output in self.outputs.iter() {
            size += output.len();
        }
        size + 4
    }
}
