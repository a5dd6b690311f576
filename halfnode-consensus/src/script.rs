//! The script-signature verification seam.

use halfnode_chain::transaction::Transaction;

/// Verifies that an input of `tx` is authorized to spend an output of
/// `prev_tx`.
///
/// The chain database calls this once per non-coinbase input while
/// connecting a block (and while admitting transactions to the mempool),
/// after it has resolved the input's previous transaction. Implementations
/// carry whatever script machinery they want; the half-node itself ships
/// only [`AcceptAll`].
pub trait ScriptVerifier: Send + Sync {
    fn verify_signature(&self, prev_tx: &Transaction, tx: &Transaction, input_index: usize)
        -> bool;
}

/// A verifier that accepts every signature.
pub struct AcceptAll;

impl ScriptVerifier for AcceptAll {
    fn verify_signature(&self, _: &Transaction, _: &Transaction, _: usize) -> bool {
        true
    }
}
