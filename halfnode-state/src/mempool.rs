//! The pool of validated, unconfirmed transactions.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use halfnode_chain::transaction::{self, Transaction};
use halfnode_consensus::transaction::check;

/// Unconfirmed transactions keyed by hash.
///
/// The pool enforces only the context-free checks; whether a transaction's
/// inputs exist and verify is the chain database's business before it hands
/// a transaction over (see `ChainDb::puttx`).
#[derive(Default)]
pub struct MemPool {
    pool: HashMap<transaction::Hash, Arc<Transaction>>,
}

impl MemPool {
    pub fn new() -> MemPool {
        MemPool {
            pool: HashMap::new(),
        }
    }

    /// Admit a transaction. Duplicates and structurally invalid
    /// transactions are refused.
    pub fn add(&mut self, tx: Arc<Transaction>) -> bool {
        let hash = tx.hash();

        if self.pool.contains_key(&hash) {
            info!(tx = %hash, "mempool: already known");
            return false;
        }
        if let Err(err) = check::transaction_is_valid(&tx) {
            info!(tx = %hash, %err, "mempool: invalid transaction");
            return false;
        }

        self.pool.insert(hash, tx);
        info!(tx = %hash, poolsz = self.pool.len(), "mempool: added");
        true
    }

    /// Remove a transaction, reporting whether it was present.
    pub fn remove(&mut self, hash: &transaction::Hash) -> bool {
        self.pool.remove(hash).is_some()
    }

    pub fn size(&self) -> usize {
        self.pool.len()
    }

    pub fn contains(&self, hash: &transaction::Hash) -> bool {
        self.pool.contains_key(hash)
    }

    pub fn get(&self, hash: &transaction::Hash) -> Option<Arc<Transaction>> {
        self.pool.get(hash).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&transaction::Hash, &Arc<Transaction>)> {
        self.pool.iter()
    }
}
