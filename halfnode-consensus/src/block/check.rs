//! Context-free block checks.

use std::collections::HashSet;
use std::iter::FromIterator;

use chrono::{DateTime, Duration, Utc};

use halfnode_chain::block::{merkle, Block, Header};
use halfnode_chain::transaction;
use halfnode_chain::work::difficulty::ExpandedDifficulty;

use crate::error::{BlockError, TransactionError};
use crate::transaction::check as tx_check;

/// Returns `Ok(())` if there is exactly one coinbase transaction in `block`,
/// and that coinbase transaction is the first transaction in the block.
pub fn coinbase_is_first(block: &Block) -> Result<(), BlockError> {
    let first = block
        .transactions
        .get(0)
        .ok_or(BlockError::NoTransactions)?;
    if !first.is_coinbase() {
        return Err(BlockError::CoinbasePosition);
    }
    let mut rest = block.transactions.iter().skip(1);
    if rest.any(|tx| tx.contains_coinbase_input()) {
        Err(TransactionError::CoinbaseInputFound)?;
    }
    Ok(())
}

/// Returns `Ok(())` if the header's hash satisfies its own difficulty
/// target.
///
/// The comparison is a u256 integer comparison, like bitcoind's: greater
/// values represent *less* work. There is no chain context here, so this
/// only checks the filter, not whether the target itself is the right one
/// for the block's position.
pub fn difficulty_is_valid(header: &Header) -> Result<(), BlockError> {
    let threshold = header
        .difficulty_threshold
        .to_expanded()
        .ok_or(BlockError::InvalidDifficulty)?;

    let hash = header.hash();
    if ExpandedDifficulty::from_hash(&hash) > threshold {
        return Err(BlockError::DifficultyFilter(hash));
    }
    Ok(())
}

/// Returns `Ok(())` if `header.time` is no more than two hours in the
/// future according to `now`.
///
/// This is a non-deterministic rule: clocks vary between nodes, and a block
/// rejected now may be accepted later.
pub fn time_is_valid_at(header: &Header, now: DateTime<Utc>) -> Result<(), BlockError> {
    let two_hours_ahead = now
        .checked_add_signed(Duration::hours(2))
        .expect("two hours from now fits in a DateTime");
    if header.time <= two_hours_ahead {
        Ok(())
    } else {
        Err(BlockError::TimeTooFarAhead)
    }
}

/// Check merkle root validity.
///
/// `transaction_hashes` is a precomputed list of the block's transaction
/// hashes.
pub fn merkle_root_validity(
    block: &Block,
    transaction_hashes: &[transaction::Hash],
) -> Result<(), BlockError> {
    let merkle_root = merkle::Root::from_iter(transaction_hashes.iter().cloned());

    if block.header.merkle_root != merkle_root {
        return Err(BlockError::BadMerkleRoot {
            actual: merkle_root,
            expected: block.header.merkle_root,
        });
    }

    // The merkle tree is malleable (an odd level hashes its last node
    // against itself), so identical roots do not rule out duplicate
    // transactions. Duplicates imply a double-spend; reject them directly.
    if transaction_hashes.len() != transaction_hashes.iter().map(|h| h.0).collect::<HashSet<_>>().len()
    {
        return Err(BlockError::DuplicateTransaction);
    }

    Ok(())
}

/// Runs the full context-free block suite: structure, per-transaction
/// checks, merkle binding, proof of work, and timestamp sanity.
pub fn block_is_valid(block: &Block, now: DateTime<Utc>) -> Result<(), BlockError> {
    coinbase_is_first(block)?;
    for tx in block.transactions.iter() {
        tx_check::transaction_is_valid(tx)?;
    }
    let hashes: Vec<transaction::Hash> =
        block.transactions.iter().map(|tx| tx.hash()).collect();
    merkle_root_validity(block, &hashes)?;
    difficulty_is_valid(&block.header)?;
    time_is_valid_at(&block.header, now)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use halfnode_chain::amount::{Amount, COIN};
    use halfnode_chain::block::Hash;
    use halfnode_chain::transaction::{LockTime, Transaction};
    use halfnode_chain::transparent::{CoinbaseData, Input, Output, Script};
    use halfnode_chain::work::difficulty::CompactDifficulty;

    fn coinbase() -> Arc<Transaction> {
        Arc::new(Transaction::new(
            1,
            vec![Input::Coinbase {
                data: CoinbaseData(vec![0x01, 0x02]),
                sequence: u32::MAX,
            }],
            vec![Output {
                value: Amount(50 * COIN),
                lock_script: Script(vec![]),
            }],
            LockTime::unlocked(),
        ))
    }

    /// Build a block over `transactions` and grind the nonce until the
    /// header satisfies its (very easy) target.
    fn mined_block(transactions: Vec<Arc<Transaction>>) -> Block {
        let merkle_root = merkle::Root::from_iter(transactions.iter().map(|tx| tx.hash()));
        let mut nonce = 0;
        loop {
            let header = Header::new(
                1,
                Hash::null(),
                merkle_root,
                Utc.timestamp(1_600_000_000, 0),
                CompactDifficulty(0x207f_ffff),
                nonce,
            );
            let candidate = Block {
                header,
                transactions: transactions.clone(),
            };
            if difficulty_is_valid(&candidate.header).is_ok() {
                return candidate;
            }
            nonce += 1;
        }
    }

    #[test]
    fn accepts_a_mined_coinbase_only_block() {
        let block = mined_block(vec![coinbase()]);
        assert!(block_is_valid(&block, Utc.timestamp(1_600_000_100, 0)).is_ok());
    }

    #[test]
    fn rejects_an_empty_block() {
        let mut block = mined_block(vec![coinbase()]);
        block.transactions.clear();
        assert!(matches!(
            block_is_valid(&block, Utc::now()),
            Err(BlockError::NoTransactions)
        ));
    }

    #[test]
    fn rejects_a_wrong_merkle_root() {
        let mut block = mined_block(vec![coinbase()]);
        block.header = Header::new(
            block.header.version,
            block.header.previous_block_hash,
            merkle::Root([0x11; 32]),
            block.header.time,
            block.header.difficulty_threshold,
            block.header.nonce,
        );
        assert!(matches!(
            block_is_valid(&block, Utc.timestamp(1_600_000_100, 0)),
            Err(BlockError::BadMerkleRoot { .. })
        ));
    }

    #[test]
    fn rejects_a_far_future_timestamp() {
        let block = mined_block(vec![coinbase()]);
        let long_ago = Utc.timestamp(1_000_000_000, 0);
        assert!(matches!(
            block_is_valid(&block, long_ago),
            Err(BlockError::TimeTooFarAhead)
        ));
    }

    #[test]
    fn rejects_an_unsatisfiable_target() {
        let mut block = mined_block(vec![coinbase()]);
        block.header = Header::new(
            block.header.version,
            block.header.previous_block_hash,
            block.header.merkle_root,
            block.header.time,
            CompactDifficulty(0x0080_0000),
            block.header.nonce,
        );
        assert!(matches!(
            block_is_valid(&block, Utc::now()),
            Err(BlockError::InvalidDifficulty)
        ));
    }
}
