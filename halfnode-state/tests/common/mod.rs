//! Shared fixtures for on-disk chain tests.
#![allow(dead_code)]

use std::iter::FromIterator;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};

use halfnode_chain::amount::{Amount, COIN};
use halfnode_chain::block::{self, merkle, Block, Header};
use halfnode_chain::parameters::Network;
use halfnode_chain::transaction::{LockTime, Transaction};
use halfnode_chain::transparent::{CoinbaseData, Input, OutPoint, Output, Script};
use halfnode_chain::work::difficulty::{CompactDifficulty, ExpandedDifficulty};
use halfnode_consensus::AcceptAll;
use halfnode_state::{ChainDb, Config, MemPool};

/// An easy target: roughly one hash in 256 clears it, so grinding a block
/// takes a few hundred attempts, and summed work stays far from the 256-bit
/// ceiling no matter how long the test chains get.
pub const EASY_BITS: CompactDifficulty = CompactDifficulty(0x2000_ffff);

pub fn test_config(dir: &Path) -> Config {
    Config {
        db: dir.to_path_buf(),
        chain: Network::Mainnet,
        checkinterval: 1,
        nosig: false,
        loadblock: None,
    }
}

pub fn open_chain(dir: &Path) -> (ChainDb, Arc<Mutex<MemPool>>) {
    let mempool = Arc::new(Mutex::new(MemPool::new()));
    let chain = ChainDb::new(
        test_config(dir),
        dir,
        mempool.clone(),
        Arc::new(AcceptAll),
    )
    .expect("chain opens");
    (chain, mempool)
}

/// A coinbase paying `values` out over one output each. The `tag` keeps
/// coinbases at different chain positions distinct.
pub fn coinbase_tx(tag: u8, values: &[i64]) -> Arc<Transaction> {
    Arc::new(Transaction::new(
        1,
        vec![Input::Coinbase {
            data: CoinbaseData(vec![tag, 0x00]),
            sequence: u32::MAX,
        }],
        values
            .iter()
            .map(|value| Output {
                value: Amount(*value),
                lock_script: Script(vec![tag]),
            })
            .collect(),
        LockTime::unlocked(),
    ))
}

/// A single-input, single-output spend of `prev`'s output `index`.
pub fn spend_tx(prev: &Transaction, index: u32, value: i64) -> Arc<Transaction> {
    Arc::new(Transaction::new(
        1,
        vec![Input::PrevOut {
            outpoint: OutPoint {
                hash: prev.hash(),
                index,
            },
            unlock_script: Script(vec![0x51]),
            sequence: u32::MAX,
        }],
        vec![Output {
            value: Amount(value),
            lock_script: Script(vec![0x52]),
        }],
        LockTime::unlocked(),
    ))
}

/// A zero-fee spend of `prev`'s output `index`, padded with `extra_outputs`
/// zero-value outputs to inflate its size.
pub fn free_tx(prev: &Transaction, index: u32, value: i64, extra_outputs: usize) -> Arc<Transaction> {
    let mut outputs = vec![Output {
        value: Amount(value),
        lock_script: Script(vec![0x53]),
    }];
    for _ in 0..extra_outputs {
        outputs.push(Output {
            value: Amount(0),
            lock_script: Script(vec![]),
        });
    }
    Arc::new(Transaction::new(
        1,
        vec![Input::PrevOut {
            outpoint: OutPoint {
                hash: prev.hash(),
                index,
            },
            unlock_script: Script(vec![0x51]),
            sequence: u32::MAX,
        }],
        outputs,
        LockTime::unlocked(),
    ))
}

/// Assemble a block over `prev` and grind its nonce until the hash clears
/// the (easy) target.
pub fn mine_block(prev: block::Hash, time_tag: u32, transactions: Vec<Arc<Transaction>>) -> Arc<Block> {
    let merkle_root = merkle::Root::from_iter(transactions.iter().map(|tx| tx.hash()));
    let target = EASY_BITS.to_expanded().expect("easy target expands");
    let mut nonce = 0u32;
    loop {
        let header = Header::new(
            1,
            prev,
            merkle_root,
            Utc.timestamp(1_600_000_000 + time_tag as i64, 0),
            EASY_BITS,
            nonce,
        );
        if ExpandedDifficulty::from_hash(&header.hash()) <= target {
            return Arc::new(Block {
                header,
                transactions,
            });
        }
        nonce += 1;
    }
}

/// A 50-coin genesis over the null parent.
pub fn genesis() -> Arc<Block> {
    mine_block(block::Hash::null(), 0, vec![coinbase_tx(0xa0, &[50 * COIN])])
}
