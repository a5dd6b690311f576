//! End-to-end scenarios over the chain database: initialization, linear
//! growth, orphans, side chains, reorganization, admission, import, and
//! template assembly.

mod common;

use std::sync::Arc;

use tempdir::TempDir;

use halfnode_chain::amount::COIN;
use halfnode_chain::block::Hash;
use halfnode_chain::parameters::Network;
use halfnode_chain::serialization::BitcoinSerialize;
use halfnode_state::{ChainDb, StoreError};

use common::*;

#[test]
fn empty_database_initializes_clean() {
    let dir = TempDir::new("halfnode").unwrap();
    let (chain, _pool) = open_chain(dir.path());

    assert_eq!(chain.getheight().unwrap(), -1);
    assert_eq!(chain.gettophash().unwrap(), Hash::null());
    assert_eq!(chain.getblockhash(0).unwrap(), None);
}

#[test]
fn reopening_with_another_network_is_fatal() {
    let dir = TempDir::new("halfnode").unwrap();
    {
        let (_chain, _pool) = open_chain(dir.path());
    }

    let mut config = test_config(dir.path());
    config.chain = Network::Testnet;
    let mempool = Arc::new(std::sync::Mutex::new(halfnode_state::MemPool::new()));
    let result = ChainDb::new(
        config,
        dir.path(),
        mempool,
        Arc::new(halfnode_consensus::AcceptAll),
    );
    assert!(matches!(result, Err(StoreError::Corrupt(_))));
}

#[test]
fn genesis_becomes_the_tip() {
    let dir = TempDir::new("halfnode").unwrap();
    let (mut chain, _pool) = open_chain(dir.path());

    let g = genesis();
    assert!(chain.putblock(g.clone()).unwrap());

    assert_eq!(chain.getheight().unwrap(), 0);
    assert_eq!(chain.gettophash().unwrap(), g.hash());
    assert_eq!(chain.getblockhash(0).unwrap(), Some(g.hash()));

    let meta = chain.getblockmeta(&g.hash()).unwrap().unwrap();
    assert_eq!(meta.height, 0);
    assert_eq!(
        meta.work,
        EASY_BITS.to_expanded().unwrap().value(),
    );
}

#[test]
fn duplicate_blocks_leave_state_untouched() {
    let dir = TempDir::new("halfnode").unwrap();
    let (mut chain, _pool) = open_chain(dir.path());

    let g = genesis();
    assert!(chain.putblock(g.clone()).unwrap());
    let meta_before = chain.getblockmeta(&g.hash()).unwrap().unwrap();

    assert!(!chain.putblock(g.clone()).unwrap());

    assert_eq!(chain.getheight().unwrap(), 0);
    assert_eq!(chain.gettophash().unwrap(), g.hash());
    assert_eq!(chain.getblockmeta(&g.hash()).unwrap().unwrap(), meta_before);
}

#[test]
fn linear_extension_records_spends() {
    let dir = TempDir::new("halfnode").unwrap();
    let (mut chain, _pool) = open_chain(dir.path());

    let g = genesis();
    let cb0 = g.transactions[0].clone();
    chain.putblock(g.clone()).unwrap();

    let spend = spend_tx(&cb0, 0, 49 * COIN);
    let b1 = mine_block(g.hash(), 1, vec![coinbase_tx(1, &[50 * COIN]), spend.clone()]);
    assert!(chain.putblock(b1.clone()).unwrap());

    assert_eq!(chain.getheight().unwrap(), 1);
    assert_eq!(chain.gettophash().unwrap(), b1.hash());

    // the spend is indexed under its containing block
    let txidx = chain.gettxidx(&spend.hash()).unwrap().unwrap();
    assert_eq!(txidx.blkhash, b1.hash());

    // and the consumed coinbase output is marked spent
    let cb_idx = chain.gettxidx(&cb0.hash()).unwrap().unwrap();
    assert!(cb_idx.spentmask.is_set(0));

    // gettx digs the transaction back out of the block file
    let fetched = chain.gettx(&spend.hash()).unwrap().unwrap();
    assert_eq!(fetched.hash(), spend.hash());
}

#[test]
fn double_spend_within_the_chain_is_unconnectable() {
    let dir = TempDir::new("halfnode").unwrap();
    let (mut chain, _pool) = open_chain(dir.path());

    let g = genesis();
    let cb0 = g.transactions[0].clone();
    chain.putblock(g.clone()).unwrap();

    let b1 = mine_block(
        g.hash(),
        1,
        vec![coinbase_tx(1, &[50 * COIN]), spend_tx(&cb0, 0, 49 * COIN)],
    );
    chain.putblock(b1.clone()).unwrap();

    // a block re-spending the same coinbase output indexes as a stronger
    // chain tip candidate but fails to connect
    let b2 = mine_block(
        b1.hash(),
        2,
        vec![coinbase_tx(2, &[50 * COIN]), spend_tx(&cb0, 0, 48 * COIN)],
    );
    assert!(!chain.putblock(b2).unwrap());
    assert_eq!(chain.gettophash().unwrap(), b1.hash());
}

#[test]
fn orphans_wait_for_their_parent() {
    let dir = TempDir::new("halfnode").unwrap();
    let (mut chain, _pool) = open_chain(dir.path());

    let g = genesis();
    chain.putblock(g.clone()).unwrap();

    let b1 = mine_block(g.hash(), 1, vec![coinbase_tx(1, &[50 * COIN])]);
    let b2 = mine_block(b1.hash(), 2, vec![coinbase_tx(2, &[50 * COIN])]);

    // the child arrives first and parks in the orphan pool
    assert!(!chain.putblock(b2.clone()).unwrap());
    assert!(chain.haveblock(&b2.hash(), true).unwrap());
    assert!(!chain.haveblock(&b2.hash(), false).unwrap());
    assert_eq!(chain.getheight().unwrap(), 0);

    // the parent's arrival drains the orphan behind it
    assert!(chain.putblock(b1.clone()).unwrap());
    assert_eq!(chain.getheight().unwrap(), 2);
    assert_eq!(chain.gettophash().unwrap(), b2.hash());
    assert!(chain.haveblock(&b2.hash(), false).unwrap());
}

#[test]
fn sibling_orphans_all_drain() {
    let dir = TempDir::new("halfnode").unwrap();
    let (mut chain, _pool) = open_chain(dir.path());

    let g = genesis();
    chain.putblock(g.clone()).unwrap();

    let b1 = mine_block(g.hash(), 1, vec![coinbase_tx(1, &[50 * COIN])]);
    let c1 = mine_block(b1.hash(), 2, vec![coinbase_tx(2, &[50 * COIN])]);
    let c2 = mine_block(b1.hash(), 3, vec![coinbase_tx(3, &[50 * COIN])]);

    // two orphans share the same missing parent
    assert!(!chain.putblock(c1.clone()).unwrap());
    assert!(!chain.putblock(c2.clone()).unwrap());

    assert!(chain.putblock(b1.clone()).unwrap());

    // both drained: one extended the chain, the other became a side block
    assert_eq!(chain.getheight().unwrap(), 2);
    assert!(chain.haveblock(&c1.hash(), false).unwrap());
    assert!(chain.haveblock(&c2.hash(), false).unwrap());
}

#[test]
fn equal_work_sibling_stays_a_side_chain() {
    let dir = TempDir::new("halfnode").unwrap();
    let (mut chain, _pool) = open_chain(dir.path());

    let g = genesis();
    chain.putblock(g.clone()).unwrap();

    let b1 = mine_block(g.hash(), 1, vec![coinbase_tx(1, &[50 * COIN])]);
    let b1_side = mine_block(g.hash(), 2, vec![coinbase_tx(9, &[50 * COIN])]);

    chain.putblock(b1.clone()).unwrap();
    assert!(chain.putblock(b1_side.clone()).unwrap());

    // the incumbent keeps the tip; both blocks are known at height 1
    assert_eq!(chain.gettophash().unwrap(), b1.hash());
    assert_eq!(chain.getblockhash(1).unwrap(), Some(b1.hash()));
    assert_eq!(
        chain.getblockmeta(&b1_side.hash()).unwrap().unwrap().height,
        1
    );
}

#[test]
fn stronger_side_chain_triggers_a_reorg() {
    let dir = TempDir::new("halfnode").unwrap();
    let (mut chain, pool) = open_chain(dir.path());

    let g = genesis();
    let cb0 = g.transactions[0].clone();
    chain.putblock(g.clone()).unwrap();

    // best chain: B1 confirms a spend of the genesis coinbase
    let spend = spend_tx(&cb0, 0, 49 * COIN);
    let b1 = mine_block(g.hash(), 1, vec![coinbase_tx(1, &[50 * COIN]), spend.clone()]);
    chain.putblock(b1.clone()).unwrap();
    assert!(chain.gettxidx(&cb0.hash()).unwrap().unwrap().spentmask.is_set(0));

    // competing chain: B1' alone is only equal work
    let b1_side = mine_block(g.hash(), 2, vec![coinbase_tx(9, &[50 * COIN])]);
    chain.putblock(b1_side.clone()).unwrap();
    assert_eq!(chain.gettophash().unwrap(), b1.hash());

    // B2' tips the balance; the chain switches
    let b2_side = mine_block(b1_side.hash(), 3, vec![coinbase_tx(10, &[50 * COIN])]);
    assert!(chain.putblock(b2_side.clone()).unwrap());

    assert_eq!(chain.getheight().unwrap(), 2);
    assert_eq!(chain.gettophash().unwrap(), b2_side.hash());

    // B1's transactions are no longer indexed, the disconnected spend is
    // back in the mempool, and the coinbase output is unspent again
    assert!(chain.gettxidx(&spend.hash()).unwrap().is_none());
    assert!(pool.lock().unwrap().contains(&spend.hash()));
    assert!(!chain.gettxidx(&cb0.hash()).unwrap().unwrap().spentmask.is_set(0));

    // the winning chain's transactions are indexed
    assert!(chain
        .gettxidx(&b2_side.transactions[0].hash())
        .unwrap()
        .is_some());
}

#[test]
fn reorg_back_restores_the_original_chain_state() {
    let dir_a = TempDir::new("halfnode").unwrap();
    let dir_b = TempDir::new("halfnode").unwrap();
    let (mut reorged, reorged_pool) = open_chain(dir_a.path());
    let (mut straight, straight_pool) = open_chain(dir_b.path());

    let g = genesis();
    let cb0 = g.transactions[0].clone();
    let spend = spend_tx(&cb0, 0, 49 * COIN);
    let b1 = mine_block(g.hash(), 1, vec![coinbase_tx(1, &[50 * COIN]), spend.clone()]);
    let b2a = mine_block(b1.hash(), 2, vec![coinbase_tx(2, &[50 * COIN])]);
    let b3a = mine_block(b2a.hash(), 3, vec![coinbase_tx(3, &[50 * COIN])]);
    let b1s = mine_block(g.hash(), 4, vec![coinbase_tx(9, &[50 * COIN])]);
    let b2s = mine_block(b1s.hash(), 5, vec![coinbase_tx(10, &[50 * COIN])]);

    // instance one reorgs to the side chain and back
    for block in [&g, &b1, &b1s, &b2s, &b2a, &b3a] {
        reorged.putblock(block.clone()).unwrap();
    }
    // instance two only ever sees the winning chain
    for block in [&g, &b1, &b2a, &b3a] {
        straight.putblock(block.clone()).unwrap();
    }

    assert_eq!(reorged.gettophash().unwrap(), b3a.hash());
    assert_eq!(
        reorged.gettophash().unwrap(),
        straight.gettophash().unwrap()
    );
    assert_eq!(reorged.getheight().unwrap(), straight.getheight().unwrap());
    assert_eq!(
        reorged.getblockmeta(&b3a.hash()).unwrap().unwrap(),
        straight.getblockmeta(&b3a.hash()).unwrap().unwrap()
    );

    // best-chain transaction state matches the never-reorged instance
    for chain in [&reorged, &straight] {
        let txidx = chain.gettxidx(&spend.hash()).unwrap().unwrap();
        assert_eq!(txidx.blkhash, b1.hash());
        assert!(chain.gettxidx(&cb0.hash()).unwrap().unwrap().spentmask.is_set(0));
    }
    assert_eq!(reorged_pool.lock().unwrap().size(), 0);
    assert_eq!(straight_pool.lock().unwrap().size(), 0);
}

#[test]
fn state_survives_reopen() {
    let dir = TempDir::new("halfnode").unwrap();
    let g = genesis();
    let b1 = mine_block(g.hash(), 1, vec![coinbase_tx(1, &[50 * COIN])]);

    {
        let (mut chain, _pool) = open_chain(dir.path());
        chain.putblock(g.clone()).unwrap();
        chain.putblock(b1.clone()).unwrap();
        chain.close().unwrap();
    }

    let (mut chain, _pool) = open_chain(dir.path());
    assert_eq!(chain.getheight().unwrap(), 1);
    assert_eq!(chain.gettophash().unwrap(), b1.hash());

    // cold cache; this read goes through the block file
    let fetched = chain.getblock(&b1.hash()).unwrap().unwrap();
    assert_eq!(fetched.hash(), b1.hash());
}

#[test]
fn locate_finds_the_first_known_hash() {
    let dir = TempDir::new("halfnode").unwrap();
    let (mut chain, _pool) = open_chain(dir.path());

    let g = genesis();
    let b1 = mine_block(g.hash(), 1, vec![coinbase_tx(1, &[50 * COIN])]);
    chain.putblock(g.clone()).unwrap();
    chain.putblock(b1.clone()).unwrap();

    let unknown = Hash([0xee; 32]);
    let meta = chain.locate(&[unknown, b1.hash(), g.hash()]).unwrap();
    assert_eq!(meta.height, 1);

    // nothing known: start from the beginning
    let fallback = chain.locate(&[unknown]).unwrap();
    assert_eq!(fallback.height, 0);
}

#[test]
fn puttx_gates_mempool_admission() {
    let dir = TempDir::new("halfnode").unwrap();
    let (mut chain, pool) = open_chain(dir.path());

    let g = genesis();
    let cb0 = g.transactions[0].clone();
    chain.putblock(g.clone()).unwrap();

    let cb1 = coinbase_tx(1, &[10 * COIN, 10 * COIN]);
    let b1 = mine_block(g.hash(), 1, vec![cb1.clone()]);
    chain.putblock(b1.clone()).unwrap();

    // a spend of a confirmed output is admitted
    let good = spend_tx(&cb1, 0, 10 * COIN - 10_000);
    assert!(chain.puttx(good.clone()).unwrap());
    assert!(pool.lock().unwrap().contains(&good.hash()));

    // a spend of an unknown transaction is an orphan
    let orphan = spend_tx(&coinbase_tx(0x77, &[COIN]), 0, COIN);
    assert!(!chain.puttx(orphan.clone()).unwrap());
    assert!(!pool.lock().unwrap().contains(&orphan.hash()));

    // a chained spend resolves through the mempool
    let chained = spend_tx(&good, 0, 10 * COIN - 20_000);
    assert!(chain.puttx(chained.clone()).unwrap());

    // reaching past a pooled parent's outputs is invalid, not an orphan
    let overreach = spend_tx(&good, 7, COIN);
    assert!(!chain.puttx(overreach).unwrap());

    // spending an already-spent chain output is refused
    let spend_a = spend_tx(&cb0, 0, 49 * COIN);
    let b2 = mine_block(b1.hash(), 2, vec![coinbase_tx(2, &[50 * COIN]), spend_a]);
    chain.putblock(b2).unwrap();
    let double = spend_tx(&cb0, 0, 48 * COIN);
    assert!(!chain.puttx(double).unwrap());
}

#[test]
fn loadfile_imports_frames_and_skips_junk() {
    let dir = TempDir::new("halfnode").unwrap();
    let (mut chain, _pool) = open_chain(dir.path());

    let g = genesis();
    let b1 = mine_block(g.hash(), 1, vec![coinbase_tx(1, &[50 * COIN])]);
    let magic = Network::Mainnet.magic();

    // bootstrap-style file: junk, then magic + length + payload frames
    let mut file = Vec::new();
    file.extend_from_slice(b"leading junk bytes");
    for block in [&g, &b1] {
        let payload = block.bitcoin_serialize_to_vec().unwrap();
        file.extend_from_slice(&magic.0);
        file.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        file.extend_from_slice(&payload);
        file.extend_from_slice(&[0xde, 0xad]);
    }
    // a corrupt frame: magic with an absurd length
    file.extend_from_slice(&magic.0);
    file.extend_from_slice(&u32::MAX.to_le_bytes());

    let path = dir.path().join("bootstrap.dat");
    std::fs::write(&path, &file).unwrap();

    chain.loadfile(&path).unwrap();
    assert_eq!(chain.getheight().unwrap(), 1);
    assert_eq!(chain.gettophash().unwrap(), b1.hash());
}

#[test]
fn newblock_orders_by_fee_then_priority() {
    let dir = TempDir::new("halfnode").unwrap();
    let (mut chain, _pool) = open_chain(dir.path());

    let g = genesis();
    chain.putblock(g.clone()).unwrap();

    let cb1 = coinbase_tx(1, &[10 * COIN, 10 * COIN, 10 * COIN, 5 * COIN]);
    let b1 = mine_block(g.hash(), 1, vec![cb1.clone()]);
    chain.putblock(b1.clone()).unwrap();

    // two fee payers (high and low) and two free spends (high and low
    // priority)
    let high_fee = spend_tx(&cb1, 0, 10 * COIN - 100_000);
    let low_fee = spend_tx(&cb1, 1, 10 * COIN - 10_000);
    let free_rich = spend_tx(&cb1, 2, 10 * COIN);
    let free_poor = spend_tx(&cb1, 3, 5 * COIN);

    for tx in [&low_fee, &free_poor, &high_fee, &free_rich] {
        assert!(chain.puttx(tx.clone()).unwrap());
    }

    let template = chain.newblock().unwrap().unwrap();

    assert_eq!(template.header.previous_block_hash, b1.hash());
    assert_eq!(template.header.difficulty_threshold, EASY_BITS);

    // coinbase first, paying subsidy plus all collected fees
    assert!(template.transactions[0].is_coinbase());
    assert_eq!(
        template.transactions[0].outputs[0].value.0,
        50 * COIN + 110_000
    );

    let order: Vec<_> = template.transactions[1..]
        .iter()
        .map(|tx| tx.hash())
        .collect();
    assert_eq!(
        order,
        vec![
            high_fee.hash(),
            low_fee.hash(),
            free_rich.hash(),
            free_poor.hash()
        ]
    );
}

#[test]
fn newblock_free_budget_excludes_oversized_free_transactions() {
    let dir = TempDir::new("halfnode").unwrap();
    let (mut chain, _pool) = open_chain(dir.path());

    let g = genesis();
    chain.putblock(g.clone()).unwrap();

    let cb1 = coinbase_tx(1, &[10 * COIN, 10 * COIN]);
    let b1 = mine_block(g.hash(), 1, vec![cb1.clone()]);
    chain.putblock(b1).unwrap();

    // ~52 KB of zero-fee transaction blows the 50 KB free sub-budget
    let huge_free = free_tx(&cb1, 0, 10 * COIN, 5_800);
    assert!(huge_free.len() > 50_000);
    let small_free = free_tx(&cb1, 1, 10 * COIN, 0);

    assert!(chain.puttx(huge_free.clone()).unwrap());
    assert!(chain.puttx(small_free.clone()).unwrap());

    let template = chain.newblock().unwrap().unwrap();
    let included: Vec<_> = template.transactions[1..]
        .iter()
        .map(|tx| tx.hash())
        .collect();
    assert!(included.contains(&small_free.hash()));
    assert!(!included.contains(&huge_free.hash()));
}

#[test]
fn newblock_on_an_empty_chain_yields_nothing() {
    let dir = TempDir::new("halfnode").unwrap();
    let (mut chain, _pool) = open_chain(dir.path());
    assert!(chain.newblock().unwrap().is_none());
}
