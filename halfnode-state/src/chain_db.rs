//! The chain database: block ingestion, best-chain bookkeeping,
//! reorganization, orphan handling, and block-template assembly.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::convert::TryInto;
use std::io::Read;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use lru::LruCache;
use primitive_types::U256;
use tracing::{debug, error, info, warn};

use halfnode_chain::amount::Amount;
use halfnode_chain::block::{self, merkle, Block, MAX_BLOCK_BYTES};
use halfnode_chain::parameters::GENESIS_PREVIOUS_BLOCK_HASH;
use halfnode_chain::serialization::BitcoinDeserialize;
use halfnode_chain::transaction::{self, LockTime, Transaction};
use halfnode_chain::transparent;
use halfnode_consensus::block::check as block_check;
use halfnode_consensus::subsidy;
use halfnode_consensus::transaction::check as tx_check;
use halfnode_consensus::ScriptVerifier;

use crate::block_store::BlockStore;
use crate::config::Config;
use crate::error::StoreError;
use crate::index::DbLock;
use crate::mempool::MemPool;
use crate::records::{BlkMeta, HeightIdx, TxIdx, MAX_OUTPUT_INDEX};

/// Decoded blocks kept hot in memory.
const BLOCK_CACHE_SIZE: usize = 500;

/// Body-size budget for an assembled block template.
const TEMPLATE_BODY_BYTES: usize = 900_000;

/// Sub-budget within the template for transactions paying no fee.
const TEMPLATE_FREE_BYTES: usize = 50_000;

/// Fee floor, in satoshis per 1000 bytes, below which a transaction is
/// treated as paying nothing.
const MIN_FEE_PER_KB: i128 = 50_000;

/// A shareable, lockable handle to a [`ChainDb`].
///
/// Every externally-callable operation runs for its whole duration under
/// this lock, so concurrent tasks — peer loops, the fork detector — observe
/// the database between logical actions, never inside one.
#[derive(Clone)]
pub struct ChainDbLock(Arc<Mutex<ChainDb>>);

impl ChainDbLock {
    pub fn new(chaindb: ChainDb) -> ChainDbLock {
        ChainDbLock(Arc::new(Mutex::new(chaindb)))
    }

    pub fn lock(&self) -> MutexGuard<'_, ChainDb> {
        self.0.lock().expect("chain mutex poisoned")
    }
}

/// The authoritative view of one peer's chain.
///
/// Owns the block file and the key-value index over it, plus the in-memory
/// orphan pool and decoded-block cache. The index keys:
///
/// ```text
///    tx:*      transaction index and spent-output masks
///    misc:*    chain state (height, tip, total work, network magic)
///    height:*  roster of blocks at height h
///    blkmeta:* per-block height and cumulative work
///    blocks:*  byte offset of the block in the block file
/// ```
pub struct ChainDb {
    config: Config,
    verifier: Arc<dyn ScriptVerifier>,
    mempool: Arc<Mutex<MemPool>>,
    store: BlockStore,
    db: DbLock,
    blk_cache: LruCache<block::Hash, Arc<Block>>,
    /// Blocks whose parent is unknown, by their own hash.
    orphans: HashMap<block::Hash, Arc<Block>>,
    /// Orphans waiting on a parent, by the parent's hash.
    orphan_deps: HashMap<block::Hash, Vec<block::Hash>>,
}

impl ChainDb {
    /// Open (creating if necessary) the chain state under `datadir`.
    ///
    /// Fails with [`StoreError::Corrupt`] when the directory holds state
    /// for a different network than `config.chain`.
    pub fn new(
        config: Config,
        datadir: &Path,
        mempool: Arc<Mutex<MemPool>>,
        verifier: Arc<dyn ScriptVerifier>,
    ) -> Result<ChainDb, StoreError> {
        std::fs::create_dir_all(datadir)?;
        let magic = config.chain.magic();
        let store = BlockStore::open(&datadir.join("blocks.dat"), magic)?;
        let db = DbLock::open(&datadir.join("leveldb"))?;

        if db.get("misc:height")?.is_none() {
            info!("initializing empty blockchain database");
            let mut batch = sled::Batch::default();
            batch.insert("misc:height".as_bytes(), b"-1".as_ref());
            batch.insert("misc:msg_start".as_bytes(), &magic.0[..]);
            batch.insert(
                "misc:tophash".as_bytes(),
                block::Hash::null().to_string().as_bytes(),
            );
            batch.insert("misc:total_work".as_bytes(), b"0x0".as_ref());
            db.write(batch)?;
        }

        match db.get("misc:msg_start")? {
            Some(start) if start == magic.0 => {}
            _ => {
                error!("database magic number mismatch. data corruption or incorrect network?");
                return Err(StoreError::Corrupt("network magic mismatch"));
            }
        }

        Ok(ChainDb {
            config,
            verifier,
            mempool,
            store,
            db,
            blk_cache: LruCache::new(
                NonZeroUsize::new(BLOCK_CACHE_SIZE).expect("cache size is nonzero"),
            ),
            orphans: HashMap::new(),
            orphan_deps: HashMap::new(),
        })
    }

    // ---- queries ------------------------------------------------------

    /// Height of the best chain; -1 when the database is empty.
    pub fn getheight(&self) -> Result<i64, StoreError> {
        self.db
            .get_string("misc:height")?
            .ok_or(StoreError::BadRecord("misc:height missing"))?
            .trim()
            .parse()
            .map_err(|_| StoreError::BadRecord("misc:height is not a number"))
    }

    /// Hash of the best-chain tip; all zeroes when the database is empty.
    pub fn gettophash(&self) -> Result<block::Hash, StoreError> {
        self.db
            .get_string("misc:tophash")?
            .ok_or(StoreError::BadRecord("misc:tophash missing"))?
            .trim()
            .parse()
            .map_err(|_| StoreError::BadRecord("misc:tophash is not a hash"))
    }

    fn total_work(&self) -> Result<U256, StoreError> {
        let work = self
            .db
            .get_string("misc:total_work")?
            .ok_or(StoreError::BadRecord("misc:total_work missing"))?;
        U256::from_str_radix(work.trim().trim_start_matches("0x"), 16)
            .map_err(|_| StoreError::BadRecord("misc:total_work is not hex"))
    }

    /// Fetch a block by hash, via the cache when possible.
    pub fn getblock(&mut self, blkhash: &block::Hash) -> Result<Option<Arc<Block>>, StoreError> {
        if let Some(block) = self.blk_cache.get(blkhash) {
            return Ok(Some(block.clone()));
        }

        let fpos = match self.db.get_string(&format!("blocks:{}", blkhash))? {
            None => return Ok(None),
            Some(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| StoreError::BadRecord("block offset is not a number"))?,
        };
        let block = Arc::new(self.store.read_at(fpos)?);
        self.blk_cache.put(*blkhash, block.clone());
        Ok(Some(block))
    }

    /// Whether `blkhash` is known, optionally counting the orphan pool.
    pub fn haveblock(&self, blkhash: &block::Hash, check_orphans: bool) -> Result<bool, StoreError> {
        if self.blk_cache.contains(blkhash) {
            return Ok(true);
        }
        if check_orphans && self.orphans.contains_key(blkhash) {
            return Ok(true);
        }
        Ok(self.db.get(&format!("blocks:{}", blkhash))?.is_some())
    }

    /// Whether `block`'s parent is present — or the block can begin an
    /// empty chain.
    pub fn have_prevblock(&self, block: &Block) -> Result<bool, StoreError> {
        if self.getheight()? < 0
            && block.header.previous_block_hash == GENESIS_PREVIOUS_BLOCK_HASH
        {
            return Ok(true);
        }
        self.haveblock(&block.header.previous_block_hash, false)
    }

    pub fn gettxidx(&self, txhash: &transaction::Hash) -> Result<Option<TxIdx>, StoreError> {
        match self.db.get_string(&format!("tx:{}", txhash))? {
            None => Ok(None),
            Some(s) => TxIdx::deserialize(&s).map(Some),
        }
    }

    /// Fetch a confirmed transaction by scanning the block its index entry
    /// names.
    pub fn gettx(
        &mut self,
        txhash: &transaction::Hash,
    ) -> Result<Option<Arc<Transaction>>, StoreError> {
        let txidx = match self.gettxidx(txhash)? {
            None => return Ok(None),
            Some(txidx) => txidx,
        };
        let block = match self.getblock(&txidx.blkhash)? {
            None => return Ok(None),
            Some(block) => block,
        };
        for tx in block.transactions.iter() {
            if tx.hash() == *txhash {
                return Ok(Some(tx.clone()));
            }
        }
        error!(tx = %txhash, block = %txidx.blkhash, "transaction index names a block that does not contain it");
        Ok(None)
    }

    pub fn getblockmeta(&self, blkhash: &block::Hash) -> Result<Option<BlkMeta>, StoreError> {
        match self.db.get_string(&format!("blkmeta:{}", blkhash))? {
            None => Ok(None),
            Some(s) => BlkMeta::deserialize(&s).map(Some),
        }
    }

    /// Height of an arbitrary indexed block; -1 when unknown.
    pub fn getblockheight(&self, blkhash: &block::Hash) -> Result<i64, StoreError> {
        Ok(self
            .getblockmeta(blkhash)?
            .map(|meta| meta.height)
            .unwrap_or(-1))
    }

    /// The first block hash recorded at `height`, if any.
    pub fn getblockhash(&self, height: i64) -> Result<Option<block::Hash>, StoreError> {
        match self.db.get_string(&format!("height:{}", height))? {
            None => Ok(None),
            Some(s) => Ok(HeightIdx::deserialize(&s)?.blocks.first().copied()),
        }
    }

    /// Resolve a block locator: the metadata of the first known hash, or a
    /// zero-height meta directing the peer to start from the beginning.
    pub fn locate(&self, locator: &[block::Hash]) -> Result<BlkMeta, StoreError> {
        for hash in locator {
            if let Some(meta) = self.getblockmeta(hash)? {
                return Ok(meta);
            }
        }
        Ok(BlkMeta {
            height: 0,
            work: U256::zero(),
        })
    }

    // ---- transaction index maintenance --------------------------------

    /// Write a transaction index record, through `batch` when one is given,
    /// directly otherwise.
    fn puttxidx(
        &self,
        txhash: &transaction::Hash,
        txidx: &TxIdx,
        batch: Option<&mut sled::Batch>,
    ) -> Result<(), StoreError> {
        if let Some(old) = self.gettxidx(txhash)? {
            warn!(
                tx = %txhash,
                height = self.getheight()?,
                oldblk = %old.blkhash,
                oldspent = %old.spentmask.to_hex(),
                newblk = %txidx.blkhash,
                "overwriting duplicate transaction index",
            );
        }

        let key = format!("tx:{}", txhash);
        let value = txidx.serialize();
        match batch {
            Some(batch) => batch.insert(key.as_bytes(), value.as_bytes()),
            None => self.db.put(&key, value.as_bytes())?,
        }
        Ok(())
    }

    fn spend_txout(
        &self,
        txhash: &transaction::Hash,
        n_idx: u32,
        batch: Option<&mut sled::Batch>,
    ) -> Result<bool, StoreError> {
        match self.gettxidx(txhash)? {
            None => Ok(false),
            Some(mut txidx) => {
                txidx.spentmask.set(n_idx);
                self.puttxidx(txhash, &txidx, batch)?;
                Ok(true)
            }
        }
    }

    fn clear_txout(
        &self,
        txhash: &transaction::Hash,
        n_idx: u32,
        batch: Option<&mut sled::Batch>,
    ) -> Result<bool, StoreError> {
        match self.gettxidx(txhash)? {
            None => Ok(false),
            Some(mut txidx) => {
                txidx.spentmask.clear(n_idx);
                self.puttxidx(txhash, &txidx, batch)?;
                Ok(true)
            }
        }
    }

    /// Whether an indexed outpoint is spent on the best chain. `None` when
    /// the transaction is unknown or the index is out of sanity bounds.
    fn txout_spent(&self, outpt: &transparent::OutPoint) -> Result<Option<bool>, StoreError> {
        if outpt.index >= MAX_OUTPUT_INDEX {
            return Ok(None);
        }
        match self.gettxidx(&outpt.hash)? {
            None => Ok(None),
            Some(txidx) => Ok(Some(txidx.spentmask.is_set(outpt.index))),
        }
    }

    /// Collect the outpoints `block` spends, each mapped to the position of
    /// its consuming transaction, plus the block-local positions of
    /// candidate producers. `None` when the block spends the same outpoint
    /// twice.
    #[allow(clippy::type_complexity)]
    fn unique_outpts(
        block: &Block,
    ) -> Option<(
        HashMap<(transaction::Hash, u32), (usize, bool)>,
        HashMap<transaction::Hash, usize>,
    )> {
        let mut outpts = HashMap::new();
        let mut txmap = HashMap::new();
        for (pos, tx) in block.transactions.iter().enumerate() {
            if tx.is_coinbase() {
                continue;
            }
            txmap.insert(tx.hash(), pos);
            for input in tx.inputs.iter() {
                if let transparent::Input::PrevOut { outpoint, .. } = input {
                    if outpts
                        .insert((outpoint.hash, outpoint.index), (pos, false))
                        .is_some()
                    {
                        return None;
                    }
                }
            }
        }
        Some((outpts, txmap))
    }

    /// The outpoints `block` is entitled to spend: each must be either
    /// unspent in the on-disk index, or produced by an earlier transaction
    /// within the block itself. `None` when any outpoint fails.
    fn spent_outpts(
        &self,
        block: &Block,
    ) -> Result<Option<Vec<(transaction::Hash, u32)>>, StoreError> {
        let (mut outpts, txmap) = match Self::unique_outpts(block) {
            None => return Ok(None),
            Some(v) => v,
        };

        // pass 1: outpoints already in the index must be unspent
        for (key, state) in outpts.iter_mut() {
            let outpt = transparent::OutPoint {
                hash: key.0,
                index: key.1,
            };
            match self.txout_spent(&outpt)? {
                None => continue,
                Some(true) => return Ok(None),
                Some(false) => state.1 = true, // settled; skip in pass 2
            }
        }

        // pass 2: the rest must come from earlier in this very block
        for (key, state) in outpts.iter() {
            if state.1 {
                continue;
            }
            let producer = match txmap.get(&key.0) {
                None => return Ok(None),
                Some(pos) => *pos,
            };
            if producer >= state.0 || key.1 >= MAX_OUTPUT_INDEX {
                return Ok(None);
            }
            if key.1 as usize >= block.transactions[producer].outputs.len() {
                return Ok(None);
            }
        }

        Ok(Some(outpts.keys().cloned().collect()))
    }

    /// Resolve every input of `tx` to its previous transaction — on chain,
    /// else in `block`, else (when allowed) in the mempool — and run the
    /// signature verifier over each.
    fn tx_signed(
        &mut self,
        tx: &Transaction,
        block: Option<&Block>,
        check_mempool: bool,
    ) -> Result<bool, StoreError> {
        for (i, input) in tx.inputs.iter().enumerate() {
            let outpoint = match input {
                transparent::Input::PrevOut { outpoint, .. } => *outpoint,
                transparent::Input::Coinbase { .. } => continue,
            };

            let mut txfrom = self.gettx(&outpoint.hash)?;
            if txfrom.is_none() {
                if let Some(block) = block {
                    txfrom = block
                        .transactions
                        .iter()
                        .find(|blktx| blktx.hash() == outpoint.hash)
                        .cloned();
                }
            }
            if txfrom.is_none() && check_mempool {
                txfrom = self
                    .mempool
                    .lock()
                    .expect("mempool mutex poisoned")
                    .get(&outpoint.hash);
            }

            let txfrom = match txfrom {
                None => {
                    info!(tx = %tx.hash(), input = i, missing = %outpoint.hash, "input dependency not found");
                    return Ok(false);
                }
                Some(txfrom) => txfrom,
            };

            if !self.verifier.verify_signature(&txfrom, tx, i) {
                info!(tx = %tx.hash(), input = i, "signature verification failed");
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ---- connect / disconnect -----------------------------------------

    fn connect_block(&mut self, block: &Arc<Block>, blkmeta: &BlkMeta) -> Result<bool, StoreError> {
        let block_hash = block.hash();

        // check transaction connectivity
        let outpts = match self.spent_outpts(block)? {
            None => {
                info!(block = %block_hash, "unconnectable block");
                return Ok(false);
            }
            Some(outpts) => outpts,
        };

        // verify script signatures
        if !self.config.nosig {
            for tx in block.transactions.iter() {
                if tx.is_coinbase() {
                    continue;
                }
                if !self.tx_signed(tx, Some(block), false)? {
                    info!(block = %block_hash, "invalid signature in block");
                    return Ok(false);
                }
            }
        }

        // update database pointers for the best chain
        let mut batch = sled::Batch::default();
        batch.insert(
            "misc:total_work".as_bytes(),
            format!("0x{:x}", blkmeta.work).as_bytes(),
        );
        batch.insert(
            "misc:height".as_bytes(),
            blkmeta.height.to_string().as_bytes(),
        );
        batch.insert("misc:tophash".as_bytes(), block_hash.to_string().as_bytes());

        info!(height = blkmeta.height, block = %block_hash, "connecting block");

        // every transaction in the block gets a fresh index record
        let mut fresh: HashMap<transaction::Hash, TxIdx> = HashMap::new();
        {
            let mut mempool = self.mempool.lock().expect("mempool mutex poisoned");
            let mut neverseen = 0;
            for tx in block.transactions.iter() {
                let txhash = tx.hash();
                if !mempool.remove(&txhash) {
                    neverseen += 1;
                }
                fresh.insert(txhash, TxIdx::new(block_hash));
            }
            debug!(
                txs = block.transactions.len(),
                neverseen,
                poolsz = mempool.size(),
                "mempool after connect",
            );
        }

        // mark dependencies as spent; a dependency created in this same
        // block gets its bit set on the record built above, inside the
        // same atomic batch
        for (prev_hash, index) in outpts.iter() {
            if let Some(rec) = fresh.get_mut(prev_hash) {
                rec.spentmask.set(*index);
            } else if !self.spend_txout(prev_hash, *index, Some(&mut batch))? {
                info!(block = %block_hash, tx = %prev_hash, "spent outpoint vanished during connect");
                return Ok(false);
            }
        }

        for (txhash, rec) in fresh.iter() {
            self.puttxidx(txhash, rec, Some(&mut batch))?;
        }

        self.db.write(batch)?;
        Ok(true)
    }

    fn disconnect_block(&mut self, block: &Arc<Block>) -> Result<bool, StoreError> {
        let prevhash = block.header.previous_block_hash;
        let prevmeta = match self.getblockmeta(&prevhash)? {
            None => {
                error!(block = %block.hash(), "cannot disconnect: parent metadata missing");
                return Ok(false);
            }
            Some(meta) => meta,
        };

        let (outpts, _) = match Self::unique_outpts(block) {
            None => return Ok(false),
            Some(v) => v,
        };

        let mut batch = sled::Batch::default();

        // mark dependencies unspent again
        for (prev_hash, index) in outpts.keys() {
            self.clear_txout(prev_hash, *index, Some(&mut batch))?;
        }

        // drop the block's own records; its transactions go back to the
        // pool (except the coinbase, which simply ceases to exist)
        {
            let mut mempool = self.mempool.lock().expect("mempool mutex poisoned");
            for tx in block.transactions.iter() {
                batch.remove(format!("tx:{}", tx.hash()).as_bytes());
                if !tx.is_coinbase() {
                    mempool.add(tx.clone());
                }
            }
        }

        // rewind the best-chain pointers to the parent
        batch.insert(
            "misc:total_work".as_bytes(),
            format!("0x{:x}", prevmeta.work).as_bytes(),
        );
        batch.insert(
            "misc:height".as_bytes(),
            prevmeta.height.to_string().as_bytes(),
        );
        batch.insert("misc:tophash".as_bytes(), prevhash.to_string().as_bytes());

        self.db.write(batch)?;

        info!(height = prevmeta.height, block = %prevhash, "disconnected to parent");
        Ok(true)
    }

    // ---- best-chain selection -----------------------------------------

    /// Switch the best chain to `new_best_blkhash`, disconnecting from the
    /// old tip back to the fork point and connecting forward to the new
    /// tip.
    ///
    /// A failure partway through leaves the database partially applied;
    /// that state is logged and surfaced as a rejection, and recovery is
    /// manual.
    fn reorganize(&mut self, new_best_blkhash: block::Hash) -> Result<bool, StoreError> {
        info!("reorganize started");

        let mut conn: Vec<Arc<Block>> = Vec::new();
        let mut disconn: Vec<Arc<Block>> = Vec::new();

        let old_best_blkhash = self.gettophash()?;
        let mut fork = old_best_blkhash;
        let mut longer = new_best_blkhash;

        while fork != longer {
            while self.getblockheight(&longer)? > self.getblockheight(&fork)? {
                let block = match self.getblock(&longer)? {
                    None => return Ok(false),
                    Some(block) => block,
                };
                longer = block.header.previous_block_hash;
                conn.push(block);
                if longer.is_null() {
                    return Ok(false);
                }
            }
            if fork == longer {
                break;
            }

            let block = match self.getblock(&fork)? {
                None => return Ok(false),
                Some(block) => block,
            };
            fork = block.header.previous_block_hash;
            disconn.push(block);
            if fork.is_null() {
                return Ok(false);
            }
        }

        info!(
            old_top = %old_best_blkhash,
            new_top = %new_best_blkhash,
            fork = %fork,
            disconnecting = disconn.len(),
            connecting = conn.len(),
            "reorganize plan",
        );

        for block in disconn.iter() {
            if !self.disconnect_block(block)? {
                error!(block = %block.hash(), "reorganize failed mid-disconnect; state is partially applied");
                return Ok(false);
            }
        }

        // conn was collected tip-first; connect from the fork upward
        for block in conn.iter().rev() {
            let blkmeta = match self.getblockmeta(&block.hash())? {
                None => return Ok(false),
                Some(meta) => meta,
            };
            if !self.connect_block(block, &blkmeta)? {
                error!(block = %block.hash(), "reorganize failed mid-connect; state is partially applied");
                return Ok(false);
            }
        }

        info!("reorganize done");
        Ok(true)
    }

    fn set_best_chain(&mut self, block: &Arc<Block>, blkmeta: &BlkMeta) -> Result<bool, StoreError> {
        // the easy case: extending the current best chain
        if blkmeta.height == 0 || self.gettophash()? == block.header.previous_block_hash {
            return self.connect_block(block, blkmeta);
        }

        // switching from the current chain to another, stronger chain
        self.reorganize(block.hash())
    }

    /// Validate, persist, and index one block whose parent is known.
    fn putoneblock(&mut self, block: Arc<Block>) -> Result<bool, StoreError> {
        let block_hash = block.hash();

        if let Err(err) = block_check::block_is_valid(&block, Utc::now()) {
            info!(block = %block_hash, %err, "invalid block");
            return Ok(false);
        }

        if !self.have_prevblock(&block)? {
            let parent = block.header.previous_block_hash;
            self.orphan_deps.entry(parent).or_default().push(block_hash);
            self.orphans.insert(block_hash, block);
            info!(block = %block_hash, orphans = self.orphans.len(), "orphan block");
            return Ok(false);
        }

        let top_height = self.getheight()?;
        let top_work = self.total_work()?;

        // metadata for the previous block; a chain-starting block hangs
        // off an implicit (-1, zero-work) predecessor
        let prevmeta = if top_height >= 0 {
            match self.getblockmeta(&block.header.previous_block_hash)? {
                Some(meta) => meta,
                None => return Err(StoreError::BadRecord("parent block has no metadata")),
            }
        } else {
            BlkMeta {
                height: -1,
                work: U256::zero(),
            }
        };

        let work = match block.header.difficulty_threshold.to_work() {
            Some(work) => work,
            None => {
                info!(block = %block_hash, "invalid difficulty target");
                return Ok(false);
            }
        };

        // the framed message on disk is canonical; index entries refer to
        // its offset
        let fpos = self.store.append(&block)?;

        let mut batch = sled::Batch::default();
        batch.insert(
            format!("blocks:{}", block_hash).as_bytes(),
            fpos.to_string().as_bytes(),
        );

        let blkmeta = BlkMeta {
            height: prevmeta.height + 1,
            work: prevmeta.work + work,
        };
        batch.insert(
            format!("blkmeta:{}", block_hash).as_bytes(),
            blkmeta.serialize().as_bytes(),
        );

        // extend the roster of blocks known at this height
        let height_key = format!("height:{}", blkmeta.height);
        let mut heightidx = match self.db.get_string(&height_key)? {
            Some(s) => HeightIdx::deserialize(&s)?,
            None => HeightIdx::default(),
        };
        heightidx.blocks.push(block_hash);
        batch.insert(height_key.as_bytes(), heightidx.serialize().as_bytes());

        self.db.write(batch)?;

        // a chain with no more work than the current best goes no further
        if blkmeta.work <= top_work {
            info!(height = blkmeta.height, block = %block_hash, "block extends a weaker chain");
            return Ok(true);
        }

        self.set_best_chain(&block, &blkmeta)
    }

    /// The sole entry point for block ingestion.
    ///
    /// Returns `Ok(false)` for duplicates, structural rejections, and
    /// orphan stashes; `Ok(true)` once the block (and any orphans it
    /// unblocked) has been persisted.
    pub fn putblock(&mut self, block: Arc<Block>) -> Result<bool, StoreError> {
        let block_hash = block.hash();
        if self.haveblock(&block_hash, true)? {
            info!(block = %block_hash, "duplicate block submitted");
            return Ok(false);
        }

        if !self.putoneblock(block)? {
            return Ok(false);
        }

        // drain orphans that were waiting on what just landed; entries are
        // consumed whether or not a child ends up connecting
        let mut ready = vec![block_hash];
        while let Some(parent) = ready.pop() {
            let children = match self.orphan_deps.remove(&parent) {
                None => continue,
                Some(children) => children,
            };
            for child_hash in children {
                let child = match self.orphans.remove(&child_hash) {
                    None => continue,
                    Some(child) => child,
                };
                if self.putoneblock(child)? {
                    ready.push(child_hash);
                }
            }
        }

        Ok(true)
    }

    // ---- mempool admission --------------------------------------------

    /// Whether `tx` depends on transactions this node has not seen.
    ///
    /// `Ok(None)` means the transaction is invalid outright — structurally
    /// broken, double-spending, or reaching past a parent's outputs.
    fn tx_is_orphan(&self, tx: &Transaction) -> Result<Option<bool>, StoreError> {
        if tx_check::transaction_is_valid(tx).is_err() {
            return Ok(None);
        }

        for input in tx.inputs.iter() {
            let outpoint = match input {
                transparent::Input::PrevOut { outpoint, .. } => outpoint,
                // a coinbase has no business arriving on its own
                transparent::Input::Coinbase { .. } => return Ok(Some(true)),
            };
            match self.txout_spent(outpoint)? {
                None => {
                    // unknown on chain; the pool may hold the parent
                    let mempool = self.mempool.lock().expect("mempool mutex poisoned");
                    match mempool.get(&outpoint.hash) {
                        None => return Ok(Some(true)),
                        Some(txfrom) => {
                            if outpoint.index as usize >= txfrom.outputs.len() {
                                return Ok(None);
                            }
                        }
                    }
                }
                Some(true) => return Ok(None), // spent? strange
                Some(false) => {}
            }
        }
        Ok(Some(false))
    }

    /// Network-side transaction admission: dependency and signature checks,
    /// then into the mempool.
    pub fn puttx(&mut self, tx: Arc<Transaction>) -> Result<bool, StoreError> {
        match self.tx_is_orphan(&tx)? {
            None => {
                info!(tx = %tx.hash(), "ignoring invalid transaction");
                Ok(false)
            }
            Some(true) => {
                info!(tx = %tx.hash(), "ignoring orphan transaction");
                Ok(false)
            }
            Some(false) => {
                if !self.tx_signed(&tx, None, true)? {
                    info!(tx = %tx.hash(), "ignoring transaction that failed signature checks");
                    return Ok(false);
                }
                Ok(self
                    .mempool
                    .lock()
                    .expect("mempool mutex poisoned")
                    .add(tx))
            }
        }
    }

    // ---- bulk import --------------------------------------------------

    /// Scan a file of concatenated `magic + length + block` frames and feed
    /// every decodable block through [`putblock`](Self::putblock).
    ///
    /// The scanner hunts for the network magic, so unaligned junk between
    /// frames is tolerated; corrupt framing advances the scan by one byte.
    pub fn loadfile(&mut self, path: &Path) -> Result<(), StoreError> {
        info!(file = %path.display(), "importing block data");

        let mut fd = std::fs::File::open(path)?;
        let magic = self.config.chain.magic();

        let mut buf: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 4096];
        let mut imported = 0u64;

        loop {
            let n = fd.read(&mut chunk)?;
            buf.extend_from_slice(&chunk[..n]);
            let eof = n == 0;

            let mut pos = 0usize;
            loop {
                let start = match buf[pos..].windows(4).position(|w| w == magic.0) {
                    None => {
                        // keep a partial magic that may straddle the read
                        pos = buf.len().saturating_sub(3);
                        break;
                    }
                    Some(offset) => pos + offset,
                };
                if buf.len() < start + 8 {
                    pos = start;
                    break;
                }

                let size = u32::from_le_bytes(
                    buf[start + 4..start + 8]
                        .try_into()
                        .expect("slice is four bytes"),
                ) as u64;
                if size == 0 || size > MAX_BLOCK_BYTES {
                    pos = start + 1;
                    continue;
                }
                let size = size as usize;
                if buf.len() < start + 8 + size {
                    pos = start;
                    break;
                }

                match Block::bitcoin_deserialize(&buf[start + 8..start + 8 + size]) {
                    Ok(block) => {
                        if self.putblock(Arc::new(block))? {
                            imported += 1;
                        }
                        pos = start + 8 + size;
                    }
                    Err(_) => {
                        pos = start + 1;
                    }
                }
            }

            buf.drain(..pos);
            if eof {
                break;
            }
        }

        info!(imported, "block import finished");
        Ok(())
    }

    // ---- template assembly --------------------------------------------

    /// Choose and order the mempool subset for a new block template.
    fn newblock_txs(&mut self) -> Result<Vec<Candidate>, StoreError> {
        let pool: Vec<Arc<Transaction>> = {
            let mempool = self.mempool.lock().expect("mempool mutex poisoned");
            mempool.iter().map(|(_, tx)| tx.clone()).collect()
        };

        let mut candidates = Vec::new();
        'next_tx: for tx in pool {
            // only finalized, non-coinbase transactions qualify
            if tx.is_coinbase() || !tx.is_final() {
                continue;
            }

            let mut value_in: i64 = 0;
            for input in tx.inputs.iter() {
                let outpoint = match input {
                    transparent::Input::PrevOut { outpoint, .. } => *outpoint,
                    transparent::Input::Coinbase { .. } => continue 'next_tx,
                };
                let in_tx = match self.gettx(&outpoint.hash)? {
                    None => continue 'next_tx,
                    Some(in_tx) => in_tx,
                };
                match in_tx.outputs.get(outpoint.index as usize) {
                    None => continue 'next_tx,
                    Some(output) => value_in += output.value.0,
                }
            }

            let value_out: i64 = tx.outputs.iter().map(|output| output.value.0).sum();
            let fees = value_in - value_out;
            if fees < 0 {
                continue;
            }

            let size = tx.len();
            candidates.push(Candidate {
                tx,
                fees,
                size,
                value_in,
            });
        }

        // highest fee rate first, ties broken by priority
        candidates.sort_by(|a, b| tx_blk_cmp(b, a));

        // greedy pack: the sort placed every fee payer ahead of every free
        // transaction, so one pass honors both budgets
        let mut selected = Vec::new();
        let mut body_bytes = 0usize;
        let mut free_bytes = TEMPLATE_FREE_BYTES;
        for cand in candidates {
            if body_bytes + cand.size > TEMPLATE_BODY_BYTES {
                continue;
            }
            if !cand.is_free() {
                body_bytes += cand.size;
                selected.push(cand);
            } else if free_bytes >= cand.size {
                free_bytes -= cand.size;
                body_bytes += cand.size;
                selected.push(cand);
            }
        }
        Ok(selected)
    }

    /// Assemble a candidate next block over the current tip.
    ///
    /// The caller owns nonce grinding; the returned header carries nonce 0
    /// and the parent's difficulty bits.
    pub fn newblock(&mut self) -> Result<Option<Block>, StoreError> {
        use std::iter::FromIterator;

        let tophash = self.gettophash()?;
        let prevblock = match self.getblock(&tophash)? {
            None => return Ok(None),
            Some(block) => block,
        };

        let selected = self.newblock_txs()?;
        let total_fees: i64 = selected.iter().map(|cand| cand.fees).sum();

        // TODO: assemble a real scriptSig and payout script once key
        // management exists
        let height = self.getheight()?;
        let coinbase = Transaction::new(
            1,
            vec![transparent::Input::Coinbase {
                data: transparent::CoinbaseData(vec![0x00, 0x00]),
                sequence: u32::MAX,
            }],
            vec![transparent::Output {
                value: subsidy::block_subsidy(height) + Amount(total_fees),
                lock_script: transparent::Script(Vec::new()),
            }],
            LockTime::unlocked(),
        );

        let mut transactions: Vec<Arc<Transaction>> = Vec::with_capacity(selected.len() + 1);
        transactions.push(Arc::new(coinbase));
        transactions.extend(selected.into_iter().map(|cand| cand.tx));

        let merkle_root = merkle::Root::from_iter(transactions.iter().map(|tx| tx.hash()));
        let header = block::Header::new(
            1,
            tophash,
            merkle_root,
            Utc::now(),
            // difficulty retargeting is out of scope; inherit the parent's
            prevblock.header.difficulty_threshold,
            0,
        );

        Ok(Some(Block {
            header,
            transactions,
        }))
    }

    // ---- shutdown -----------------------------------------------------

    /// Flush durable state. The mempool holds nothing durable and is
    /// simply discarded by its owner.
    pub fn close(&mut self) -> Result<(), StoreError> {
        self.store.close()?;
        self.db.flush()?;
        Ok(())
    }
}

/// A mempool transaction annotated for template selection.
struct Candidate {
    tx: Arc<Transaction>,
    fees: i64,
    size: usize,
    value_in: i64,
}

impl Candidate {
    /// Whether this transaction falls under the fee floor and competes only
    /// for the free sub-budget.
    fn is_free(&self) -> bool {
        (self.fees as i128) * 1000 < MIN_FEE_PER_KB * (self.size as i128)
    }
}

/// Order candidates by effective fee rate, then by priority. All the
/// arithmetic is exact cross-multiplication; no floating point is involved.
fn tx_blk_cmp(a: &Candidate, b: &Candidate) -> Ordering {
    let rate = |cand: &Candidate| -> (i128, i128) {
        if cand.is_free() {
            (0, 1)
        } else {
            ((cand.fees as i128) * 1000, cand.size as i128)
        }
    };
    let (a_num, a_den) = rate(a);
    let (b_num, b_den) = rate(b);

    match (a_num * b_den).cmp(&(b_num * a_den)) {
        Ordering::Equal => {
            // priority: input value per serialized byte
            let a_priority = (a.value_in as i128) * (b.size as i128);
            let b_priority = (b.value_in as i128) * (a.size as i128);
            a_priority.cmp(&b_priority)
        }
        ordering => ordering,
    }
}
