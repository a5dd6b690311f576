//! Periodic cross-peer fork detection.
//!
//! Each followed peer has its own [`ChainDb`]; this task samples every
//! peer's tip on an interval and reports whether the peers agree, trail one
//! another on a single chain, or have split onto independent chains.

use std::collections::HashMap;
use std::sync::MutexGuard;
use std::time::Duration;

use tracing::{info, warn};

use halfnode_chain::block;

use crate::chain_db::{ChainDb, ChainDbLock};
use crate::config::Config;
use crate::error::StoreError;

/// The outcome of one fork-detection sweep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForkReport {
    /// Every peer reports the identical tip.
    AllSameTip,
    /// Tips differ, but every tip lies on a single chain.
    SameChain,
    /// Multiple independent chains; one entry per surviving root.
    Forked(Vec<ForkTip>),
}

/// One independent chain tip and the peers following it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForkTip {
    pub height: i64,
    pub hash: block::Hash,
    /// Peers at this tip, plus peers on ancestor chains it extends.
    pub peers: Vec<String>,
}

pub struct ForkDetector {
    interval: Duration,
    chaindbs: Vec<(String, ChainDbLock)>,
}

impl ForkDetector {
    pub fn new(config: &Config, chaindbs: Vec<(String, ChainDbLock)>) -> ForkDetector {
        ForkDetector {
            interval: Duration::from_secs(config.checkinterval),
            chaindbs,
        }
    }

    /// Sweep all peers every `checkinterval` seconds, forever.
    ///
    /// Each sweep locks every chain handle up front and releases them all
    /// after the analysis, so no chain mutates mid-comparison.
    pub async fn run(self) {
        info!(peers = self.chaindbs.len(), "fork detector watching peers");
        loop {
            tokio::time::sleep(self.interval).await;

            let mut locked: Vec<(String, MutexGuard<'_, ChainDb>)> = self
                .chaindbs
                .iter()
                .map(|(name, handle)| (name.clone(), handle.lock()))
                .collect();
            if let Err(err) = check_chains(&mut locked) {
                warn!(%err, "fork detector sweep failed");
            }
        }
    }
}

/// One analysis pass over already-locked chains.
pub fn check_chains(
    chains: &mut [(String, MutexGuard<'_, ChainDb>)],
) -> Result<ForkReport, StoreError> {
    info!("fork detector checking chains");

    // level 1: group peers by identical tip
    let mut peers_by_tip: HashMap<(i64, block::Hash), Vec<String>> = HashMap::new();
    let mut peer_index: HashMap<String, usize> = HashMap::new();
    for (idx, (name, chaindb)) in chains.iter().enumerate() {
        let tip = (chaindb.getheight()?, chaindb.gettophash()?);
        peers_by_tip.entry(tip).or_default().push(name.clone());
        peer_index.insert(name.clone(), idx);
    }
    if peers_by_tip.len() == 1 {
        info!("fork detector: all peers at same tip");
        return Ok(ForkReport::AllSameTip);
    }

    // level 2: working highest-first, try to place each tip underneath an
    // existing root by walking that root's chain back down to the tip's
    // height
    let mut tips: Vec<(i64, block::Hash)> = peers_by_tip.keys().cloned().collect();
    tips.sort();
    tips.reverse();

    let mut roots: Vec<(i64, block::Hash)> = Vec::new();
    let mut parent: HashMap<(i64, block::Hash), Option<(i64, block::Hash)>> = HashMap::new();

    for pt in tips {
        let mut placed = false;
        for root in roots.iter() {
            // tips are processed highest-first, so the deepest placed
            // ancestor of any root is at least as high as pt
            let mut cpt = *root;
            while let Some(Some(next)) = parent.get(&cpt) {
                cpt = *next;
            }

            let probe_peer = peers_by_tip[&cpt][0].clone();
            let chaindb = &mut chains[peer_index[&probe_peer]].1;

            let mut height = cpt.0;
            let mut cur = cpt.1;
            let mut walk_ok = true;
            while height > pt.0 {
                match chaindb.getblock(&cur)? {
                    Some(block) => cur = block.header.previous_block_hash,
                    None => {
                        walk_ok = false;
                        break;
                    }
                }
                height -= 1;
            }

            if walk_ok && cur == pt.1 {
                parent.insert(cpt, Some(pt));
                parent.entry(pt).or_insert(None);
                placed = true;
                break;
            }
        }
        if !placed {
            parent.insert(pt, None);
            roots.push(pt);
        }
    }

    if roots.len() == 1 {
        info!("fork detector: all peers in same chain");
        return Ok(ForkReport::SameChain);
    }

    // level 3: report each independent chain with the union of its own
    // peers and the peers of every chain placed beneath it
    warn!(
        chains = roots.len(),
        "fork detector: independent chains detected"
    );
    let mut report = Vec::new();
    for root in roots {
        let mut peers = peers_by_tip[&root].clone();
        let mut cpt = root;
        while let Some(Some(next)) = parent.get(&cpt) {
            cpt = *next;
            peers.extend(peers_by_tip[&cpt].iter().cloned());
        }
        warn!(height = root.0, block = %root.1, peers = ?peers, "fork detector: independent chain");
        report.push(ForkTip {
            height: root.0,
            hash: root.1,
            peers,
        });
    }
    Ok(ForkReport::Forked(report))
}
