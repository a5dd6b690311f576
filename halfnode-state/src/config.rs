//! Runtime configuration for chain instances.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use halfnode_chain::parameters::Network;

/// Settings threaded into every [`ChainDb`](crate::ChainDb) at
/// construction.
///
/// Parsing a configuration file into this record is the embedding
/// application's job.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Root directory for chain state; each peer gets a subdirectory.
    pub db: PathBuf,

    /// Which network's blocks this node accepts.
    pub chain: Network,

    /// Seconds between fork-detector sweeps.
    pub checkinterval: u64,

    /// Skip signature checks (and the dependency resolution they require)
    /// while connecting blocks.
    pub nosig: bool,

    /// Optional file of concatenated block messages to bulk-import.
    pub loadblock: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db: dirs::cache_dir()
                .map(|dir| dir.join("halfnode"))
                .unwrap_or_else(|| PathBuf::from("halfnode-cache")),
            chain: Network::Mainnet,
            checkinterval: 60,
            nosig: false,
            loadblock: None,
        }
    }
}
