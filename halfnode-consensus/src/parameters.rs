//! Constants for block subsidies and structural limits.

use halfnode_chain::amount::COIN;
use halfnode_chain::block::Height;

/// The largest block subsidy, used before the first halving. 50 BTC.
pub const MAX_BLOCK_SUBSIDY: i64 = 50 * COIN;

/// The subsidy halves every this many blocks.
pub const HALVING_INTERVAL: Height = Height(210_000);

/// The largest script accepted in an input or output.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Coinbase data must be at least this long.
pub const MIN_COINBASE_DATA_LEN: usize = 2;

/// Coinbase data must be at most this long.
pub const MAX_COINBASE_DATA_LEN: usize = 100;
