//! Chain state storage for the half-node.
//!
//! One [`ChainDb`] owns the durable state learned from a single peer: the
//! append-only block file, the key-value index over it, and the in-memory
//! orphan pool and block cache. The [`MemPool`] holds unconfirmed
//! transactions, and the [`ForkDetector`] periodically compares the tips of
//! several independent chain databases.

pub mod block_store;
pub mod config;
pub mod index;
pub mod mempool;
pub mod monitor;
pub mod records;

mod chain_db;
mod error;

pub use chain_db::{ChainDb, ChainDbLock};
pub use config::Config;
pub use error::StoreError;
pub use mempool::MemPool;
pub use monitor::{ForkDetector, ForkReport, ForkTip};
