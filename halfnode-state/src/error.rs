use thiserror::Error;

use halfnode_chain::serialization::SerializationError;

/// Errors from the storage engine.
///
/// Content failures — invalid blocks, duplicates, orphans — are not errors:
/// ingest operations report them through their boolean outcome and a log
/// line, and the peer connection survives. These variants are reserved for
/// conditions the process cannot reason past, chiefly corrupt stores and
/// failing I/O.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index error: {0}")]
    Index(#[from] sled::Error),

    #[error("corrupt block store: {0}")]
    Corrupt(&'static str),

    #[error("malformed index record: {0}")]
    BadRecord(&'static str),

    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),
}
