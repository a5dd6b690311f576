//! Consensus-critical data structures for the half-node: blocks,
//! transactions, proof-of-work arithmetic, and the Bitcoin wire encoding.

pub mod amount;
pub mod block;
pub mod cached;
pub mod compactint;
pub mod parameters;
pub mod serialization;
pub mod transaction;
pub mod transparent;
pub mod work;

pub use serialization::{
    BitcoinDeserialize, BitcoinDeserializeInto, BitcoinSerialize, SerializationError,
};
