//! Errors that can occur during context-free validation.

use thiserror::Error;

use halfnode_chain::block;

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("transaction has no inputs")]
    NoInputs,

    #[error("transaction has no outputs")]
    NoOutputs,

    #[error("coinbase input found in non-coinbase transaction")]
    CoinbaseInputFound,

    #[error("transaction spends the same outpoint more than once")]
    DuplicateInput,

    #[error("output value outside the valid money range")]
    OutputValueOutOfRange,

    #[error("total output value outside the valid money range")]
    TotalValueOutOfRange,

    #[error("script exceeds the maximum script size")]
    OversizedScript,

    #[error("coinbase data length outside the accepted range")]
    CoinbaseDataLength,
}

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("block has no transactions")]
    NoTransactions,

    #[error("the first transaction must be a coinbase, and only the first")]
    CoinbasePosition,

    #[error("block contains duplicate transactions")]
    DuplicateTransaction,

    #[error("merkle root {actual:?} does not match the header {expected:?}")]
    BadMerkleRoot {
        actual: block::merkle::Root,
        expected: block::merkle::Root,
    },

    #[error("difficulty threshold is not a valid target")]
    InvalidDifficulty,

    #[error("block hash {0:?} does not satisfy its difficulty target")]
    DifficultyFilter(block::Hash),

    #[error("block time is more than two hours in the future")]
    TimeTooFarAhead,

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}
