//! Context-free transaction checks.

use std::collections::HashSet;

use halfnode_chain::amount::Amount;
use halfnode_chain::transaction::Transaction;
use halfnode_chain::transparent;

use crate::error::TransactionError;
use crate::parameters::{MAX_COINBASE_DATA_LEN, MAX_SCRIPT_SIZE, MIN_COINBASE_DATA_LEN};

/// Checks that the transaction has at least one input and one output.
pub fn has_inputs_and_outputs(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() {
        Err(TransactionError::NoInputs)
    } else if tx.outputs.is_empty() {
        Err(TransactionError::NoOutputs)
    } else {
        Ok(())
    }
}

/// Checks that every output value, and their sum, stays inside the valid
/// money range.
pub fn output_values_in_range(tx: &Transaction) -> Result<(), TransactionError> {
    let mut total: i64 = 0;
    for output in tx.outputs.iter() {
        if !output.value.is_valid_money() {
            return Err(TransactionError::OutputValueOutOfRange);
        }
        total = total
            .checked_add(output.value.0)
            .ok_or(TransactionError::TotalValueOutOfRange)?;
        if !Amount(total).is_valid_money() {
            return Err(TransactionError::TotalValueOutOfRange);
        }
    }
    Ok(())
}

/// Checks that no outpoint is spent twice within the same transaction.
pub fn no_duplicate_inputs(tx: &Transaction) -> Result<(), TransactionError> {
    let mut seen = HashSet::new();
    for input in tx.inputs.iter() {
        if let transparent::Input::PrevOut { outpoint, .. } = input {
            if !seen.insert(*outpoint) {
                return Err(TransactionError::DuplicateInput);
            }
        }
    }
    Ok(())
}

/// Checks script and coinbase-data size bounds, and that coinbase inputs
/// only appear in actual coinbase transactions.
pub fn scripts_within_limits(tx: &Transaction) -> Result<(), TransactionError> {
    let is_coinbase = tx.is_coinbase();

    for input in tx.inputs.iter() {
        match input {
            transparent::Input::PrevOut { unlock_script, .. } => {
                if unlock_script.0.len() > MAX_SCRIPT_SIZE {
                    return Err(TransactionError::OversizedScript);
                }
            }
            transparent::Input::Coinbase { data, .. } => {
                if !is_coinbase {
                    return Err(TransactionError::CoinbaseInputFound);
                }
                if data.0.len() < MIN_COINBASE_DATA_LEN || data.0.len() > MAX_COINBASE_DATA_LEN {
                    return Err(TransactionError::CoinbaseDataLength);
                }
            }
        }
    }

    for output in tx.outputs.iter() {
        if output.lock_script.0.len() > MAX_SCRIPT_SIZE {
            return Err(TransactionError::OversizedScript);
        }
    }

    Ok(())
}

/// Runs the full context-free transaction suite.
pub fn transaction_is_valid(tx: &Transaction) -> Result<(), TransactionError> {
    has_inputs_and_outputs(tx)?;
    output_values_in_range(tx)?;
    no_duplicate_inputs(tx)?;
    scripts_within_limits(tx)?;
    Ok(())
}
