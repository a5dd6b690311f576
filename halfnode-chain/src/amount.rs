//! Monetary amounts, denominated in satoshis.

use serde::{Deserialize, Serialize};

use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// One coin, in satoshis.
pub const COIN: i64 = 100_000_000;

/// The total issuance cap. No output or output sum may exceed this.
pub const MAX_MONEY: i64 = 21_000_000 * COIN;

/// A quantity of satoshis.
///
/// Stored as a signed integer because fee arithmetic (inputs minus outputs)
/// can legitimately go negative before a transaction is rejected; range
/// validity is a consensus check, not a type invariant.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct Amount(pub i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Whether this amount is an acceptable single-output value.
    pub fn is_valid_money(&self) -> bool {
        self.0 >= 0 && self.0 <= MAX_MONEY
    }
}

impl std::ops::Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl BitcoinSerialize for Amount {
    fn bitcoin_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.bitcoin_serialize(target)
    }
}

impl BitcoinDeserialize for Amount {
    fn bitcoin_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Amount(i64::bitcoin_deserialize(reader)?))
    }
}
