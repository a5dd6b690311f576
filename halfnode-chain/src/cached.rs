use serde::{Deserialize, Serialize};

use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A `Cached` value is an option that never hits the wire.
///
/// Deserialization always produces an empty cache and serialization writes
/// nothing, so adding one of these fields to a consensus structure cannot
/// change its encoding.
#[derive(Clone, Copy, Eq, Serialize, Deserialize)]
pub struct Cached<T: Copy>(Option<T>);

impl<T: Copy> Cached<T> {
    pub fn new() -> Cached<T> {
        Cached(None)
    }

    pub fn from(val: T) -> Cached<T> {
        Cached(Some(val))
    }

    pub fn value(&self) -> Option<T> {
        self.0
    }
}

impl<T: Copy> Default for Cached<T> {
    fn default() -> Self {
        Cached::new()
    }
}

/// Two caches are unequal only when both are populated with different values.
///
/// Freshly built structures carry empty caches; their deserialized
/// counterparts carry full ones. Treating an empty cache as a wildcard lets
/// the two compare equal.
impl<T: PartialEq + Copy> PartialEq for Cached<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self.0, other.0) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => true,
        }
    }
}

impl<T: Copy + std::fmt::Debug> std::fmt::Debug for Cached<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: Copy> BitcoinSerialize for Cached<T> {
    fn bitcoin_serialize<W: std::io::Write>(&self, _: W) -> Result<(), std::io::Error> {
        Ok(())
    }
}

impl<T: Copy> BitcoinDeserialize for Cached<T> {
    fn bitcoin_deserialize<R: std::io::Read>(_: R) -> Result<Self, SerializationError> {
        Ok(Cached(None))
    }
}
