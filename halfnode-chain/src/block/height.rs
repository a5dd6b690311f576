use serde::{Deserialize, Serialize};

/// The length of the chain back to its first block.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Height(pub u32);
