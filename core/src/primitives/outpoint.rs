//! `OutPoint` — a reference to a previous transaction output (C2).

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::encoding::{Decodable, Encodable};
use crate::hash::Hash;

/// The index used by the null outpoint that marks a coinbase input.
pub const COINBASE_INDEX: u32 = 0xFFFF_FFFF;

/// `(tx_hash, index)` identifying one output of a prior transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx_hash: Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(tx_hash: Hash, index: u32) -> Self {
        OutPoint { tx_hash, index }
    }

    /// The outpoint every coinbase input must reference: a zero hash
    /// with index `0xFFFFFFFF`.
    pub fn null() -> Self {
        OutPoint {
            tx_hash: Hash::ZERO,
            index: COINBASE_INDEX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.index == COINBASE_INDEX && self.tx_hash.is_zero()
    }
}

impl Encodable for OutPoint {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.tx_hash.encode(w)?;
        self.index.encode(w)
    }
}

impl Decodable for OutPoint {
    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(OutPoint {
            tx_hash: Hash::decode(r)?,
            index: u32::decode(r)?,
        })
    }
}
