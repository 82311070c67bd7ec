//! Block headers and blocks, and the Merkle root invariant (C2).

use std::io::{self, Read, Write};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::encoding::{read_seq, write_seq, Decodable, Encodable};
use crate::hash::{groestld, sha256d, Hash};

use super::transaction::Transaction;

const MAX_BLOCK_TRANSACTIONS: u64 = 1_000_000;

/// Serialized size, in bytes, of a header (version + prev + merkle +
/// timestamp + bits + nonce = 4+32+32+4+4+4).
pub const HEADER_SIZE: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash,
    pub merkle_root: Hash,
    /// Wall-clock time the miner claims for the block. Stored at full
    /// `chrono` precision so `check_block_sanity` can reject a
    /// sub-second component (`spec.md` §4.5 item 4); on the wire this
    /// truncates to a 4-byte Unix-seconds integer.
    pub timestamp: DateTime<Utc>,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Double-Groestl-512 hash of the 80-byte serialized header.
    pub fn hash(&self) -> Hash {
        groestld(&self.encode_to_vec())
    }

    pub fn timestamp_secs(&self) -> i64 {
        self.timestamp.timestamp()
    }

    /// `true` if the timestamp carries no sub-second component.
    pub fn has_second_precision(&self) -> bool {
        self.timestamp.timestamp_subsec_nanos() == 0
    }
}

impl Encodable for BlockHeader {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.version.encode(w)?;
        self.prev_block.encode(w)?;
        self.merkle_root.encode(w)?;
        (self.timestamp.timestamp() as u32).encode(w)?;
        self.bits.encode(w)?;
        self.nonce.encode(w)
    }
}

impl Decodable for BlockHeader {
    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let version = i32::decode(r)?;
        let prev_block = Hash::decode(r)?;
        let merkle_root = Hash::decode(r)?;
        let secs = u32::decode(r)?;
        let timestamp = Utc
            .timestamp_opt(secs as i64, 0)
            .single()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad header timestamp"))?;
        let bits = u32::decode(r)?;
        let nonce = u32::decode(r)?;
        Ok(BlockHeader {
            version,
            prev_block,
            merkle_root,
            timestamp,
            bits,
            nonce,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn compute_merkle_root(&self) -> Hash {
        let txids: Vec<Hash> = self.transactions.iter().map(Transaction::txid).collect();
        merkle_root(&txids)
    }

    pub fn merkle_root_matches(&self) -> bool {
        self.compute_merkle_root() == self.header.merkle_root
    }

    pub fn serialized_size(&self) -> usize {
        self.encode_to_vec().len()
    }
}

impl Encodable for Block {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.header.encode(w)?;
        write_seq(w, &self.transactions)
    }
}

impl Decodable for Block {
    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Block {
            header: BlockHeader::decode(r)?,
            transactions: read_seq(r, MAX_BLOCK_TRANSACTIONS)?,
        })
    }
}

/// Bitcoin-style binary Merkle root: pairs are double-SHA256'd level by
/// level; an odd trailing element is duplicated before pairing, as the
/// original implementation does (the well-known CVE-2012-2459
/// duplication behavior is preserved for wire compatibility, not
/// reintroduced by accident).
pub fn merkle_root(txids: &[Hash]) -> Hash {
    if txids.is_empty() {
        return Hash::ZERO;
    }
    let mut level: Vec<Hash> = txids.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = *level.last().unwrap();
            level.push(last);
        }
        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks_exact(2) {
            let mut buf = [0u8; 64];
            buf[..32].copy_from_slice(pair[0].as_bytes());
            buf[32..].copy_from_slice(pair[1].as_bytes());
            next.push(sha256d(&buf));
        }
        level = next;
    }
    level[0]
}
