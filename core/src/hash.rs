//! Hashing primitives (C1).
//!
//! Two hash families are in play and must never be confused: `sha256d`
//! (double SHA-256) hashes transactions for their txid, and `groestld`
//! (double Groestl-512, first 32 bytes retained) is the proof-of-work
//! hash over the 80-byte block header.

use std::fmt;

use groestl::{Digest as _, Groestl512};
use ripemd::Ripemd160;
use sha2::{Digest as _, Sha256};

/// Size in bytes of every hash used by this crate.
pub const HASH_SIZE: usize = 32;

/// A 32-byte opaque identifier.
///
/// Equality is byte equality. Internal storage is the natural
/// (little-endian, as produced by the hash function) byte order; the
/// `Display`/`Debug` impls render the big-endian "human" convention
/// used by block explorers and RPC, which is the *reverse* of the wire
/// order used for `prev_block` pointers. Callers that need the wire
/// byte order should use [`Hash::as_bytes`] directly rather than
/// parsing the display string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash(pub [u8; HASH_SIZE]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; HASH_SIZE]);

    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }

    /// Parses a big-endian human-readable hex string (as produced by
    /// `Display`) back into a `Hash`.
    pub fn from_display_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; HASH_SIZE];
        hex::decode_to_slice(s, &mut bytes)?;
        bytes.reverse();
        Ok(Hash(bytes))
    }

    /// Interprets the hash as a big-endian unsigned integer, the
    /// convention used when comparing a header hash against a target.
    pub fn to_be_uint(&self) -> num_bigint::BigUint {
        let mut be = self.0;
        be.reverse();
        num_bigint::BigUint::from_bytes_be(&be)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "{}", hex::encode(reversed))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

/// Double SHA-256 of `bytes`.
pub fn sha256d(bytes: &[u8]) -> Hash {
    let first = Sha256::digest(bytes);
    let second = Sha256::digest(first);
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&second);
    Hash(out)
}

/// Double Groestl-512 of `bytes`, keeping the first 32 bytes of the
/// second digest. This is the block header proof-of-work hash.
pub fn groestld(bytes: &[u8]) -> Hash {
    let first = Groestl512::digest(bytes);
    let second = Groestl512::digest(first);
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&second[..HASH_SIZE]);
    Hash(out)
}

/// RIPEMD-160(SHA-256(bytes)) — the 20-byte digest scripts use for
/// P2PKH/P2SH output templates.
pub fn hash160(bytes: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(bytes);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripe);
    out
}
