//! Signature verification cache (`spec.md` §4.8): keyed by
//! `(sighash, pubkey, sig)`, so mempool acceptance and the subsequent
//! block that confirms the same transaction don't redo the same ECDSA
//! verification.
//!
//! Only positive results are cached — a signature that fails once
//! might later succeed against a different sighash, so there is no
//! stable negative key to remember.

use std::collections::HashSet;

use parking_lot::RwLock;
use rand::seq::IteratorRandom;

use crate::hash::Hash;

/// `(sighash, pubkey bytes, signature bytes)`.
type CacheKey = (Hash, Vec<u8>, Vec<u8>);

/// Above this many entries, a random victim is evicted before the next
/// insert. There is no scoring of "hot" entries worth the complexity;
/// eviction only needs to bound memory, not maximize hit rate.
const MAX_ENTRIES: usize = 100_000;

pub struct SignatureCache {
    entries: RwLock<HashSet<CacheKey>>,
}

impl SignatureCache {
    pub fn new() -> Self {
        SignatureCache {
            entries: RwLock::new(HashSet::new()),
        }
    }

    pub fn contains(&self, sighash: &Hash, pubkey: &[u8], sig: &[u8]) -> bool {
        let key = (*sighash, pubkey.to_vec(), sig.to_vec());
        self.entries.read().contains(&key)
    }

    /// Records a verification that is known to have succeeded.
    pub fn insert(&self, sighash: Hash, pubkey: &[u8], sig: &[u8]) {
        let mut entries = self.entries.write();
        if entries.len() >= MAX_ENTRIES {
            if let Some(victim) = entries.iter().choose(&mut rand::thread_rng()).cloned() {
                entries.remove(&victim);
            }
        }
        entries.insert((sighash, pubkey.to_vec(), sig.to_vec()));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SignatureCache {
    fn default() -> Self {
        Self::new()
    }
}
