//! Collaborator contracts (`spec.md` §6): everything the engine needs
//! from the outside world, expressed as capability-set traits so the
//! core stays polymorphic over storage and clock implementations.
//!
//! Every method here is an atomic, single-call contract — no
//! multi-call transactions are implied, and a caller may safely invoke
//! these from multiple threads as long as the implementation itself
//! provides the necessary synchronization.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::RuleError;
use crate::hash::Hash;
use crate::primitives::Block;
use crate::script::InputToVerify;
use crate::utxo::CommittedChange;

#[derive(Debug, Error)]
#[error("block store error: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(detail: impl Into<String>) -> Self {
        StoreError(detail.into())
    }
}

/// Durable storage for full blocks and the undo journals `connect`
/// produces for them. The core never retains a block's transactions
/// once connected — it always goes back to the store to disconnect.
pub trait BlockStore: Send + Sync {
    fn get(&self, hash: &Hash) -> Result<Option<Block>, StoreError>;
    fn put(&self, block: &Block) -> Result<(), StoreError>;
    fn has(&self, hash: &Hash) -> Result<bool, StoreError>;

    /// The per-block undo journal [`crate::utxo::UtxoView::commit`]
    /// returned when this block was connected.
    fn undo_journal(&self, hash: &Hash) -> Result<Option<Vec<CommittedChange>>, StoreError>;
    fn put_undo_journal(&self, hash: &Hash, journal: &[CommittedChange]) -> Result<(), StoreError>;

    /// Every stored block's header, in no particular order — used to
    /// rebuild the in-memory block index on startup.
    fn iter_headers(&self) -> Result<Vec<crate::primitives::BlockHeader>, StoreError>;
}

/// An adjusted clock the core consults instead of the raw system clock
/// for every consensus time comparison (`spec.md` §4.3). The default
/// implementation is [`crate::time::SystemTimeSource`]; a node wires in
/// its own network-driven offset tracking by implementing this trait.
pub trait TimeSource: Send + Sync {
    fn adjusted_now(&self) -> DateTime<Utc>;
}

/// Runs a block's script-verification closures across its non-coinbase
/// inputs (`spec.md` §5). The lifetime parameter (rather than a type
/// parameter) keeps this object-safe — `Chain` holds workers behind a
/// `dyn ScriptWorkers`.
pub trait ScriptWorkers: Send + Sync {
    fn verify_all<'a>(
        &self,
        inputs: &[InputToVerify<'a>],
        verify: &(dyn Fn(&InputToVerify<'a>) -> Result<(), RuleError> + Sync + 'a),
    ) -> Result<(), RuleError>;
}

/// Default [`ScriptWorkers`] backed by the global rayon pool — the
/// behavior `core/src/script/mod.rs` used to hardcode directly.
pub struct RayonWorkers;

impl ScriptWorkers for RayonWorkers {
    fn verify_all<'a>(
        &self,
        inputs: &[InputToVerify<'a>],
        verify: &(dyn Fn(&InputToVerify<'a>) -> Result<(), RuleError> + Sync + 'a),
    ) -> Result<(), RuleError> {
        use rayon::prelude::*;
        inputs.par_iter().try_for_each(|input| verify(input))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct InMemoryBlockStore {
        blocks: Mutex<HashMap<Hash, Block>>,
        journals: Mutex<HashMap<Hash, Vec<CommittedChange>>>,
    }

    impl InMemoryBlockStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl BlockStore for InMemoryBlockStore {
        fn get(&self, hash: &Hash) -> Result<Option<Block>, StoreError> {
            Ok(self.blocks.lock().get(hash).cloned())
        }
        fn put(&self, block: &Block) -> Result<(), StoreError> {
            self.blocks.lock().insert(block.hash(), block.clone());
            Ok(())
        }
        fn has(&self, hash: &Hash) -> Result<bool, StoreError> {
            Ok(self.blocks.lock().contains_key(hash))
        }
        fn undo_journal(&self, hash: &Hash) -> Result<Option<Vec<CommittedChange>>, StoreError> {
            Ok(self.journals.lock().get(hash).cloned())
        }
        fn put_undo_journal(&self, hash: &Hash, journal: &[CommittedChange]) -> Result<(), StoreError> {
            self.journals.lock().insert(*hash, journal.to_vec());
            Ok(())
        }
        fn iter_headers(&self) -> Result<Vec<crate::primitives::BlockHeader>, StoreError> {
            Ok(self.blocks.lock().values().map(|b| b.header.clone()).collect())
        }
    }

    #[test]
    fn round_trips_a_block_and_its_undo_journal() {
        use crate::primitives::{BlockHeader, OutPoint};
        use chrono::{TimeZone, Utc};

        let store = InMemoryBlockStore::new();
        let block = Block {
            header: BlockHeader {
                version: 1,
                prev_block: Hash::ZERO,
                merkle_root: Hash::ZERO,
                timestamp: Utc.timestamp_opt(0, 0).single().unwrap(),
                bits: 0x207f_ffff,
                nonce: 0,
            },
            transactions: vec![],
        };
        store.put(&block).unwrap();
        assert!(store.has(&block.hash()).unwrap());

        let journal = vec![CommittedChange::Added(OutPoint::new(Hash::ZERO, 0))];
        store.put_undo_journal(&block.hash(), &journal).unwrap();
        assert_eq!(store.undo_journal(&block.hash()).unwrap().unwrap().len(), 1);
    }
}
