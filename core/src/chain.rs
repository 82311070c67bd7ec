//! Processing entry point (C12, `spec.md` §4.11): the single gateway a
//! collaborator calls to hand the engine a new block, plus the small
//! read-only API surface everything else (mining, wallets, RPC) is
//! built against.

use std::sync::Arc;

use num_bigint::BigUint;
use parking_lot::Mutex;

use crate::collaborators::{BlockStore, RayonWorkers, ScriptWorkers, TimeSource};
use crate::connect::{connect_dry_run, connect_with_flags};
use crate::error::{ChainError, ChainResult, ErrorCode, RuleError};
use crate::hash::Hash;
use crate::index::{BlockIndex, BlockIndexNode};
use crate::params::ChainParams;
use crate::primitives::{Block, BlockHeader, OutPoint};
use crate::reorg::{reorganize, ChainEvent};
use crate::script::sigcache::SignatureCache;
use crate::time::SystemTimeSource;
use crate::utxo::{UtxoEntry, UtxoView};
use crate::validation::{
    check_block_context, check_block_header_context, check_block_sanity,
    check_block_sanity_no_pow, check_checkpoints, check_transactions_final,
};

/// Behavioral modifiers for [`Chain::process_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockFlags(u8);

impl BlockFlags {
    pub const NONE: BlockFlags = BlockFlags(0);
    /// Skip script verification — used for blocks under a hard
    /// checkpoint, where a full UTXO history is already trusted.
    pub const FAST_ADD: BlockFlags = BlockFlags(1 << 0);
    /// Skip the proof-of-work comparison — used only by
    /// `check_connect_block_template`, where the candidate's nonce is
    /// unconstrained.
    pub const NO_POW_CHECK: BlockFlags = BlockFlags(1 << 1);

    pub fn contains(self, other: BlockFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for BlockFlags {
    type Output = BlockFlags;
    fn bitor(self, rhs: BlockFlags) -> BlockFlags {
        BlockFlags(self.0 | rhs.0)
    }
}

/// A snapshot of the active chain's tip, returned by [`Chain::best_snapshot`].
#[derive(Debug, Clone)]
pub struct BestSnapshot {
    pub hash: Hash,
    pub height: i32,
    pub bits: u32,
    pub timestamp: i64,
    pub work: BigUint,
}

fn err(code: ErrorCode, detail: impl Into<String>) -> RuleError {
    RuleError::new(code, detail)
}

/// The consensus-critical core: owns the block index and UTXO set, and
/// is the sole writer of both. Every mutating call serializes through
/// `process_lock`; readers (index lookups, UTXO fetch against the
/// committed baseline) never block on it (`spec.md` §5).
pub struct Chain {
    params: ChainParams,
    index: BlockIndex,
    view: UtxoView,
    sig_cache: SignatureCache,
    time_source: Arc<dyn TimeSource>,
    workers: Arc<dyn ScriptWorkers>,
    store: Arc<dyn BlockStore>,
    best_tip: Mutex<Arc<BlockIndexNode>>,
    /// Serializes every call that can mutate the index, the UTXO
    /// baseline, or the active tip. A plain unit mutex: the data it
    /// guards is reached through the shared, lock-free structures
    /// above, so this only ever has to gate ordering.
    process_lock: Mutex<()>,
}

impl Chain {
    /// Builds a fresh engine over `store`, inserting `params`'s genesis
    /// block as the initial best tip and replaying any headers already
    /// present in `store` back into the index.
    ///
    /// Resolves Open Question (a): the parameters a caller supplies are
    /// the single source of truth, and are cross-checked at startup
    /// against this crate's own genesis table rather than trusted
    /// blindly or silently duplicated — a mismatch is a configuration
    /// error, surfaced as [`ChainError::ParamsMismatch`], not a
    /// consensus rule violation.
    pub fn new(params: ChainParams, store: Arc<dyn BlockStore>) -> ChainResult<Self> {
        let canonical = crate::params::params_for(params.net);
        if canonical.genesis_hash != params.genesis_hash {
            return Err(ChainError::ParamsMismatch(format!(
                "supplied genesis hash {} for network {:?} does not match the compiled-in {}",
                params.genesis_hash, params.net, canonical.genesis_hash
            )));
        }

        let index = BlockIndex::new();
        let genesis_node = index.insert_genesis(params.genesis_block.header.clone(), &params.pow_limit);
        genesis_node.mark_valid();
        genesis_node.mark_connected();

        if !store.has(&genesis_node.hash).map_err(|e| ChainError::Collaborator(e.to_string()))? {
            store
                .put(&params.genesis_block)
                .map_err(|e| ChainError::Collaborator(e.to_string()))?;
        }

        let headers = store.iter_headers().map_err(|e| ChainError::Collaborator(e.to_string()))?;
        let mut remaining: Vec<BlockHeader> = headers
            .into_iter()
            .filter(|h| h.hash() != genesis_node.hash)
            .collect();
        // Parents must be indexed before their children; headers may
        // arrive from storage in any order, so retry until a full pass
        // makes no progress.
        loop {
            let before = remaining.len();
            remaining.retain(|header| index.insert(header.clone(), &params.pow_limit).is_err());
            if remaining.len() == before || remaining.is_empty() {
                break;
            }
        }

        let view = UtxoView::new();
        let best_tip = Mutex::new(genesis_node);

        Ok(Chain {
            params,
            index,
            view,
            sig_cache: SignatureCache::new(),
            time_source: Arc::new(SystemTimeSource::new()),
            workers: Arc::new(RayonWorkers),
            store,
            best_tip,
            process_lock: Mutex::new(()),
        })
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn time_source(&self) -> &dyn TimeSource {
        self.time_source.as_ref()
    }

    /// The block most recently accepted as the active tip.
    pub fn best_snapshot(&self) -> BestSnapshot {
        let tip = self.best_tip.lock().clone();
        BestSnapshot {
            hash: tip.hash,
            height: tip.height,
            bits: tip.header.bits,
            timestamp: tip.header.timestamp_secs(),
            work: tip.cumulative_work.clone(),
        }
    }

    pub fn header_by_hash(&self, hash: &Hash) -> Option<BlockHeader> {
        self.index.lookup(hash).map(|n| n.header.clone())
    }

    pub fn fetch_utxo(&self, outpoint: &OutPoint) -> Option<UtxoEntry> {
        self.view.fetch(outpoint)
    }

    /// The canonical `getblocks`-style locator rooted at `hash`, or
    /// `None` if `hash` is not indexed.
    pub fn locator(&self, hash: &Hash) -> Option<Vec<Hash>> {
        self.index.lookup(hash).map(|node| self.index.locator(&node))
    }

    /// `true` once the tip's timestamp is recent enough that this node
    /// is plausibly caught up with the network, rather than still
    /// syncing historical blocks — the standard heuristic used to gate
    /// relay and mining until initial sync completes.
    pub fn is_current(&self) -> bool {
        const IS_CURRENT_MAX_AGE_SECONDS: i64 = 24 * 60 * 60;
        let tip = self.best_tip.lock();
        let age = self.time_source.adjusted_now().timestamp() - tip.header.timestamp_secs();
        age < IS_CURRENT_MAX_AGE_SECONDS
    }

    /// Runs every check `process_block` would, including a full
    /// speculative connect against the current UTXO baseline, but
    /// never mutates the index, the baseline, or the active tip —
    /// mining support calling this repeatedly while iterating a
    /// candidate's nonce/extra-nonce observes no side effects.
    pub fn check_connect_block_template(&self, block: &Block) -> ChainResult<()> {
        let _guard = self.process_lock.lock();

        check_block_sanity_no_pow(block, &self.params.pow_limit, self.time_source.as_ref())?;

        let tip = self.best_tip.lock().clone();
        if block.header.prev_block != tip.hash {
            return Err(ChainError::Rule(err(
                ErrorCode::ErrPrevBlockNotBest,
                "template does not extend the current best tip",
            )));
        }

        // A throwaway node: not inserted into the shared index, so the
        // checks and the dry-run connect below cannot leak into real
        // chain state even on success.
        let scratch_node = Arc::new(scratch_child_node(&tip, block.header.clone(), &self.params.pow_limit));
        check_block_header_context(&self.index, &scratch_node, &tip, &self.params)?;
        check_checkpoints(&self.index, &scratch_node, &self.params)?;
        check_block_context(block, scratch_node.height, &self.params)?;
        let mtp = self.index.median_time_past(&tip);
        check_transactions_final(block, scratch_node.height, mtp)?;

        connect_dry_run(
            block,
            &scratch_node,
            mtp,
            &self.index,
            &self.params,
            &self.view,
            &self.sig_cache,
            self.workers.as_ref(),
        )?;
        Ok(())
    }

    /// The single entry point for a new candidate block (`spec.md`
    /// §4.11). Returns `(on_main_chain, is_orphan)`:
    ///
    /// 1. A block already indexed and known-invalid is rejected as
    ///    `ErrDuplicateBlock` without re-validation.
    /// 2. Context-free sanity (C6) runs first, independent of chain state.
    /// 3. An unknown parent makes this block an orphan: `(false, true)`,
    ///    with nothing recorded in the index.
    /// 4. Otherwise the block is indexed and contextually validated (C7).
    /// 5. A direct child of the current best tip connects immediately
    ///    (C10); any other indexed block is evaluated for a reorg (C11)
    ///    only if its cumulative work exceeds the tip's.
    pub fn process_block(&self, block: &Block, flags: BlockFlags) -> ChainResult<(bool, bool)> {
        let _guard = self.process_lock.lock();
        let hash = block.hash();

        if self.index.lookup(&hash).is_some() {
            return Err(ChainError::Rule(err(
                ErrorCode::ErrDuplicateBlock,
                "block already indexed",
            )));
        }

        let skip_pow = flags.contains(BlockFlags::NO_POW_CHECK);
        let sanity_result = if skip_pow {
            check_block_sanity_no_pow(block, &self.params.pow_limit, self.time_source.as_ref())
        } else {
            check_block_sanity(block, &self.params.pow_limit, self.time_source.as_ref())
        };
        sanity_result?;

        let Some(parent) = self.index.lookup(&block.header.prev_block) else {
            return Ok((false, true));
        };
        let node = self.index.insert(block.header.clone(), &self.params.pow_limit)?;

        if let Err(e) = check_block_header_context(&self.index, &node, &parent, &self.params) {
            self.index.mark_invalid_subtree(&node);
            return Err(ChainError::Rule(e));
        }
        if let Err(e) = check_checkpoints(&self.index, &node, &self.params) {
            self.index.mark_invalid_subtree(&node);
            return Err(ChainError::Rule(e));
        }
        if let Err(e) = check_block_context(block, node.height, &self.params) {
            self.index.mark_invalid_subtree(&node);
            return Err(ChainError::Rule(e));
        }
        let parent_mtp = self.index.median_time_past(&parent);
        if let Err(e) = check_transactions_final(block, node.height, parent_mtp) {
            self.index.mark_invalid_subtree(&node);
            return Err(ChainError::Rule(e));
        }
        node.mark_valid();

        self.store
            .put(block)
            .map_err(|e| ChainError::Collaborator(e.to_string()))?;

        let below_latest_checkpoint = self
            .params
            .checkpoints
            .iter()
            .map(|c| c.height)
            .max()
            .is_some_and(|height| node.height <= height);
        let verify_scripts = !flags.contains(BlockFlags::FAST_ADD) && !below_latest_checkpoint;
        let tip = self.best_tip.lock().clone();

        if block.header.prev_block == tip.hash {
            match connect_with_flags(
                block,
                &node,
                parent_mtp,
                &self.index,
                &self.params,
                &self.view,
                &self.sig_cache,
                self.workers.as_ref(),
                verify_scripts,
            ) {
                Ok(journal) => {
                    self.store
                        .put_undo_journal(&node.hash, &journal)
                        .map_err(|e| ChainError::Collaborator(e.to_string()))?;
                    node.mark_connected();
                    *self.best_tip.lock() = node;
                    Ok((true, false))
                }
                Err(e) => {
                    self.index.mark_invalid_subtree(&node);
                    Err(ChainError::Rule(e))
                }
            }
        } else if node.cumulative_work > tip.cumulative_work {
            let events = reorganize(
                &self.index,
                self.store.as_ref(),
                &self.params,
                &self.view,
                &self.sig_cache,
                self.workers.as_ref(),
                &tip,
                &node,
            )?;
            let reorg_succeeded = events
                .iter()
                .any(|e| matches!(e, ChainEvent::BlockConnected(h) if *h == node.hash));
            if reorg_succeeded {
                *self.best_tip.lock() = node;
                Ok((true, false))
            } else {
                // The attach failed partway and was rolled back;
                // `old_tip` remains active.
                Ok((false, false))
            }
        } else {
            // Indexed, valid, but not enough work to contend for the
            // tip: accepted into the index and left for a later block
            // to extend.
            Ok((false, false))
        }
    }
}

/// Builds a node for [`Chain::check_connect_block_template`]'s
/// speculative connect without touching the shared index — the
/// template check must leave no trace even on success.
fn scratch_child_node(parent: &Arc<BlockIndexNode>, header: BlockHeader, pow_limit: &BigUint) -> BlockIndexNode {
    use crate::compact::work_from_bits;
    BlockIndexNode::new_detached(
        header.hash(),
        header.clone(),
        parent.height + 1,
        Some(parent.clone()),
        &parent.cumulative_work + work_from_bits(header.bits, pow_limit),
    )
}
