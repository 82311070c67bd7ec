//! Reorg coordinator (C11, `spec.md` §4.10 / §8 scenario 5): moves the
//! best tip from one branch to another, detaching the old branch down
//! to the common ancestor and attaching the new one, or restoring the
//! prior tip untouched if any attach step fails.

use std::sync::Arc;

use log::{info, warn};

use crate::collaborators::{BlockStore, ScriptWorkers};
use crate::connect::{connect, disconnect};
use crate::error::{ChainError, ChainResult};
use crate::index::{BlockIndex, BlockIndexNode};
use crate::params::ChainParams;
use crate::script::sigcache::SignatureCache;
use crate::utxo::UtxoView;

/// Emitted in order as a reorg proceeds; a collaborator (e.g. mempool,
/// RPC notifier) subscribes to react to chain-tip movement.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    BlockDisconnected(crate::hash::Hash),
    BlockConnected(crate::hash::Hash),
}

/// Reorganizes the active chain from `old_tip` to `new_tip`.
///
/// Detaches `old_tip`'s branch down to the common ancestor with
/// `new_tip`, then attaches `new_tip`'s branch block by block. If any
/// attach step fails, every block attached so far in this call is
/// disconnected again, the failing block (and its descendants) is
/// marked `INVALID`, and `old_tip` is restored as the active chain —
/// the caller never observes a partially-applied reorg.
pub fn reorganize(
    index: &BlockIndex,
    store: &dyn BlockStore,
    params: &ChainParams,
    view: &UtxoView,
    sig_cache: &SignatureCache,
    workers: &dyn ScriptWorkers,
    old_tip: &Arc<BlockIndexNode>,
    new_tip: &Arc<BlockIndexNode>,
) -> ChainResult<Vec<ChainEvent>> {
    let mut events = Vec::new();
    let fork_point = index.get_ancestors_common(old_tip, new_tip);

    let detach_chain = chain_down_to(old_tip, &fork_point);
    let attach_chain = chain_down_to(new_tip, &fork_point);

    let mut disconnected_journals = Vec::with_capacity(detach_chain.len());
    for node in &detach_chain {
        let journal = store
            .undo_journal(&node.hash)
            .map_err(|e| ChainError::Collaborator(e.to_string()))?
            .ok_or_else(|| ChainError::Collaborator(format!("missing undo journal for {}", node.hash)))?;
        disconnect(view, &journal);
        node.clear_connected();
        disconnected_journals.push(node.hash);
        events.push(ChainEvent::BlockDisconnected(node.hash));
        info!("disconnected block {} at height {}", node.hash, node.height);
    }

    let mut attached_so_far: Vec<Arc<BlockIndexNode>> = Vec::with_capacity(attach_chain.len());
    for node in &attach_chain {
        let block = store
            .get(&node.hash)
            .map_err(|e| ChainError::Collaborator(e.to_string()))?
            .ok_or_else(|| ChainError::Collaborator(format!("missing stored block {}", node.hash)))?;
        let parent_mtp = node
            .parent
            .as_ref()
            .map(|p| index.median_time_past(p))
            .unwrap_or(0);

        match connect(&block, node, parent_mtp, index, params, view, sig_cache, workers) {
            Ok(journal) => {
                store
                    .put_undo_journal(&node.hash, &journal)
                    .map_err(|e| ChainError::Collaborator(e.to_string()))?;
                node.mark_connected();
                node.mark_valid();
                attached_so_far.push(node.clone());
                events.push(ChainEvent::BlockConnected(node.hash));
                info!("connected block {} at height {}", node.hash, node.height);
            }
            Err(rule_err) => {
                warn!(
                    "attach failed at block {} height {}: {rule_err}; rolling back reorg",
                    node.hash, node.height
                );
                index.mark_invalid_subtree(node);
                roll_back_partial_attach(store, view, &attached_so_far)?;
                roll_back_detach(index, store, params, view, sig_cache, workers, &disconnected_journals)?;
                return Err(ChainError::Rule(rule_err));
            }
        }
    }

    Ok(events)
}

/// The path from `tip` down to (but excluding) `ancestor`, ordered from
/// the block nearest `ancestor` to `tip` — the order both detach
/// (deepest-first from the tip) and attach (shallowest-first toward
/// the tip) want, read in opposite directions by their respective
/// callers.
fn chain_down_to(tip: &Arc<BlockIndexNode>, ancestor: &Arc<BlockIndexNode>) -> Vec<Arc<BlockIndexNode>> {
    let mut chain = Vec::new();
    let mut cur = tip.clone();
    while cur.hash != ancestor.hash {
        chain.push(cur.clone());
        cur = cur.parent.clone().expect("chain reaches the common ancestor");
    }
    chain.reverse();
    chain
}

fn roll_back_partial_attach(
    store: &dyn BlockStore,
    view: &UtxoView,
    attached: &[Arc<BlockIndexNode>],
) -> ChainResult<()> {
    for node in attached.iter().rev() {
        let journal = store
            .undo_journal(&node.hash)
            .map_err(|e| ChainError::Collaborator(e.to_string()))?
            .ok_or_else(|| ChainError::Collaborator(format!("missing undo journal for {}", node.hash)))?;
        disconnect(view, &journal);
        node.clear_connected();
    }
    Ok(())
}

/// Reconnects the blocks that were detached from the old tip, in the
/// order they were originally connected. The blocks were valid before
/// the attempted reorg, so with unchanged store contents and
/// parameters this cannot fail for a consensus reason; a failure here
/// means the store disagrees with itself and surfaces as a
/// [`ChainError::Collaborator`].
fn roll_back_detach(
    index: &BlockIndex,
    store: &dyn BlockStore,
    params: &ChainParams,
    view: &UtxoView,
    sig_cache: &SignatureCache,
    workers: &dyn ScriptWorkers,
    disconnected: &[crate::hash::Hash],
) -> ChainResult<()> {
    for hash in disconnected.iter().rev() {
        let node = index
            .lookup(hash)
            .ok_or_else(|| ChainError::Collaborator(format!("detached node {hash} vanished from the index")))?;
        let block = store
            .get(hash)
            .map_err(|e| ChainError::Collaborator(e.to_string()))?
            .ok_or_else(|| ChainError::Collaborator(format!("missing stored block {hash}")))?;
        let parent_mtp = node
            .parent
            .as_ref()
            .map(|p| index.median_time_past(p))
            .unwrap_or(0);
        let journal = connect(&block, &node, parent_mtp, index, params, view, sig_cache, workers)
            .map_err(|e| ChainError::Collaborator(format!("failed to restore prior tip block {hash}: {e}")))?;
        store
            .put_undo_journal(hash, &journal)
            .map_err(|e| ChainError::Collaborator(e.to_string()))?;
        node.mark_connected();
    }
    Ok(())
}
