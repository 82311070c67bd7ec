//! Block index: the DAG of known headers (C5, `spec.md` §4.4).
//!
//! Children are held by weak reference from their parent; the arena
//! (`BlockIndex::nodes`) is the sole owner of every [`BlockIndexNode`]
//! via a strong `Arc`. A node holds a strong reference to its own
//! parent, so walking backward (ancestor chains, MTP) never touches the
//! weak side at all; only forward enumeration (descendant propagation
//! of `INVALID_ANCESTOR`) upgrades a weak child pointer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use num_bigint::BigUint;
use parking_lot::RwLock;

use crate::compact::work_from_bits;
use crate::error::{ErrorCode, RuleError};
use crate::hash::Hash;
use crate::primitives::BlockHeader;

mod status_bits {
    pub const HEADER_VALID: u8 = 1 << 0;
    pub const VALID: u8 = 1 << 1;
    pub const CONNECTED: u8 = 1 << 2;
    pub const INVALID: u8 = 1 << 3;
    pub const INVALID_ANCESTOR: u8 = 1 << 4;
}

/// A node's place in the validation pipeline. Bits accumulate; a node
/// can be `HEADER_VALID | CONNECTED` simultaneously, for instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStatus(u8);

impl NodeStatus {
    pub const HEADER_VALID: NodeStatus = NodeStatus(status_bits::HEADER_VALID);

    pub fn is_header_valid(self) -> bool {
        self.0 & status_bits::HEADER_VALID != 0
    }
    pub fn is_valid(self) -> bool {
        self.0 & status_bits::VALID != 0
    }
    pub fn is_connected(self) -> bool {
        self.0 & status_bits::CONNECTED != 0
    }
    pub fn is_invalid(self) -> bool {
        self.0 & status_bits::INVALID != 0
    }
    pub fn is_invalid_ancestor(self) -> bool {
        self.0 & status_bits::INVALID_ANCESTOR != 0
    }
    /// Neither `INVALID` nor descended from an `INVALID` node.
    pub fn is_usable(self) -> bool {
        self.0 & (status_bits::INVALID | status_bits::INVALID_ANCESTOR) == 0
    }

    fn with(self, bit: u8) -> NodeStatus {
        NodeStatus(self.0 | bit)
    }
}

pub struct BlockIndexNode {
    pub hash: Hash,
    pub header: BlockHeader,
    pub height: i32,
    pub parent: Option<Arc<BlockIndexNode>>,
    children: RwLock<Vec<Weak<BlockIndexNode>>>,
    pub cumulative_work: BigUint,
    status: AtomicU8,
    /// Monotonically increasing receipt order, used to break
    /// cumulative-work ties in favor of whichever node was seen first
    /// (`spec.md` §3 invariant 3).
    pub sequence: u64,
}

impl BlockIndexNode {
    /// Builds a node with no place in any [`BlockIndex`]'s arena and no
    /// children of its own — used by mining-support code that needs a
    /// real `&Arc<BlockIndexNode>` to drive a speculative connect
    /// (ancestor walks, ancestry reads) without registering the
    /// candidate in shared chain state.
    pub fn new_detached(
        hash: Hash,
        header: BlockHeader,
        height: i32,
        parent: Option<Arc<BlockIndexNode>>,
        cumulative_work: BigUint,
    ) -> Self {
        BlockIndexNode {
            hash,
            header,
            height,
            parent,
            children: RwLock::new(Vec::new()),
            cumulative_work,
            status: AtomicU8::new(status_bits::HEADER_VALID),
            sequence: u64::MAX,
        }
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus(self.status.load(Ordering::Acquire))
    }

    fn set_status_bit(&self, bit: u8) {
        self.status.fetch_or(bit, Ordering::AcqRel);
    }

    pub fn mark_valid(&self) {
        self.set_status_bit(status_bits::VALID);
    }

    pub fn mark_connected(&self) {
        self.set_status_bit(status_bits::CONNECTED);
    }

    pub fn clear_connected(&self) {
        self.status.fetch_and(!status_bits::CONNECTED, Ordering::AcqRel);
    }

    fn mark_invalid(&self) {
        self.set_status_bit(status_bits::INVALID);
    }

    fn mark_invalid_ancestor(&self) {
        self.set_status_bit(status_bits::INVALID_ANCESTOR);
    }

    fn add_child(&self, child: &Arc<BlockIndexNode>) {
        self.children.write().push(Arc::downgrade(child));
    }

    fn live_children(&self) -> Vec<Arc<BlockIndexNode>> {
        self.children.read().iter().filter_map(Weak::upgrade).collect()
    }
}

pub struct BlockIndex {
    nodes: RwLock<HashMap<Hash, Arc<BlockIndexNode>>>,
    next_sequence: AtomicU64,
}

impl BlockIndex {
    pub fn new() -> Self {
        BlockIndex {
            nodes: RwLock::new(HashMap::new()),
            next_sequence: AtomicU64::new(0),
        }
    }

    pub fn lookup(&self, hash: &Hash) -> Option<Arc<BlockIndexNode>> {
        self.nodes.read().get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts the genesis header with no parent lookup. Must be called
    /// at most once, before any ordinary `insert`.
    pub fn insert_genesis(&self, header: BlockHeader, pow_limit: &BigUint) -> Arc<BlockIndexNode> {
        let hash = header.hash();
        if let Some(existing) = self.lookup(&hash) {
            return existing;
        }
        let work = work_from_bits(header.bits, pow_limit);
        let node = Arc::new(BlockIndexNode {
            hash,
            header,
            height: 0,
            parent: None,
            children: RwLock::new(Vec::new()),
            cumulative_work: work,
            status: AtomicU8::new(status_bits::HEADER_VALID),
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
        });
        self.nodes.write().insert(hash, node.clone());
        node
    }

    /// Looks up `header.prev_block` and inserts a new node as its
    /// child. Fails with [`ErrorCode::MissingParent`] if the parent is
    /// not yet indexed. Idempotent: re-inserting an already-known hash
    /// returns the existing node without modification.
    pub fn insert(
        &self,
        header: BlockHeader,
        pow_limit: &BigUint,
    ) -> Result<Arc<BlockIndexNode>, RuleError> {
        let hash = header.hash();
        if let Some(existing) = self.lookup(&hash) {
            return Ok(existing);
        }
        let parent = self.lookup(&header.prev_block).ok_or_else(|| {
            RuleError::new(
                ErrorCode::MissingParent,
                format!("no indexed parent for block {hash}"),
            )
        })?;

        let work = &parent.cumulative_work + work_from_bits(header.bits, pow_limit);
        let node = Arc::new(BlockIndexNode {
            hash,
            header,
            height: parent.height + 1,
            cumulative_work: work,
            children: RwLock::new(Vec::new()),
            status: AtomicU8::new(status_bits::HEADER_VALID),
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            parent: Some(parent.clone()),
        });
        parent.add_child(&node);
        self.nodes.write().insert(hash, node.clone());
        Ok(node)
    }

    /// Marks `node` `INVALID` and every live descendant
    /// `INVALID_ANCESTOR` (`spec.md` §3 invariant 6).
    pub fn mark_invalid_subtree(&self, node: &Arc<BlockIndexNode>) {
        node.mark_invalid();
        let mut frontier = node.live_children();
        while let Some(child) = frontier.pop() {
            child.mark_invalid_ancestor();
            frontier.extend(child.live_children());
        }
    }

    /// Walks strictly backward from `node` to the ancestor at `height`.
    /// Returns `None` if `height` is negative or above `node.height`.
    pub fn ancestor(&self, node: &Arc<BlockIndexNode>, height: i32) -> Option<Arc<BlockIndexNode>> {
        if height < 0 || height > node.height {
            return None;
        }
        let mut cur = node.clone();
        while cur.height > height {
            cur = cur.parent.clone()?;
        }
        Some(cur)
    }

    /// Median of the timestamps of the 11 most recent ancestors
    /// (inclusive of `node`); fewer than 11 available uses what there
    /// is (`spec.md` §4.4).
    pub fn median_time_past(&self, node: &Arc<BlockIndexNode>) -> i64 {
        const WINDOW: i32 = 11;
        let mut timestamps = Vec::with_capacity(WINDOW as usize);
        let mut cur = Some(node.clone());
        for _ in 0..WINDOW {
            match cur {
                Some(n) => {
                    timestamps.push(n.header.timestamp_secs());
                    cur = n.parent.clone();
                }
                None => break,
            }
        }
        timestamps.sort_unstable();
        timestamps[timestamps.len() / 2]
    }

    /// Finds the last common ancestor of `a` and `b`, walking both
    /// chains back to equal height and then stepping in lockstep.
    pub fn get_ancestors_common(
        &self,
        a: &Arc<BlockIndexNode>,
        b: &Arc<BlockIndexNode>,
    ) -> Arc<BlockIndexNode> {
        let mut a = a.clone();
        let mut b = b.clone();
        while a.height > b.height {
            a = a.parent.clone().expect("ancestor chain reaches genesis");
        }
        while b.height > a.height {
            b = b.parent.clone().expect("ancestor chain reaches genesis");
        }
        while a.hash != b.hash {
            a = a.parent.clone().expect("ancestor chain reaches genesis");
            b = b.parent.clone().expect("ancestor chain reaches genesis");
        }
        a
    }

    /// The canonical exponentially sparse `getblocks`-style locator:
    /// the 10 most recent hashes, then hashes at exponentially
    /// increasing steps back to genesis.
    pub fn locator(&self, node: &Arc<BlockIndexNode>) -> Vec<Hash> {
        let mut hashes = Vec::new();
        let mut step = 1i32;
        let mut cur = Some(node.clone());
        let mut count = 0;
        loop {
            let Some(n) = cur else { break };
            hashes.push(n.hash);
            if n.height == 0 {
                break;
            }
            count += 1;
            if count >= 10 {
                step *= 2;
            }
            let target_height = (n.height - step).max(0);
            cur = self.ancestor(&n, target_height);
        }
        hashes
    }
}

impl Default for BlockIndex {
    fn default() -> Self {
        Self::new()
    }
}
