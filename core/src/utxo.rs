//! Layered UTXO view with a per-layer undo journal (C8, `spec.md` §4.7).
//!
//! `UtxoView` generalizes the teacher's flat `Ledger::utxos` map
//! (`ledger.rs`) into a baseline plus a stack of speculative overlays:
//! `process_block` pushes a layer, spends/adds outputs against it, and
//! either commits the layer into the baseline or discards it, leaving
//! the baseline untouched either way until commit. The journal
//! `commit` hands back is later replayed in reverse by `disconnect` to
//! undo an already-committed block.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{ErrorCode, RuleError};
use crate::primitives::{OutPoint, Transaction, TxOut};
use crate::script::opcodes::OP_RETURN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoEntry {
    pub output: TxOut,
    pub height: i32,
    pub is_coinbase: bool,
}

/// One undoable action taken against the baseline by a committed
/// layer, in the order it happened.
#[derive(Debug, Clone)]
enum JournalEntry {
    /// A fresh output was inserted at this outpoint.
    Added(OutPoint),
    /// An existing entry was marked spent; the pre-image is kept so it
    /// can be restored.
    Spent(OutPoint, UtxoEntry),
}

#[derive(Default)]
struct Layer {
    overlay: HashMap<OutPoint, Option<UtxoEntry>>,
    journal: Vec<JournalEntry>,
}

pub struct UtxoView {
    baseline: RwLock<HashMap<OutPoint, UtxoEntry>>,
    /// At most one overlay is ever open at a time: the engine runs a
    /// single serializing mutator (`spec.md` §5), so there is never a
    /// need for a deeper stack than one layer.
    layer: parking_lot::Mutex<Option<Layer>>,
}

/// An output whose script can never be satisfied — `OP_RETURN` and
/// anything past it — need not be tracked in the UTXO set at all.
fn is_provably_unspendable(script: &[u8]) -> bool {
    matches!(script.first(), Some(&op) if op == OP_RETURN)
}

impl UtxoView {
    pub fn new() -> Self {
        UtxoView {
            baseline: RwLock::new(HashMap::new()),
            layer: parking_lot::Mutex::new(None),
        }
    }

    /// Reads straight through the open layer, if any, down to the
    /// baseline. `None` means either never existed or already spent.
    pub fn fetch(&self, outpoint: &OutPoint) -> Option<UtxoEntry> {
        if let Some(layer) = self.layer.lock().as_ref() {
            if let Some(slot) = layer.overlay.get(outpoint) {
                return slot.clone();
            }
        }
        self.baseline.read().get(outpoint).cloned()
    }

    pub fn push_layer(&self) {
        let mut layer = self.layer.lock();
        assert!(layer.is_none(), "a UTXO overlay is already open");
        *layer = Some(Layer::default());
    }

    /// Records every non-provably-unspendable output of `tx` as newly
    /// created in the open layer.
    pub fn add_tx_outputs(&self, tx: &Transaction, height: i32) {
        let txid = tx.txid();
        let is_coinbase = tx.is_coinbase();
        let mut layer = self.layer.lock();
        let layer = layer.as_mut().expect("add_tx_outputs called with no open layer");
        for (index, output) in tx.outputs.iter().enumerate() {
            if is_provably_unspendable(&output.pub_key_script) {
                continue;
            }
            let outpoint = OutPoint::new(txid, index as u32);
            layer.overlay.insert(
                outpoint,
                Some(UtxoEntry {
                    output: output.clone(),
                    height,
                    is_coinbase,
                }),
            );
            layer.journal.push(JournalEntry::Added(outpoint));
        }
    }

    /// Marks `outpoint` spent in the open layer, returning the entry it
    /// referenced. Fails `ErrMissingOrSpent` if nothing unspent is
    /// visible at `outpoint`.
    pub fn spend(&self, outpoint: OutPoint) -> Result<UtxoEntry, RuleError> {
        let entry = self.fetch(&outpoint).ok_or_else(|| {
            RuleError::new(
                ErrorCode::ErrMissingOrSpent,
                format!("outpoint {outpoint:?} is unknown or already spent"),
            )
        })?;
        let mut layer = self.layer.lock();
        let layer = layer.as_mut().expect("spend called with no open layer");
        layer.overlay.insert(outpoint, None);
        layer.journal.push(JournalEntry::Spent(outpoint, entry.clone()));
        Ok(entry)
    }

    /// Folds the open layer permanently into the baseline and returns
    /// its journal so the caller can retain it for a future
    /// `disconnect`.
    pub fn commit(&self) -> Vec<CommittedChange> {
        let layer = self
            .layer
            .lock()
            .take()
            .expect("commit called with no open layer");
        let mut baseline = self.baseline.write();
        for (outpoint, slot) in layer.overlay {
            match slot {
                Some(entry) => {
                    baseline.insert(outpoint, entry);
                }
                None => {
                    baseline.remove(&outpoint);
                }
            }
        }
        layer.journal.into_iter().map(CommittedChange::from).collect()
    }

    /// Drops the open layer without touching the baseline.
    pub fn discard(&self) {
        self.layer.lock().take().expect("discard called with no open layer");
    }

    /// Replays a previously committed block's journal in reverse
    /// directly against the baseline, undoing its effect exactly.
    pub fn disconnect(&self, journal: &[CommittedChange]) {
        let mut baseline = self.baseline.write();
        for change in journal.iter().rev() {
            match change {
                CommittedChange::Added(outpoint) => {
                    baseline.remove(outpoint);
                }
                CommittedChange::Spent(outpoint, entry) => {
                    baseline.insert(*outpoint, entry.clone());
                }
            }
        }
    }
}

/// The externally visible form of a journal entry, handed back by
/// [`UtxoView::commit`] for the caller to retain against a future
/// [`UtxoView::disconnect`].
#[derive(Debug, Clone)]
pub enum CommittedChange {
    Added(OutPoint),
    Spent(OutPoint, UtxoEntry),
}

impl From<JournalEntry> for CommittedChange {
    fn from(entry: JournalEntry) -> Self {
        match entry {
            JournalEntry::Added(op) => CommittedChange::Added(op),
            JournalEntry::Spent(op, entry) => CommittedChange::Spent(op, entry),
        }
    }
}

impl Default for UtxoView {
    fn default() -> Self {
        Self::new()
    }
}
