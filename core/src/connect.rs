//! Connect/disconnect engine (C10, `spec.md` §5): applies a block's
//! transactions against the UTXO view, schedules script verification
//! across all non-coinbase inputs, and commits or discards the layer
//! as one atomic unit.

use std::sync::Arc;

use crate::collaborators::ScriptWorkers;
use crate::error::{ErrorCode, RuleError};
use crate::index::{BlockIndex, BlockIndexNode};
use crate::params::ChainParams;
use crate::primitives::{calc_input_sequence_lock, Block, SequenceLock};
use crate::script::{verify_inputs, InputToVerify, ScriptRules};
use crate::script::sigcache::SignatureCache;
use crate::utxo::{CommittedChange, UtxoView};

fn err(code: ErrorCode, detail: impl Into<String>) -> RuleError {
    RuleError::new(code, detail)
}

/// Median time past of the ancestor of `node` at `height`, used as the
/// "time the spent coin was created" half of a sequence lock.
fn height_mtp(index: &BlockIndex, node: &Arc<BlockIndexNode>, height: i32) -> i64 {
    match index.ancestor(node, height) {
        Some(ancestor) => index.median_time_past(&ancestor),
        None => 0,
    }
}

/// Applies `block` (already sanity- and context-checked) against
/// `view`: spends and credits every transaction's coins, enforces
/// coinbase maturity, relative sequence locks, and the fee/subsidy
/// bound, then verifies every non-coinbase input's script. On any
/// failure the open layer is discarded and the error is returned; on
/// success the layer is committed and its undo journal is returned for
/// a future [`disconnect`].
pub fn connect(
    block: &Block,
    node: &Arc<BlockIndexNode>,
    parent_mtp: i64,
    index: &BlockIndex,
    params: &ChainParams,
    view: &UtxoView,
    sig_cache: &SignatureCache,
    workers: &dyn ScriptWorkers,
) -> Result<Vec<CommittedChange>, RuleError> {
    connect_with_flags(block, node, parent_mtp, index, params, view, sig_cache, workers, true)
}

/// As [`connect`], but script verification is skipped entirely when
/// `verify_scripts` is `false` — used by `BFFastAdd` for the
/// checkpoint-covered prefix a node trusts without re-deriving every
/// signature.
pub fn connect_with_flags(
    block: &Block,
    node: &Arc<BlockIndexNode>,
    parent_mtp: i64,
    index: &BlockIndex,
    params: &ChainParams,
    view: &UtxoView,
    sig_cache: &SignatureCache,
    workers: &dyn ScriptWorkers,
    verify_scripts: bool,
) -> Result<Vec<CommittedChange>, RuleError> {
    let height = node.height;
    view.push_layer();

    match connect_inner(block, height, parent_mtp, index, node, params, view, sig_cache, workers, verify_scripts) {
        Ok(()) => Ok(view.commit()),
        Err(e) => {
            view.discard();
            Err(e)
        }
    }
}

fn connect_inner(
    block: &Block,
    height: i32,
    parent_mtp: i64,
    index: &BlockIndex,
    node: &Arc<BlockIndexNode>,
    params: &ChainParams,
    view: &UtxoView,
    sig_cache: &SignatureCache,
    workers: &dyn ScriptWorkers,
    verify_scripts: bool,
) -> Result<(), RuleError> {
    let coinbase = &block.transactions[0];
    view.add_tx_outputs(coinbase, height);

    let mut total_fees: i64 = 0;
    let mut to_verify: Vec<(usize, usize, crate::primitives::TxOut)> = Vec::new();

    for (tx_index, tx) in block.transactions.iter().enumerate().skip(1) {
        let mut locks = Vec::with_capacity(tx.inputs.len());
        let mut input_sum: i64 = 0;

        for (input_index, input) in tx.inputs.iter().enumerate() {
            let entry = view.spend(input.previous_output)?;

            if entry.is_coinbase && height - entry.height < params.coinbase_maturity {
                return Err(err(
                    ErrorCode::ErrImmatureSpend,
                    format!(
                        "coinbase output at height {} spent at {height}, before maturity {}",
                        entry.height, params.coinbase_maturity
                    ),
                ));
            }

            let prev_mtp = height_mtp(index, node, entry.height);
            locks.push(calc_input_sequence_lock(
                input.sequence,
                tx.version,
                entry.height,
                prev_mtp,
            ));

            input_sum = input_sum
                .checked_add(entry.output.value)
                .ok_or_else(|| err(ErrorCode::ErrBadTxOutValue, "input value sum overflow"))?;
            to_verify.push((tx_index, input_index, entry.output));
        }

        let combined = SequenceLock::combine(locks);
        if !combined.is_active(height, parent_mtp) {
            return Err(err(
                ErrorCode::ErrSpendTooSoon,
                "relative sequence lock not yet satisfied",
            ));
        }

        let output_sum = tx.output_value_sum();
        let fee = input_sum - output_sum;
        if fee < 0 {
            return Err(err(
                ErrorCode::ErrBadTxOutValue,
                "transaction outputs exceed its inputs",
            ));
        }
        total_fees = total_fees
            .checked_add(fee)
            .ok_or_else(|| err(ErrorCode::ErrBadTxOutValue, "cumulative fee overflow"))?;

        view.add_tx_outputs(tx, height);
    }

    let subsidy = params.subsidy_at_height(height);
    let coinbase_value = coinbase.output_value_sum();
    if coinbase_value > subsidy + total_fees {
        return Err(err(
            ErrorCode::ErrBadCoinbaseValue,
            format!(
                "coinbase pays {coinbase_value}, exceeding subsidy {subsidy} + fees {total_fees}"
            ),
        ));
    }

    if !verify_scripts {
        return Ok(());
    }

    let inputs: Vec<InputToVerify<'_>> = to_verify
        .iter()
        .map(|(tx_index, input_index, prev_out)| InputToVerify {
            tx: &block.transactions[*tx_index],
            input_index: *input_index,
            prev_out,
        })
        .collect();
    let rules = ScriptRules::at_height(height, params);
    verify_inputs(&inputs, rules, sig_cache, workers)
}

/// Undoes a previously committed block by replaying its journal in
/// reverse directly against the baseline.
pub fn disconnect(view: &UtxoView, journal: &[CommittedChange]) {
    view.disconnect(journal);
}

/// Runs exactly the checks [`connect`] would, but always discards the
/// overlay — used by `CheckConnectBlockTemplate` so mining support can
/// validate a candidate without ever mutating the UTXO baseline.
pub fn connect_dry_run(
    block: &Block,
    node: &Arc<BlockIndexNode>,
    parent_mtp: i64,
    index: &BlockIndex,
    params: &ChainParams,
    view: &UtxoView,
    sig_cache: &SignatureCache,
    workers: &dyn ScriptWorkers,
) -> Result<(), RuleError> {
    let height = node.height;
    view.push_layer();
    let result = connect_inner(block, height, parent_mtp, index, node, params, view, sig_cache, workers, true);
    view.discard();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;
    use crate::params::regtest_params;
    use crate::primitives::{BlockHeader, OutPoint, Transaction, TxIn, TxOut};
    use chrono::{TimeZone, Utc};

    fn header(prev: Hash, timestamp: i64, bits: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_block: prev,
            merkle_root: Hash::ZERO,
            timestamp: Utc.timestamp_opt(timestamp, 0).single().unwrap(),
            bits,
            nonce: 0,
        }
    }

    fn coinbase(height: i32, value: i64) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output: OutPoint::null(),
                signature_script: crate::validation::encode_serialized_height(height),
                sequence: u32::MAX,
            }],
            outputs: vec![TxOut {
                value,
                pub_key_script: vec![0x51],
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn coinbase_paying_more_than_subsidy_fails() {
        let index = BlockIndex::new();
        let params = regtest_params();
        let genesis = index.insert_genesis(header(Hash::ZERO, 0, params.pow_limit_bits), &params.pow_limit);
        let view = UtxoView::new();
        let sig_cache = SignatureCache::new();

        let subsidy = params.subsidy_at_height(1);
        let block = Block {
            header: header(genesis.hash, 1, params.pow_limit_bits),
            transactions: vec![coinbase(1, subsidy + 1)],
        };
        let node = index.insert(block.header.clone(), &params.pow_limit).unwrap();

        let workers = crate::collaborators::RayonWorkers;
        let result = connect(&block, &node, 0, &index, &params, &view, &sig_cache, &workers);
        assert_eq!(result.unwrap_err().code, ErrorCode::ErrBadCoinbaseValue);
    }

    #[test]
    fn coinbase_paying_exactly_subsidy_succeeds_and_commits() {
        let index = BlockIndex::new();
        let params = regtest_params();
        let genesis = index.insert_genesis(header(Hash::ZERO, 0, params.pow_limit_bits), &params.pow_limit);
        let view = UtxoView::new();
        let sig_cache = SignatureCache::new();

        let subsidy = params.subsidy_at_height(1);
        let block = Block {
            header: header(genesis.hash, 1, params.pow_limit_bits),
            transactions: vec![coinbase(1, subsidy)],
        };
        let node = index.insert(block.header.clone(), &params.pow_limit).unwrap();

        let workers = crate::collaborators::RayonWorkers;
        let journal = connect(&block, &node, 0, &index, &params, &view, &sig_cache, &workers).unwrap();
        assert_eq!(journal.len(), 1);
        let outpoint = OutPoint::new(block.transactions[0].txid(), 0);
        assert!(view.fetch(&outpoint).is_some());

        disconnect(&view, &journal);
        assert!(view.fetch(&outpoint).is_none());
    }

    #[test]
    fn spending_an_immature_coinbase_output_fails() {
        let index = BlockIndex::new();
        let mut params = regtest_params();
        params.coinbase_maturity = 10;
        let genesis = index.insert_genesis(header(Hash::ZERO, 0, params.pow_limit_bits), &params.pow_limit);
        let view = UtxoView::new();
        let sig_cache = SignatureCache::new();

        let subsidy = params.subsidy_at_height(1);
        let block1 = Block {
            header: header(genesis.hash, 1, params.pow_limit_bits),
            transactions: vec![coinbase(1, subsidy)],
        };
        let node1 = index.insert(block1.header.clone(), &params.pow_limit).unwrap();
        let workers = crate::collaborators::RayonWorkers;
        connect(&block1, &node1, 0, &index, &params, &view, &sig_cache, &workers).unwrap();

        let spend_tx = Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output: OutPoint::new(block1.transactions[0].txid(), 0),
                signature_script: vec![],
                sequence: u32::MAX,
            }],
            outputs: vec![TxOut {
                value: subsidy,
                pub_key_script: vec![0x51],
            }],
            lock_time: 0,
        };
        let block2 = Block {
            header: header(node1.hash, 2, params.pow_limit_bits),
            transactions: vec![coinbase(2, params.subsidy_at_height(2)), spend_tx],
        };
        let node2 = index.insert(block2.header.clone(), &params.pow_limit).unwrap();
        let result = connect(&block2, &node2, 1, &index, &params, &view, &sig_cache, &workers);
        assert_eq!(result.unwrap_err().code, ErrorCode::ErrImmatureSpend);
    }
}
