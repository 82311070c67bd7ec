//! Context-free sanity validators (C6, `spec.md` §4.5).
//!
//! These checks depend only on the candidate block itself (plus the
//! network's `pow_limit` and a time source for the future-drift check)
//! — never on chain state. They run before the block is even looked up
//! in the index.

use num_bigint::BigUint;

use crate::collaborators::TimeSource;
use crate::compact::bits_to_target;
use crate::error::{ErrorCode, RuleError};
use crate::primitives::{Block, Transaction, MAX_MONEY};

/// No segwit-style witness discount; weight is simply `4 * size`, the
/// same ceiling Bitcoin enforces without the witness scale factor.
pub const MAX_BLOCK_SERIALIZED_SIZE: usize = 1_000_000;
pub const MAX_BLOCK_WEIGHT: usize = MAX_BLOCK_SERIALIZED_SIZE * 4;

const MAX_FUTURE_DRIFT_SECONDS: i64 = 2 * 60 * 60;
const MIN_COINBASE_SCRIPT_LEN: usize = 2;
const MAX_COINBASE_SCRIPT_LEN: usize = 100;

fn err(code: ErrorCode, detail: impl Into<String>) -> RuleError {
    RuleError::new(code, detail)
}

/// Per-transaction checks that do not require chain context (part of
/// step 2 of `check_block_sanity`).
pub fn check_transaction_sanity(tx: &Transaction) -> Result<(), RuleError> {
    if tx.inputs.is_empty() {
        return Err(err(ErrorCode::ErrBadTxInput, "transaction has no inputs"));
    }
    if tx.outputs.is_empty() {
        return Err(err(ErrorCode::ErrBadTxOutput, "transaction has no outputs"));
    }

    let mut total: i64 = 0;
    for output in &tx.outputs {
        if output.value < 0 || output.value > MAX_MONEY {
            return Err(err(
                ErrorCode::ErrBadTxOutValue,
                format!("output value {} outside [0, MAX_MONEY]", output.value),
            ));
        }
        total = total.checked_add(output.value).ok_or_else(|| {
            err(ErrorCode::ErrBadTxOutValue, "sum of output values overflows")
        })?;
        if total > MAX_MONEY {
            return Err(err(
                ErrorCode::ErrBadTxOutValue,
                "sum of output values exceeds MAX_MONEY",
            ));
        }
    }

    let is_coinbase = tx.is_coinbase();
    if is_coinbase {
        let len = tx.inputs[0].signature_script.len();
        if !(MIN_COINBASE_SCRIPT_LEN..=MAX_COINBASE_SCRIPT_LEN).contains(&len) {
            return Err(err(
                ErrorCode::ErrBadTxInput,
                format!("coinbase signature script length {len} outside [2, 100]"),
            ));
        }
    } else {
        for input in &tx.inputs {
            if input.previous_output.is_null() {
                return Err(err(
                    ErrorCode::ErrBadTxInput,
                    "non-coinbase input references the null outpoint",
                ));
            }
        }
    }

    let mut seen = std::collections::HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(input.previous_output) {
            return Err(err(
                ErrorCode::ErrDuplicateTxInputs,
                format!("duplicate input outpoint {:?}", input.previous_output),
            ));
        }
    }

    Ok(())
}

/// `check_block_sanity` — every context-free rule from `spec.md` §4.5,
/// run in order so the first violation determines the reported code.
pub fn check_block_sanity(
    block: &Block,
    pow_limit: &BigUint,
    time_source: &dyn TimeSource,
) -> Result<(), RuleError> {
    check_block_sanity_impl(block, pow_limit, time_source, false)
}

/// Skips the PoW-vs-target comparison entirely, used by
/// `CheckConnectBlockTemplate` (`spec.md` §4.9) where the nonce is
/// unconstrained. Every other check still applies.
pub fn check_block_sanity_no_pow(
    block: &Block,
    pow_limit: &BigUint,
    time_source: &dyn TimeSource,
) -> Result<(), RuleError> {
    check_block_sanity_impl(block, pow_limit, time_source, true)
}

fn check_block_sanity_impl(
    block: &Block,
    pow_limit: &BigUint,
    time_source: &dyn TimeSource,
    skip_pow: bool,
) -> Result<(), RuleError> {
    if block.transactions.is_empty() {
        return Err(err(ErrorCode::ErrNoTransactions, "block has no transactions"));
    }
    if !block.transactions[0].is_coinbase() {
        return Err(err(
            ErrorCode::ErrFirstTxNotCoinbase,
            "first transaction is not coinbase",
        ));
    }
    for tx in &block.transactions[1..] {
        if tx.is_coinbase() {
            return Err(err(
                ErrorCode::ErrMultipleCoinbases,
                "non-first transaction is coinbase",
            ));
        }
    }
    for tx in &block.transactions {
        check_transaction_sanity(tx)?;
    }

    let target = bits_to_target(block.header.bits, pow_limit)?;
    if !skip_pow {
        let hash_value = block.hash().to_be_uint();
        if hash_value > target {
            return Err(err(
                ErrorCode::ErrInvalidPoW,
                "block hash does not meet the target implied by bits",
            ));
        }
    }
    if &target > pow_limit {
        return Err(err(
            ErrorCode::ErrInvalidPoW,
            "target implied by bits exceeds the network PoW limit",
        ));
    }

    if !block.header.has_second_precision() {
        return Err(err(
            ErrorCode::ErrInvalidTime,
            "header timestamp carries a sub-second component",
        ));
    }
    let deadline = time_source.adjusted_now() + chrono::Duration::seconds(MAX_FUTURE_DRIFT_SECONDS);
    if block.header.timestamp > deadline {
        return Err(err(
            ErrorCode::ErrTimeTooNew,
            "header timestamp is more than 2 hours in the future",
        ));
    }

    let size = block.serialized_size();
    if size > MAX_BLOCK_SERIALIZED_SIZE || size * 4 > MAX_BLOCK_WEIGHT {
        return Err(err(ErrorCode::ErrBlockTooBig, format!("block size {size} exceeds limit")));
    }

    if !block.merkle_root_matches() {
        return Err(err(ErrorCode::ErrBadMerkleRoot, "merkle root mismatch"));
    }

    Ok(())
}
