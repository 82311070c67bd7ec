//! Contextual validators (C7, `spec.md` §4.6).
//!
//! Unlike the sanity pass, every check here needs the parent node (or
//! the chain parameters) to decide anything.

use std::sync::Arc;

use crate::error::{ErrorCode, RuleError};
use crate::index::{BlockIndex, BlockIndexNode};
use crate::params::ChainParams;
use crate::primitives::Block;
use crate::validation::difficulty::next_required_bits;

fn err(code: ErrorCode, detail: impl Into<String>) -> RuleError {
    RuleError::new(code, detail)
}

/// Minimum block version required once height reaches the given BIP
/// activation height; versions below that threshold are accepted at
/// any height that hasn't reached it.
fn min_version_for_height(height: i32, params: &ChainParams) -> i32 {
    let mut min = 1;
    if height >= params.bip0034_height {
        min = 2;
    }
    if height >= params.bip0066_height {
        min = 3;
    }
    if height >= params.bip0065_height {
        min = 4;
    }
    min
}

/// `check_block_header_context`: retarget, MTP ordering, and the
/// height-gated minimum version.
pub fn check_block_header_context(
    index: &BlockIndex,
    header_node: &Arc<BlockIndexNode>,
    parent: &Arc<BlockIndexNode>,
    params: &ChainParams,
) -> Result<(), RuleError> {
    let expected_bits = next_required_bits(
        index,
        parent,
        header_node.header.timestamp_secs(),
        params,
    );
    if header_node.header.bits != expected_bits {
        return Err(err(
            ErrorCode::ErrUnexpectedDifficulty,
            format!(
                "block bits {:#010x} does not match retargeted {:#010x}",
                header_node.header.bits, expected_bits
            ),
        ));
    }

    let parent_mtp = index.median_time_past(parent);
    if header_node.header.timestamp_secs() <= parent_mtp {
        return Err(err(
            ErrorCode::ErrTimeTooOld,
            "timestamp is not strictly greater than the parent's median time past",
        ));
    }

    let min_version = min_version_for_height(header_node.height, params);
    if header_node.header.version < min_version {
        return Err(err(
            ErrorCode::ErrMalformedBlock,
            format!(
                "block version {} below height-gated minimum {min_version}",
                header_node.header.version
            ),
        ));
    }

    Ok(())
}

/// Decodes a coinbase `sigScript`'s serialized-height push per BIP34:
/// the first byte is a direct-push opcode (1..=8 bytes of payload),
/// the payload is the minimal little-endian signed encoding of the
/// height. Any deviation from that shape — including a missing or
/// truncated push — is reported as "missing" rather than "bad", per
/// `spec.md` §8 scenario 4.
pub fn parse_serialized_height(sig_script: &[u8]) -> Result<i32, RuleError> {
    let missing = || err(ErrorCode::ErrMissingCoinbaseHeight, "no serialized height push found");

    let push_len = *sig_script.first().ok_or_else(missing)? as usize;
    if push_len == 0 || push_len > 8 {
        return Err(missing());
    }
    if sig_script.len() < 1 + push_len {
        return Err(missing());
    }
    let bytes = &sig_script[1..1 + push_len];

    let mut value: i64 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        value |= (b as i64) << (8 * i);
    }
    if bytes[bytes.len() - 1] & 0x80 != 0 {
        let sign_bit = 0x80i64 << (8 * (bytes.len() - 1));
        value = -(value & !sign_bit);
    }
    Ok(value as i32)
}

/// `check_block_context`: once `height >= BIP0034Height`, the
/// coinbase's `sigScript` must begin with the minimal push of `height`.
pub fn check_block_context(block: &Block, height: i32, params: &ChainParams) -> Result<(), RuleError> {
    if height >= params.bip0034_height {
        let coinbase = &block.transactions[0];
        let parsed = parse_serialized_height(&coinbase.inputs[0].signature_script)?;
        if parsed != height {
            return Err(err(
                ErrorCode::ErrBadCoinbaseHeight,
                format!("coinbase height push {parsed} does not match expected height {height}"),
            ));
        }
    }
    Ok(())
}

/// Enforces the network's hard checkpoints against a candidate node:
/// an exact height match must carry the checkpointed hash, and any
/// node whose ancestry diverges from (or simply predates) the most
/// recent checkpoint at or below its height is rejected outright.
pub fn check_checkpoints(
    index: &BlockIndex,
    node: &Arc<BlockIndexNode>,
    params: &ChainParams,
) -> Result<(), RuleError> {
    if let Some(cp) = params.checkpoints.iter().find(|c| c.height == node.height) {
        if cp.hash != node.hash {
            return Err(err(
                ErrorCode::ErrBadCheckpoint,
                format!("block at checkpointed height {} does not match the checkpoint hash", cp.height),
            ));
        }
    }

    let Some(cp) = params.checkpoints.iter().filter(|c| c.height <= node.height).max_by_key(|c| c.height) else {
        return Ok(());
    };

    match index.ancestor(node, cp.height) {
        Some(ancestor) if ancestor.hash == cp.hash => {}
        _ => {
            return Err(err(
                ErrorCode::ErrForkTooOld,
                format!("candidate's ancestry diverges from the checkpoint at height {}", cp.height),
            ))
        }
    }

    let checkpoint_time = index.lookup(&cp.hash).map(|n| n.header.timestamp_secs());
    if let Some(checkpoint_time) = checkpoint_time {
        if node.header.timestamp_secs() < checkpoint_time {
            return Err(err(
                ErrorCode::ErrCheckpointTimeTooOld,
                "block timestamp predates the checkpoint it must descend from",
            ));
        }
    }

    Ok(())
}

/// Every transaction's `lock_time` must be final at `(height, mtp)`.
pub fn check_transactions_final(
    block: &Block,
    height: i32,
    mtp_seconds: i64,
) -> Result<(), RuleError> {
    for tx in &block.transactions {
        if !tx.is_final(height, mtp_seconds) {
            return Err(err(
                ErrorCode::ErrMalformedBlock,
                "transaction lock_time is not final at this height/mtp",
            ));
        }
    }
    Ok(())
}

/// Encodes `height` as the minimal signed little-endian push BIP34
/// expects, for use by template/mining code constructing a coinbase.
pub fn encode_serialized_height(height: i32) -> Vec<u8> {
    if height == 0 {
        return vec![0x01, 0x00];
    }
    let negative = height < 0;
    let mut magnitude = height.unsigned_abs();
    let mut bytes = Vec::new();
    while magnitude > 0 {
        bytes.push((magnitude & 0xff) as u8);
        magnitude >>= 8;
    }
    if bytes.last().copied().unwrap_or(0) & 0x80 != 0 {
        bytes.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        *bytes.last_mut().unwrap() |= 0x80;
    }
    let mut out = vec![bytes.len() as u8];
    out.extend(bytes);
    out
}
