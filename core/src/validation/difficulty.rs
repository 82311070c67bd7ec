//! Difficulty retarget (§4.6.1): legacy Bitcoin-style and DGW3.

use num_bigint::BigUint;
use num_traits::Zero;
use std::sync::Arc;

use crate::compact::{bits_to_target, target_to_bits};
use crate::index::{BlockIndex, BlockIndexNode};
use crate::params::ChainParams;

/// Clamps `value` to `[low, high]`.
fn clamp(value: i64, low: i64, high: i64) -> i64 {
    value.max(low).min(high)
}

/// The `bits` value required of a block that extends `parent`, given
/// its candidate timestamp. Selects the legacy or DGW3 regime by the
/// height the new block would have relative to `DGW3SwitchHeight`.
pub fn next_required_bits(
    index: &BlockIndex,
    parent: &Arc<BlockIndexNode>,
    candidate_timestamp_secs: i64,
    params: &ChainParams,
) -> u32 {
    let next_height = parent.height + 1;

    if params.reduce_min_difficulty {
        let allowed_gap = params.min_diff_reduction_time.as_secs() as i64;
        if candidate_timestamp_secs - parent.header.timestamp_secs() > allowed_gap {
            return params.pow_limit_bits;
        }
    }

    if next_height >= params.dgw3_switch_height {
        dgw3_next_bits(index, parent, params)
    } else {
        legacy_next_bits(index, parent, params)
    }
}

fn legacy_next_bits(index: &BlockIndex, parent: &Arc<BlockIndexNode>, params: &ChainParams) -> u32 {
    let interval = params.retarget_interval_blocks();
    let next_height = parent.height as i64 + 1;

    if interval <= 1 || next_height % interval != 0 {
        return parent.header.bits;
    }

    let lookback_height = (parent.height as i64 - (interval - 1)).max(0) as i32;
    let first = match index.ancestor(parent, lookback_height) {
        Some(n) => n,
        None => return parent.header.bits,
    };

    let actual = parent.header.timestamp_secs() - first.header.timestamp_secs();
    let span = params.target_timespan_secs();
    let factor = params.retarget_adjustment_factor.max(1);
    let clamped = clamp(actual, span / factor, span * factor);

    let old_target = bits_to_target(parent.header.bits, &params.pow_limit)
        .unwrap_or_else(|_| params.pow_limit.clone());
    let mut new_target = (&old_target * BigUint::from(clamped as u64)) / BigUint::from(span as u64);
    if new_target > params.pow_limit {
        new_target = params.pow_limit.clone();
    }
    target_to_bits(&new_target)
}

/// Dark Gravity Wave v3: weighted moving average over the last 24
/// blocks, each weighted by its recency (the most recent block weighs
/// 24, the oldest of the window weighs 1).
fn dgw3_next_bits(index: &BlockIndex, parent: &Arc<BlockIndexNode>, params: &ChainParams) -> u32 {
    const WINDOW: i32 = 24;

    if parent.height + 1 <= WINDOW {
        return parent.header.bits;
    }

    let mut weighted_sum = BigUint::zero();
    let mut weight_total: u64 = 0;
    let mut cursor = parent.clone();
    for i in 1..=WINDOW as u64 {
        let target = bits_to_target(cursor.header.bits, &params.pow_limit)
            .unwrap_or_else(|_| params.pow_limit.clone());
        weighted_sum += &target * BigUint::from(i);
        weight_total += i;
        if let Some(next) = cursor.parent.clone() {
            cursor = next;
        } else {
            break;
        }
    }
    let weighted_avg = weighted_sum / BigUint::from(weight_total);

    let window_start = index
        .ancestor(parent, parent.height - WINDOW)
        .unwrap_or_else(|| cursor.clone());
    let actual_timespan = parent.header.timestamp_secs() - window_start.header.timestamp_secs();
    let target_timespan = WINDOW as i64 * params.target_time_per_block_secs();
    let clamped_timespan = clamp(actual_timespan, target_timespan / 3, target_timespan * 3);

    let mut new_target =
        (&weighted_avg * BigUint::from(clamped_timespan.max(1) as u64)) / BigUint::from(target_timespan.max(1) as u64);
    if new_target.is_zero() {
        new_target = weighted_avg;
    }
    if new_target > params.pow_limit {
        new_target = params.pow_limit.clone();
    }
    target_to_bits(&new_target)
}
