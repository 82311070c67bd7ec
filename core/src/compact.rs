//! Compact target (`nBits`) encoding and proof-of-work work arithmetic (C1).
//!
//! The 32-bit compact form packs a 256-bit unsigned target as a 1-byte
//! exponent plus a 3-byte mantissa, the same representation Bitcoin
//! uses. Conversions here operate on [`num_bigint::BigUint`] so the
//! full 256-bit range is exact; no `u128`/fixed-width shortcuts.

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::error::{ErrorCode, RuleError};

/// Decodes a compact `nBits` value into its implied 256-bit target.
///
/// Fails with [`ErrorCode::InvalidTarget`] if the implied value is
/// negative (the sign bit of the mantissa is set), zero, or exceeds
/// `pow_limit`.
pub fn bits_to_target(bits: u32, pow_limit: &BigUint) -> Result<BigUint, RuleError> {
    let exponent = (bits >> 24) as u32;
    let mantissa = bits & 0x007f_ffff;
    let is_negative = bits & 0x0080_0000 != 0;

    if is_negative {
        return Err(RuleError::new(
            ErrorCode::InvalidTarget,
            format!("compact target {bits:#010x} has the sign bit set"),
        ));
    }

    let target = if exponent <= 3 {
        BigUint::from(mantissa) >> (8 * (3 - exponent))
    } else {
        BigUint::from(mantissa) << (8 * (exponent - 3))
    };

    if target.is_zero() {
        return Err(RuleError::new(
            ErrorCode::InvalidTarget,
            format!("compact target {bits:#010x} decodes to zero"),
        ));
    }
    if &target > pow_limit {
        return Err(RuleError::new(
            ErrorCode::InvalidTarget,
            format!("compact target {bits:#010x} exceeds the network PoW limit"),
        ));
    }
    Ok(target)
}

/// Encodes a 256-bit target back into its compact `nBits` form.
///
/// This is lossy in the same way Bitcoin's encoding is lossy: only the
/// leading 23 significant bits of `target` survive. Callers that round
/// a freshly computed retarget value through this function and back
/// through [`bits_to_target`] get the value actually enforced on the
/// wire, which is intentional — the compact encoding itself is part of
/// consensus.
pub fn target_to_bits(target: &BigUint) -> u32 {
    if target.is_zero() {
        return 0;
    }
    let bytes = target.to_bytes_be();
    let mut size = bytes.len() as u32;
    let mut mantissa: u32 = if size <= 3 {
        let mut buf = [0u8; 4];
        let offset = 4 - bytes.len();
        buf[offset..].copy_from_slice(&bytes);
        u32::from_be_bytes(buf) << (8 * (3 - size))
    } else {
        u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
    };

    // If the high bit of the mantissa's top byte is set it would be
    // misread as a sign bit; shift right one byte and bump the exponent.
    if mantissa & 0x0080_0000 != 0 {
        mantissa >>= 8;
        size += 1;
    }

    (size << 24) | mantissa
}

/// Proof-of-work "work" contributed by a block with the given compact
/// target: `2^256 / (target + 1)`.
pub fn work_from_bits(bits: u32, pow_limit: &BigUint) -> BigUint {
    // Work is defined even for a target that is technically invalid in
    // isolation (cumulative work bookkeeping must still total something
    // sane for headers already accepted); fall back to the PoW limit's
    // work value if decoding fails rather than panicking.
    let target = bits_to_target(bits, pow_limit).unwrap_or_else(|_| pow_limit.clone());
    work_from_target(&target)
}

pub fn work_from_target(target: &BigUint) -> BigUint {
    let numerator = BigUint::one() << 256;
    &numerator / (target + BigUint::one())
}
