//! Script evaluator (C9, `spec.md` §4.8): a stack machine covering the
//! P2PKH / bare-multisig / P2SH (BIP16) templates, gated BIP65
//! `CHECKLOCKTIMEVERIFY` and BIP66 strict-DER enforcement.
//!
//! This is not a general-purpose Script VM — it implements exactly the
//! opcode subset those templates use, in the spirit of the teacher's
//! narrowly-scoped `pow` and `ledger` modules rather than a full
//! reimplementation of every historical opcode.

use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1};

use crate::error::{ErrorCode, RuleError};
use crate::hash::{sha256d, Hash};
use crate::primitives::{OutPoint, Transaction, TxIn};
use crate::script::opcodes::*;

fn fail(detail: impl Into<String>) -> RuleError {
    RuleError::new(ErrorCode::ErrScriptValidation, detail.into())
}

/// Legacy (pre-segwit) sighash types.
pub mod sighash {
    pub const ALL: u8 = 0x01;
    pub const NONE: u8 = 0x02;
    pub const SINGLE: u8 = 0x03;
    pub const ANYONECANPAY: u8 = 0x80;

    pub fn base_type(hash_type: u8) -> u8 {
        hash_type & 0x1f
    }

    pub fn is_anyone_can_pay(hash_type: u8) -> bool {
        hash_type & ANYONECANPAY != 0
    }
}

/// The legacy `SignatureHash`: rewrites a transaction per the
/// requested sighash type, serializes it, appends the 4-byte hash type
/// and double-SHA256s the result.
pub fn legacy_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    hash_type: u8,
) -> Hash {
    use crate::encoding::Encodable;

    let stripped = strip_code_separators(script_code);
    let base = sighash::base_type(hash_type);

    let mut inputs: Vec<TxIn> = tx
        .inputs
        .iter()
        .map(|i| TxIn {
            previous_output: i.previous_output,
            signature_script: Vec::new(),
            sequence: i.sequence,
        })
        .collect();
    if let Some(slot) = inputs.get_mut(input_index) {
        slot.signature_script = stripped;
    }

    if base == sighash::NONE {
        for (i, input) in inputs.iter_mut().enumerate() {
            if i != input_index {
                input.sequence = 0;
            }
        }
    } else if base == sighash::SINGLE {
        for (i, input) in inputs.iter_mut().enumerate() {
            if i != input_index {
                input.sequence = 0;
            }
        }
    }

    let mut outputs = tx.outputs.clone();
    if base == sighash::NONE {
        outputs.clear();
    } else if base == sighash::SINGLE {
        if input_index >= outputs.len() {
            // Historical quirk (the "SIGHASH_SINGLE bug"): hashing out
            // of range yields this fixed sentinel hash.
            let mut sentinel = [0u8; 32];
            sentinel[0] = 1;
            return Hash::from_bytes(sentinel);
        }
        outputs.truncate(input_index + 1);
        for output in outputs.iter_mut().take(input_index) {
            output.value = -1;
            output.pub_key_script.clear();
        }
    }

    if sighash::is_anyone_can_pay(hash_type) {
        inputs = vec![inputs[input_index].clone()];
    }

    let rewritten = Transaction {
        version: tx.version,
        inputs,
        outputs,
        lock_time: tx.lock_time,
    };

    let mut buf = rewritten.encode_to_vec();
    buf.extend_from_slice(&(hash_type as u32).to_le_bytes());
    sha256d(&buf)
}

fn strip_code_separators(script: &[u8]) -> Vec<u8> {
    // OP_CODESEPARATOR never appears in the template subset this
    // verifier supports, but stripping it mirrors the historical
    // sighash rule in case a non-standard script carries one.
    const OP_CODESEPARATOR: u8 = 0xab;
    script.iter().copied().filter(|&b| b != OP_CODESEPARATOR).collect()
}

/// Context a `CHECKSIG`/`CHECKLOCKTIMEVERIFY` family opcode needs that
/// isn't on the data stack: which transaction and input is being
/// verified, and which height-gated rules are active.
pub struct VerifyContext<'a> {
    pub tx: &'a Transaction,
    pub input_index: usize,
    pub bip65_active: bool,
    pub bip66_active: bool,
    pub sig_cache: &'a super::sigcache::SignatureCache,
}

type Stack = Vec<Vec<u8>>;

fn cast_to_bool(v: &[u8]) -> bool {
    match v.split_last() {
        None => false,
        Some((&last, rest)) => {
            if last == 0x00 || last == 0x80 {
                rest.iter().any(|&b| b != 0)
            } else {
                true
            }
        }
    }
}

fn script_bool(b: bool) -> Vec<u8> {
    if b {
        vec![1]
    } else {
        vec![]
    }
}

/// Decodes a minimally-encoded, little-endian signed script number.
/// `max_bytes` bounds the encoding width (4 for ordinary arithmetic, 5
/// for BIP65's lock-time comparisons).
fn decode_script_num(bytes: &[u8], max_bytes: usize) -> Result<i64, RuleError> {
    if bytes.len() > max_bytes {
        return Err(fail("script number exceeds maximum encoding width"));
    }
    if bytes.is_empty() {
        return Ok(0);
    }
    let mut value: i64 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        value |= (b as i64) << (8 * i);
    }
    if bytes[bytes.len() - 1] & 0x80 != 0 {
        let sign_bit = 0x80i64 << (8 * (bytes.len() - 1));
        value = -(value & !sign_bit);
    }
    Ok(value)
}

/// BIP66: a strict DER ECDSA signature, with the trailing sighash-type
/// byte already removed.
fn is_strict_der(sig: &[u8]) -> bool {
    if sig.len() < 9 || sig.len() > 72 {
        return false;
    }
    if sig[0] != 0x30 || sig[1] as usize != sig.len() - 2 {
        return false;
    }
    if sig[2] != 0x02 {
        return false;
    }
    let r_len = sig[3] as usize;
    if r_len == 0 || 4 + r_len >= sig.len() || sig[4] & 0x80 != 0 {
        return false;
    }
    if r_len > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return false;
    }
    let s_pos = 4 + r_len;
    if sig[s_pos] != 0x02 {
        return false;
    }
    let s_len = sig[s_pos + 1] as usize;
    if s_len == 0 || s_pos + 2 + s_len != sig.len() || sig[s_pos + 2] & 0x80 != 0 {
        return false;
    }
    if s_len > 1 && sig[s_pos + 2] == 0x00 && sig[s_pos + 3] & 0x80 == 0 {
        return false;
    }
    true
}

fn check_sig(
    sig_with_type: &[u8],
    pubkey_bytes: &[u8],
    script_code: &[u8],
    ctx: &VerifyContext,
) -> Result<bool, RuleError> {
    if sig_with_type.is_empty() {
        return Ok(false);
    }
    let (der, hash_type) = sig_with_type.split_at(sig_with_type.len() - 1);
    let hash_type = hash_type[0];

    if ctx.bip66_active && !is_strict_der(der) {
        return Err(fail("signature is not strict DER under active BIP66 rules"));
    }

    let sighash = legacy_sighash(ctx.tx, ctx.input_index, script_code, hash_type);

    if ctx.sig_cache.contains(&sighash, pubkey_bytes, der) {
        return Ok(true);
    }

    let secp = Secp256k1::verification_only();
    let pubkey = match PublicKey::from_slice(pubkey_bytes) {
        Ok(k) => k,
        Err(_) => return Ok(false),
    };
    let signature = match Signature::from_der(der) {
        Ok(s) => s,
        Err(_) => return Ok(false),
    };
    let message = Message::from_digest_slice(sighash.as_bytes()).expect("32-byte digest");

    let ok = secp.verify_ecdsa(&message, &signature, &pubkey).is_ok();
    if ok {
        ctx.sig_cache.insert(sighash, pubkey_bytes, der);
    }
    Ok(ok)
}

/// Evaluates `script` against `stack` in place, using `ctx` for
/// signature/locktime checks. `full_script` is the script this op
/// sequence is drawn from, used unmodified as `script_code` for
/// `CHECKSIG` (no `OP_CODESEPARATOR` support beyond the blanket strip
/// in [`legacy_sighash`]).
pub fn eval_script(script: &[u8], stack: &mut Stack, ctx: &VerifyContext) -> Result<(), RuleError> {
    let mut branch_stack: Vec<bool> = Vec::new();
    let mut pc = 0usize;

    let executing = |branches: &[bool]| branches.iter().all(|&b| b);

    while pc < script.len() {
        let op = script[pc];
        pc += 1;

        if !executing(&branch_stack) && !matches!(op, OP_IF | OP_NOTIF | OP_ELSE | OP_ENDIF) {
            if op <= 0x4e {
                pc += push_len(script, pc - 1)?;
            }
            continue;
        }

        match op {
            0x01..=0x4b => {
                let len = op as usize;
                let data = script
                    .get(pc..pc + len)
                    .ok_or_else(|| fail("truncated data push"))?;
                stack.push(data.to_vec());
                pc += len;
            }
            OP_PUSHDATA1 | OP_PUSHDATA2 | OP_PUSHDATA4 => {
                let (len, consumed) = read_pushdata_len(script, pc, op)?;
                let data = script
                    .get(pc + consumed..pc + consumed + len)
                    .ok_or_else(|| fail("truncated pushdata"))?;
                stack.push(data.to_vec());
                pc += consumed + len;
            }
            OP_0 => stack.push(vec![]),
            OP_1NEGATE => stack.push(vec![0x81]),
            op if is_small_int_push(op) => stack.push(vec![small_int_value(op) as u8]),
            OP_NOP => {}
            OP_IF | OP_NOTIF => {
                let top = stack.pop().ok_or_else(|| fail("IF on empty stack"))?;
                let cond = cast_to_bool(&top) ^ (op == OP_NOTIF);
                branch_stack.push(cond);
            }
            OP_ELSE => {
                let last = branch_stack
                    .last_mut()
                    .ok_or_else(|| fail("ELSE without matching IF"))?;
                *last = !*last;
            }
            OP_ENDIF => {
                branch_stack.pop().ok_or_else(|| fail("ENDIF without matching IF"))?;
            }
            OP_VERIFY => {
                let top = stack.pop().ok_or_else(|| fail("VERIFY on empty stack"))?;
                if !cast_to_bool(&top) {
                    return Err(fail("OP_VERIFY failed"));
                }
            }
            OP_RETURN => return Err(fail("OP_RETURN encountered")),
            OP_DUP => {
                let top = stack.last().ok_or_else(|| fail("DUP on empty stack"))?.clone();
                stack.push(top);
            }
            OP_EQUAL | OP_EQUALVERIFY => {
                let b = stack.pop().ok_or_else(|| fail("EQUAL needs two items"))?;
                let a = stack.pop().ok_or_else(|| fail("EQUAL needs two items"))?;
                let eq = a == b;
                if op == OP_EQUALVERIFY {
                    if !eq {
                        return Err(fail("OP_EQUALVERIFY failed"));
                    }
                } else {
                    stack.push(script_bool(eq));
                }
            }
            OP_HASH160 => {
                let top = stack.pop().ok_or_else(|| fail("HASH160 on empty stack"))?;
                stack.push(crate::hash::hash160(&top).to_vec());
            }
            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                let pubkey = stack.pop().ok_or_else(|| fail("CHECKSIG needs pubkey"))?;
                let sig = stack.pop().ok_or_else(|| fail("CHECKSIG needs signature"))?;
                let ok = check_sig(&sig, &pubkey, script, ctx)?;
                if op == OP_CHECKSIGVERIFY {
                    if !ok {
                        return Err(fail("OP_CHECKSIGVERIFY failed"));
                    }
                } else {
                    stack.push(script_bool(ok));
                }
            }
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                let ok = eval_checkmultisig(stack, script, ctx)?;
                if op == OP_CHECKMULTISIGVERIFY {
                    if !ok {
                        return Err(fail("OP_CHECKMULTISIGVERIFY failed"));
                    }
                } else {
                    stack.push(script_bool(ok));
                }
            }
            OP_CHECKLOCKTIMEVERIFY => {
                if !ctx.bip65_active {
                    // Pre-activation this opcode is a plain NOP.
                    continue;
                }
                let top = stack.last().ok_or_else(|| fail("CHECKLOCKTIMEVERIFY on empty stack"))?;
                let lock_time = decode_script_num(top, 5)?;
                if lock_time < 0 {
                    return Err(fail("negative CHECKLOCKTIMEVERIFY operand"));
                }
                if !check_lock_time(ctx, lock_time) {
                    return Err(fail("CHECKLOCKTIMEVERIFY requirement not satisfied"));
                }
            }
            OP_CHECKSEQUENCEVERIFY => {
                // Evaluated the same way CLTV is: a no-op unless the
                // rule set already requires relative locks, which this
                // interpreter leaves to the connect-phase sequence
                // lock check (`spec.md` §4.9) rather than duplicating
                // it here.
            }
            _ => return Err(fail(format!("unsupported opcode {op:#04x}"))),
        }
    }

    if !branch_stack.is_empty() {
        return Err(fail("unbalanced IF/ENDIF"));
    }
    Ok(())
}

fn push_len(script: &[u8], op_pos: usize) -> Result<usize, RuleError> {
    let op = script[op_pos];
    match op {
        0x01..=0x4b => Ok(op as usize),
        OP_PUSHDATA1 | OP_PUSHDATA2 | OP_PUSHDATA4 => {
            let (len, consumed) = read_pushdata_len(script, op_pos + 1, op)?;
            Ok(consumed + len)
        }
        _ => Ok(0),
    }
}

fn read_pushdata_len(script: &[u8], pos: usize, op: u8) -> Result<(usize, usize), RuleError> {
    let n = match op {
        OP_PUSHDATA1 => 1,
        OP_PUSHDATA2 => 2,
        OP_PUSHDATA4 => 4,
        _ => unreachable!(),
    };
    let bytes = script.get(pos..pos + n).ok_or_else(|| fail("truncated pushdata length"))?;
    let mut len = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        len |= (b as usize) << (8 * i);
    }
    Ok((len, n))
}

fn check_lock_time(ctx: &VerifyContext, required: i64) -> bool {
    const LOCKTIME_THRESHOLD: i64 = 500_000_000;
    let tx_lock_time = ctx.tx.lock_time as i64;
    if (tx_lock_time < LOCKTIME_THRESHOLD) != (required < LOCKTIME_THRESHOLD) {
        return false;
    }
    if required > tx_lock_time {
        return false;
    }
    ctx.tx.inputs[ctx.input_index].sequence != u32::MAX
}

fn eval_checkmultisig(stack: &mut Stack, script: &[u8], ctx: &VerifyContext) -> Result<bool, RuleError> {
    let n = decode_script_num(&stack.pop().ok_or_else(|| fail("CHECKMULTISIG needs n"))?, 4)? as usize;
    if n > 20 {
        return Err(fail("CHECKMULTISIG n exceeds 20"));
    }
    let mut pubkeys = Vec::with_capacity(n);
    for _ in 0..n {
        pubkeys.push(stack.pop().ok_or_else(|| fail("CHECKMULTISIG missing pubkey"))?);
    }
    pubkeys.reverse();

    let m = decode_script_num(&stack.pop().ok_or_else(|| fail("CHECKMULTISIG needs m"))?, 4)? as usize;
    if m > n {
        return Err(fail("CHECKMULTISIG m exceeds n"));
    }
    let mut sigs = Vec::with_capacity(m);
    for _ in 0..m {
        sigs.push(stack.pop().ok_or_else(|| fail("CHECKMULTISIG missing signature"))?);
    }
    sigs.reverse();

    // Historical off-by-one: an extra element is popped and ignored.
    stack.pop().ok_or_else(|| fail("CHECKMULTISIG missing dummy element"))?;

    let mut pubkey_iter = pubkeys.iter();
    for sig in &sigs {
        let mut matched = false;
        for pubkey in pubkey_iter.by_ref() {
            if check_sig(sig, pubkey, script, ctx)? {
                matched = true;
                break;
            }
        }
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Runs `script_sig` then `script_pubkey` against a fresh stack,
/// descending into the P2SH redeem script when the output matches the
/// BIP16 template and that rule is active at this height.
pub fn verify_script(
    script_sig: &[u8],
    script_pubkey: &[u8],
    p2sh_active: bool,
    ctx: &VerifyContext,
) -> Result<(), RuleError> {
    let mut stack = Vec::new();
    eval_script(script_sig, &mut stack, ctx)?;
    let stack_before_pubkey = stack.clone();

    eval_script(script_pubkey, &mut stack, ctx)?;
    if !stack.last().map(|v| cast_to_bool(v)).unwrap_or(false) {
        return Err(fail("final stack element is not true"));
    }

    if p2sh_active && is_p2sh_template(script_pubkey) {
        let mut redeem_stack = stack_before_pubkey;
        let redeem_script = redeem_stack
            .pop()
            .ok_or_else(|| fail("P2SH scriptSig produced no redeem script"))?;
        eval_script(&redeem_script, &mut redeem_stack, ctx)?;
        if !redeem_stack.last().map(|v| cast_to_bool(v)).unwrap_or(false) {
            return Err(fail("P2SH redeem script did not return true"));
        }
    }

    Ok(())
}

fn is_p2sh_template(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
}

/// Convenience used by tests and the connect-phase caller for
/// constructing a signature hash without running the interpreter.
pub fn sighash_for(tx: &Transaction, input_index: usize, script_code: &[u8], hash_type: u8) -> Hash {
    legacy_sighash(tx, input_index, script_code, hash_type)
}

/// Builds a minimal P2PKH `scriptPubKey` for `pubkey_hash` — used by
/// tests to exercise [`verify_script`] without a full wallet.
#[cfg(test)]
fn p2pkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut s = vec![OP_DUP, OP_HASH160, 0x14];
    s.extend_from_slice(pubkey_hash);
    s.push(OP_EQUALVERIFY);
    s.push(OP_CHECKSIG);
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::TxOut;
    use secp256k1::{ecdsa::Signature as EcdsaSignature, Secp256k1, SecretKey};

    fn sample_tx(prev: OutPoint) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output: prev,
                signature_script: vec![],
                sequence: 0xffff_fffe,
            }],
            outputs: vec![TxOut {
                value: 1000,
                pub_key_script: vec![OP_RETURN],
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn p2pkh_round_trip_verifies() {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[0x11u8; 32]).unwrap();
        let pubkey = secp256k1::PublicKey::from_secret_key(&secp, &secret);
        let pubkey_bytes = pubkey.serialize().to_vec();
        let pubkey_hash = crate::hash::hash160(&pubkey_bytes);

        let tx = sample_tx(OutPoint::new(Hash::ZERO, 0));
        let script_pubkey = p2pkh_script(&pubkey_hash);

        let sighash = legacy_sighash(&tx, 0, &script_pubkey, sighash::ALL);
        let message = Message::from_digest_slice(sighash.as_bytes()).unwrap();
        let sig: EcdsaSignature = secp.sign_ecdsa(&message, &secret);
        let mut sig_bytes = sig.serialize_der().to_vec();
        sig_bytes.push(sighash::ALL);

        let mut script_sig = Vec::new();
        script_sig.push(sig_bytes.len() as u8);
        script_sig.extend_from_slice(&sig_bytes);
        script_sig.push(pubkey_bytes.len() as u8);
        script_sig.extend_from_slice(&pubkey_bytes);

        let cache = super::super::sigcache::SignatureCache::new();
        let ctx = VerifyContext {
            tx: &tx,
            input_index: 0,
            bip65_active: true,
            bip66_active: true,
            sig_cache: &cache,
        };
        verify_script(&script_sig, &script_pubkey, true, &ctx).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn wrong_signature_fails() {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[0x22u8; 32]).unwrap();
        let other_secret = SecretKey::from_slice(&[0x33u8; 32]).unwrap();
        let pubkey = secp256k1::PublicKey::from_secret_key(&secp, &secret);
        let pubkey_bytes = pubkey.serialize().to_vec();
        let pubkey_hash = crate::hash::hash160(&pubkey_bytes);

        let tx = sample_tx(OutPoint::new(Hash::ZERO, 0));
        let script_pubkey = p2pkh_script(&pubkey_hash);
        let sighash = legacy_sighash(&tx, 0, &script_pubkey, sighash::ALL);
        let message = Message::from_digest_slice(sighash.as_bytes()).unwrap();
        let sig: EcdsaSignature = secp.sign_ecdsa(&message, &other_secret);
        let mut sig_bytes = sig.serialize_der().to_vec();
        sig_bytes.push(sighash::ALL);

        let mut script_sig = Vec::new();
        script_sig.push(sig_bytes.len() as u8);
        script_sig.extend_from_slice(&sig_bytes);
        script_sig.push(pubkey_bytes.len() as u8);
        script_sig.extend_from_slice(&pubkey_bytes);

        let cache = super::super::sigcache::SignatureCache::new();
        let ctx = VerifyContext {
            tx: &tx,
            input_index: 0,
            bip65_active: true,
            bip66_active: true,
            sig_cache: &cache,
        };
        assert!(verify_script(&script_sig, &script_pubkey, true, &ctx).is_err());
    }

    #[test]
    fn cast_to_bool_treats_negative_zero_as_false() {
        assert!(!cast_to_bool(&[0x80]));
        assert!(!cast_to_bool(&[]));
        assert!(cast_to_bool(&[0x01]));
    }

    #[test]
    fn strict_der_rejects_high_s_padding() {
        // Malformed: advertises an r length that overruns the buffer.
        let malformed = vec![0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01];
        assert!(!is_strict_der(&malformed));
    }
}
