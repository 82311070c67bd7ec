//! Opcode constants for the subset of the script language this
//! verifier actually evaluates (`spec.md` §4.8): P2PKH, P2SH (BIP16),
//! CHECKLOCKTIMEVERIFY (BIP65), and strict-DER signatures (BIP66).

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;

pub const OP_NOP: u8 = 0x61;
pub const OP_IF: u8 = 0x63;
pub const OP_NOTIF: u8 = 0x64;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_RETURN: u8 = 0x6a;

pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;

pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

/// BIP65: fails unless the top stack item is a valid and satisfied
/// `lock_time` constraint.
pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
/// BIP112: fails unless the top stack item is a satisfied relative
/// lock (`spec.md`'s `SequenceLock`).
pub const OP_CHECKSEQUENCEVERIFY: u8 = 0xb2;

/// `true` for the `OP_1`..`OP_16` small-integer push range.
pub fn is_small_int_push(op: u8) -> bool {
    (OP_1..=OP_16).contains(&op)
}

pub fn small_int_value(op: u8) -> i64 {
    (op - OP_1 + 1) as i64
}
