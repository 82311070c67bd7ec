//! Transactions, their inputs/outputs, and relative sequence locks (C2).

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::encoding::{read_seq, read_var_bytes, write_seq, write_var_bytes, Decodable, Encodable};
use crate::hash::{sha256d, Hash};

use super::outpoint::OutPoint;

/// Maximum representable amount in satoshi-equivalent units. Output
/// values, and their sums, must never exceed this.
pub const MAX_MONEY: i64 = 21_000_000 * 100_000_000;

/// A reasonable upper bound on the number of inputs/outputs decoded
/// from a single transaction, to bound allocation before a full block
/// size check has run.
const MAX_TX_IN_OUT: u64 = 1_000_000;
const MAX_SCRIPT_LEN: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub signature_script: Vec<u8>,
    pub sequence: u32,
}

impl Encodable for TxIn {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.previous_output.encode(w)?;
        write_var_bytes(w, &self.signature_script)?;
        self.sequence.encode(w)
    }
}

impl Decodable for TxIn {
    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(TxIn {
            previous_output: OutPoint::decode(r)?,
            signature_script: read_var_bytes(r, MAX_SCRIPT_LEN)?,
            sequence: u32::decode(r)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: i64,
    pub pub_key_script: Vec<u8>,
}

impl Encodable for TxOut {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.value.encode(w)?;
        write_var_bytes(w, &self.pub_key_script)
    }
}

impl Decodable for TxOut {
    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(TxOut {
            value: i64::decode(r)?,
            pub_key_script: read_var_bytes(r, MAX_SCRIPT_LEN)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    /// The txid: double-SHA256 of the canonical serialization.
    pub fn txid(&self) -> Hash {
        sha256d(&self.encode_to_vec())
    }

    /// A transaction is coinbase iff it has exactly one input whose
    /// outpoint is the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    pub fn output_value_sum(&self) -> i64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// `true` iff `lock_time` imposes no constraint at all (0), matching
    /// Bitcoin's "final" transaction shortcut.
    pub fn lock_time_is_trivial(&self) -> bool {
        self.lock_time == 0
    }

    /// Every input's sequence number is `0xFFFFFFFF` (final), which
    /// also disables `lock_time` regardless of its value.
    pub fn all_inputs_final(&self) -> bool {
        self.inputs.iter().all(|i| i.sequence == u32::MAX)
    }

    /// Whether `lock_time` is satisfied given the block height the
    /// transaction would be included at and the block's median time
    /// past. Mirrors Bitcoin's `IsFinalTx`: a `lock_time` below the
    /// threshold is interpreted as a block height, at or above it as a
    /// Unix timestamp.
    pub fn is_final(&self, block_height: i32, block_mtp_seconds: i64) -> bool {
        if self.lock_time == 0 || self.all_inputs_final() {
            return true;
        }
        const LOCKTIME_THRESHOLD: u32 = 500_000_000;
        let threshold_cmp = if self.lock_time < LOCKTIME_THRESHOLD {
            block_height as i64
        } else {
            block_mtp_seconds
        };
        (self.lock_time as i64) < threshold_cmp
    }
}

impl Encodable for Transaction {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.version.encode(w)?;
        write_seq(w, &self.inputs)?;
        write_seq(w, &self.outputs)?;
        self.lock_time.encode(w)
    }
}

impl Decodable for Transaction {
    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Transaction {
            version: i32::decode(r)?,
            inputs: read_seq(r, MAX_TX_IN_OUT)?,
            outputs: read_seq(r, MAX_TX_IN_OUT)?,
            lock_time: u32::decode(r)?,
        })
    }
}

// --- BIP68-style relative sequence locks -----------------------------------

pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;
pub const SEQUENCE_LOCKTIME_GRANULARITY: u32 = 9;

/// A per-input (or combined per-transaction) relative lock: `-1` on
/// either axis means "no constraint on that axis" (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceLock {
    pub min_block_height: i32,
    pub min_seconds: i64,
}

impl SequenceLock {
    pub fn none() -> Self {
        SequenceLock {
            min_block_height: -1,
            min_seconds: -1,
        }
    }

    /// `SequenceLockActive` from `spec.md` §4.9: true iff both axes are
    /// satisfied, where an axis fixed at `-1` is always satisfied.
    pub fn is_active(&self, block_height: i32, mtp_seconds: i64) -> bool {
        let height_ok = self.min_block_height == -1 || self.min_block_height < block_height;
        let seconds_ok = self.min_seconds == -1 || self.min_seconds < mtp_seconds;
        height_ok && seconds_ok
    }

    /// Folds several input-level locks into the single lock a
    /// transaction must satisfy on every axis (the strictest
    /// constraint per axis wins; an axis only stays unconstrained if
    /// every input left it unconstrained).
    pub fn combine(locks: impl IntoIterator<Item = SequenceLock>) -> SequenceLock {
        let mut combined = SequenceLock::none();
        for lock in locks {
            if lock.min_block_height > combined.min_block_height {
                combined.min_block_height = lock.min_block_height;
            }
            if lock.min_seconds > combined.min_seconds {
                combined.min_seconds = lock.min_seconds;
            }
        }
        combined
    }
}

/// Computes the relative lock a single input imposes, given the height
/// and median-time-past of the block that created the coin it spends.
///
/// Relative locks require transaction version >= 2; a disable flag on
/// the sequence number (or an older transaction version) yields no
/// constraint at all.
pub fn calc_input_sequence_lock(
    sequence: u32,
    tx_version: i32,
    prev_height: i32,
    prev_mtp_seconds: i64,
) -> SequenceLock {
    if tx_version < 2 || sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
        return SequenceLock::none();
    }
    if sequence & SEQUENCE_LOCKTIME_TYPE_FLAG != 0 {
        let relative = ((sequence & SEQUENCE_LOCKTIME_MASK) as i64) << SEQUENCE_LOCKTIME_GRANULARITY;
        SequenceLock {
            min_block_height: -1,
            min_seconds: prev_mtp_seconds + relative - 1,
        }
    } else {
        let relative = (sequence & SEQUENCE_LOCKTIME_MASK) as i32;
        SequenceLock {
            min_block_height: prev_height + relative - 1,
            min_seconds: -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx(coinbase: bool) -> Transaction {
        let previous_output = if coinbase {
            OutPoint::null()
        } else {
            OutPoint::new(Hash::from_bytes([3u8; 32]), 1)
        };
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output,
                signature_script: vec![1, 2, 3],
                sequence: u32::MAX,
            }],
            outputs: vec![TxOut {
                value: 5_000_000_000,
                pub_key_script: vec![0xac],
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn coinbase_detection() {
        assert!(sample_tx(true).is_coinbase());
        assert!(!sample_tx(false).is_coinbase());
    }

    #[test]
    fn txid_round_trips_through_wire_encoding() {
        let tx = sample_tx(false);
        let bytes = tx.encode_to_vec();
        let mut cursor = std::io::Cursor::new(bytes);
        let decoded = Transaction::decode(&mut cursor).unwrap();
        assert_eq!(tx, decoded);
        assert_eq!(tx.txid(), decoded.txid());
    }

    #[test]
    fn sequence_lock_scenarios_from_spec() {
        assert!(SequenceLock {
            min_block_height: 1000,
            min_seconds: -1
        }
        .is_active(1001, 9));
        assert!(!SequenceLock {
            min_block_height: 1000,
            min_seconds: -1
        }
        .is_active(1000, 9));
        assert!(SequenceLock {
            min_block_height: -1,
            min_seconds: 30
        }
        .is_active(2, 31));
        assert!(!SequenceLock {
            min_block_height: -1,
            min_seconds: 30
        }
        .is_active(2, 30));
        assert!(SequenceLock::none().is_active(0, 0));
    }

    #[test]
    fn disable_flag_yields_no_constraint() {
        let lock = calc_input_sequence_lock(SEQUENCE_LOCKTIME_DISABLE_FLAG, 2, 100, 1000);
        assert_eq!(lock, SequenceLock::none());
    }

    #[test]
    fn pre_bip68_version_yields_no_constraint() {
        let lock = calc_input_sequence_lock(5, 1, 100, 1000);
        assert_eq!(lock, SequenceLock::none());
    }

    #[test]
    fn height_based_relative_lock() {
        let lock = calc_input_sequence_lock(10, 2, 100, 1000);
        assert_eq!(lock.min_block_height, 100 + 10 - 1);
        assert_eq!(lock.min_seconds, -1);
    }

    #[test]
    fn seconds_based_relative_lock() {
        let sequence = SEQUENCE_LOCKTIME_TYPE_FLAG | 2; // 2 * 512 seconds
        let lock = calc_input_sequence_lock(sequence, 2, 100, 1_000);
        assert_eq!(lock.min_block_height, -1);
        assert_eq!(lock.min_seconds, 1_000 + (2 << SEQUENCE_LOCKTIME_GRANULARITY) - 1);
    }

    #[test]
    fn is_final_treats_zero_locktime_as_always_final() {
        let tx = sample_tx(false);
        assert!(tx.is_final(0, 0));
    }
}
