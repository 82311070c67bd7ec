//! Consensus data types: outpoints, transactions, headers and blocks (C2).

pub mod block;
pub mod outpoint;
pub mod transaction;

pub use block::{merkle_root, Block, BlockHeader, HEADER_SIZE};
pub use outpoint::{OutPoint, COINBASE_INDEX};
pub use transaction::{
    calc_input_sequence_lock, SequenceLock, Transaction, TxIn, TxOut, MAX_MONEY,
    SEQUENCE_LOCKTIME_DISABLE_FLAG, SEQUENCE_LOCKTIME_GRANULARITY, SEQUENCE_LOCKTIME_MASK,
    SEQUENCE_LOCKTIME_TYPE_FLAG,
};
