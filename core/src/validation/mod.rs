//! Two-phase block validation: context-free sanity (C6) then
//! chain-context-dependent validation (C7), including the difficulty
//! retargeter.

pub mod context;
pub mod difficulty;
pub mod sanity;

pub use context::{
    check_block_context, check_block_header_context, check_checkpoints, check_transactions_final,
    encode_serialized_height, parse_serialized_height,
};
pub use difficulty::next_required_bits;
pub use sanity::{
    check_block_sanity, check_block_sanity_no_pow, check_transaction_sanity,
    MAX_BLOCK_SERIALIZED_SIZE, MAX_BLOCK_WEIGHT,
};
