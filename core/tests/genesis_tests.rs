//! Genesis-specific invariants exercised through the public API, rather
//! than re-covering `params.rs`'s own internal unit tests: `Chain::new`
//! seeds a genesis tip at height 0, rejects a caller-supplied
//! `ChainParams` whose genesis hash doesn't match the compiled-in table
//! for its network, and a block extending genesis lands at height 1.

mod support;

use std::sync::Arc;

use umbra_core::{BlockFlags, Chain, ChainError, Hash};

use support::{coinbase_block, new_chain, InMemoryBlockStore};

#[test]
fn a_fresh_chain_starts_with_genesis_as_its_best_tip() {
    let (chain, params) = new_chain();
    let snapshot = chain.best_snapshot();

    assert_eq!(snapshot.height, 0);
    assert_eq!(snapshot.hash, params.genesis_hash);
    assert_eq!(snapshot.bits, params.genesis_block.header.bits);
}

#[test]
fn a_mismatched_genesis_hash_is_rejected_as_a_params_error() {
    let mut params = umbra_core::params::regtest_params();
    params.genesis_hash = Hash::from_bytes([0xaau8; 32]);
    let store = Arc::new(InMemoryBlockStore::new());

    let err = Chain::new(params, store).unwrap_err();
    assert!(matches!(err, ChainError::ParamsMismatch(_)));
}

#[test]
fn a_block_extending_genesis_becomes_height_one() {
    let (chain, params) = new_chain();
    let genesis = chain.best_snapshot();
    let block = coinbase_block(genesis.hash, 1, genesis.timestamp + 1, params.pow_limit_bits, 1, &params);

    let (on_main_chain, is_orphan) = chain.process_block(&block, BlockFlags::NONE).unwrap();
    assert!(on_main_chain);
    assert!(!is_orphan);

    let tip = chain.best_snapshot();
    assert_eq!(tip.height, 1);
    assert_eq!(tip.hash, block.hash());
}
