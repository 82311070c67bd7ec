//! BIP68-style relative sequence locks (`spec.md` §4.9), exercised
//! through `Chain::process_block`: a spend whose relative lock hasn't
//! matured is rejected with `ErrSpendTooSoon`; the identical spend one
//! block later (once the lock is satisfied) connects normally.

mod support;

use std::sync::Arc;

use umbra_core::{BlockFlags, Chain, ChainError, ErrorCode};

use support::{block_spending, coinbase_block, InMemoryBlockStore};

fn maturity_free_chain() -> (Chain, umbra_core::ChainParams) {
    let mut params = umbra_core::params::regtest_params();
    params.coinbase_maturity = 0;
    let store = Arc::new(InMemoryBlockStore::new());
    let chain = Chain::new(params.clone(), store).unwrap();
    (chain, params)
}

#[test]
fn a_relative_height_lock_not_yet_matured_is_rejected() {
    let (chain, params) = maturity_free_chain();
    let genesis = chain.best_snapshot();

    let block1 = coinbase_block(genesis.hash, 1, genesis.timestamp + 1, params.pow_limit_bits, 1, &params);
    chain.process_block(&block1, BlockFlags::NONE).unwrap();

    // Requires 3 confirmations (`min_block_height = 1 + 3 - 1 = 3`);
    // spending at height 2 is one short.
    let spend = umbra_core::OutPoint::new(block1.transactions[0].txid(), 0);
    let spend_value = block1.transactions[0].outputs[0].value;
    let block2 = block_spending(
        block1.hash(),
        2,
        genesis.timestamp + 2,
        params.pow_limit_bits,
        2,
        &params,
        spend,
        spend_value,
        vec![],
        3,
        vec![0x51],
    );

    let err = chain.process_block(&block2, BlockFlags::NONE).unwrap_err();
    match err {
        ChainError::Rule(e) => assert_eq!(e.code, ErrorCode::ErrSpendTooSoon),
        other => panic!("expected a rule error, got {other:?}"),
    }
}

#[test]
fn the_same_relative_lock_connects_once_matured() {
    let (chain, params) = maturity_free_chain();
    let genesis = chain.best_snapshot();

    let block1 = coinbase_block(genesis.hash, 1, genesis.timestamp + 1, params.pow_limit_bits, 1, &params);
    chain.process_block(&block1, BlockFlags::NONE).unwrap();

    // A 1-block relative lock (`min_block_height = 1 + 1 - 1 = 1`) is
    // satisfied by the very next block, height 2.
    let spend = umbra_core::OutPoint::new(block1.transactions[0].txid(), 0);
    let spend_value = block1.transactions[0].outputs[0].value;
    let block2 = block_spending(
        block1.hash(),
        2,
        genesis.timestamp + 2,
        params.pow_limit_bits,
        2,
        &params,
        spend,
        spend_value,
        vec![],
        1,
        vec![0x51],
    );

    let (on_main_chain, is_orphan) = chain.process_block(&block2, BlockFlags::NONE).unwrap();
    assert!(on_main_chain);
    assert!(!is_orphan);
    assert!(chain.fetch_utxo(&spend).is_none(), "the spent coin is gone");
}
