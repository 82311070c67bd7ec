//! BIP34 coinbase-height enforcement (`spec.md` §4.5/§8 scenario 4),
//! exercised through `Chain::process_block`. Regtest's stock
//! `bip0034_height` sits far out of reach of a short test chain, so
//! these tests lower it on a cloned `ChainParams` the way
//! `coinbase_maturity` is lowered elsewhere in this suite.

mod support;

use std::sync::Arc;

use umbra_core::validation::encode_serialized_height;
use umbra_core::{BlockFlags, Chain, ChainError, ErrorCode, Hash, OutPoint, Transaction, TxIn, TxOut};

use support::{coinbase_block, InMemoryBlockStore};

fn bip34_chain() -> (Chain, umbra_core::ChainParams) {
    let mut params = umbra_core::params::regtest_params();
    params.bip0034_height = 1;
    let store = Arc::new(InMemoryBlockStore::new());
    let chain = Chain::new(params.clone(), store).unwrap();
    (chain, params)
}

fn coinbase_with_script(
    prev: Hash,
    timestamp: i64,
    bits: u32,
    nonce: u32,
    params: &umbra_core::ChainParams,
    height: i32,
    sig_script: Vec<u8>,
) -> umbra_core::Block {
    let tx = Transaction {
        version: 1,
        inputs: vec![TxIn {
            previous_output: OutPoint::null(),
            signature_script: sig_script,
            sequence: u32::MAX,
        }],
        outputs: vec![TxOut {
            value: params.subsidy_at_height(height),
            pub_key_script: vec![0x51],
        }],
        lock_time: 0,
    };
    let merkle = umbra_core::primitives::merkle_root(&[tx.txid()]);
    umbra_core::Block {
        header: umbra_core::BlockHeader {
            merkle_root: merkle,
            ..support::header(prev, timestamp, bits, nonce)
        },
        transactions: vec![tx],
    }
}

#[test]
fn a_coinbase_missing_the_serialized_height_is_rejected() {
    let (chain, params) = bip34_chain();
    let genesis = chain.best_snapshot();
    let block = coinbase_with_script(genesis.hash, genesis.timestamp + 1, params.pow_limit_bits, 1, &params, 1, vec![]);

    let err = chain.process_block(&block, BlockFlags::NONE).unwrap_err();
    match err {
        ChainError::Rule(e) => assert_eq!(e.code, ErrorCode::ErrMissingCoinbaseHeight),
        other => panic!("expected a rule error, got {other:?}"),
    }
}

#[test]
fn a_coinbase_with_the_wrong_serialized_height_is_rejected() {
    let (chain, params) = bip34_chain();
    let genesis = chain.best_snapshot();
    // Height 1 is expected here, but the coinbase claims height 2.
    let wrong_height_script = encode_serialized_height(2);
    let block = coinbase_with_script(
        genesis.hash,
        genesis.timestamp + 1,
        params.pow_limit_bits,
        1,
        &params,
        1,
        wrong_height_script,
    );

    let err = chain.process_block(&block, BlockFlags::NONE).unwrap_err();
    match err {
        ChainError::Rule(e) => assert_eq!(e.code, ErrorCode::ErrBadCoinbaseHeight),
        other => panic!("expected a rule error, got {other:?}"),
    }
}

#[test]
fn a_coinbase_with_the_correct_serialized_height_connects() {
    let (chain, params) = bip34_chain();
    let genesis = chain.best_snapshot();
    let block = coinbase_block(genesis.hash, 1, genesis.timestamp + 1, params.pow_limit_bits, 1, &params);

    let (on_main_chain, is_orphan) = chain.process_block(&block, BlockFlags::NONE).unwrap();
    assert!(on_main_chain);
    assert!(!is_orphan);
}
