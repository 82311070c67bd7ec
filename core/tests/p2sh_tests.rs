//! P2SH (BIP16) exercised through `Chain::process_block`: a coinbase
//! pays into a P2SH output, and a later block's spend must supply the
//! redeem script and have it actually execute (`spec.md` §4.8), rather
//! than merely supplying a hash-matching scriptSig with no real
//! redeem-script evaluation.

mod support;

use std::sync::Arc;

use umbra_core::hash::hash160;
use umbra_core::script::opcodes::{OP_EQUAL, OP_HASH160};
use umbra_core::{
    BlockFlags, Chain, ChainError, ErrorCode, OutPoint, Transaction, TxIn, TxOut,
};

fn p2sh_script_pubkey(redeem_script: &[u8]) -> Vec<u8> {
    let hash = hash160(redeem_script);
    let mut script = vec![OP_HASH160, 0x14];
    script.extend_from_slice(&hash);
    script.push(OP_EQUAL);
    script
}

fn redeem_push(redeem_script: &[u8]) -> Vec<u8> {
    let mut push = vec![redeem_script.len() as u8];
    push.extend_from_slice(redeem_script);
    push
}

fn p2sh_chain() -> (Chain, umbra_core::ChainParams) {
    let mut params = umbra_core::params::regtest_params();
    params.coinbase_maturity = 0;
    let store = Arc::new(support::InMemoryBlockStore::new());
    let chain = Chain::new(params.clone(), store).unwrap();
    (chain, params)
}

fn coinbase_paying(
    prev: umbra_core::Hash,
    height: i32,
    timestamp: i64,
    bits: u32,
    nonce: u32,
    params: &umbra_core::ChainParams,
    pub_key_script: Vec<u8>,
) -> umbra_core::Block {
    let tx = Transaction {
        version: 1,
        inputs: vec![TxIn {
            previous_output: OutPoint::null(),
            signature_script: umbra_core::validation::encode_serialized_height(height),
            sequence: u32::MAX,
        }],
        outputs: vec![TxOut {
            value: params.subsidy_at_height(height),
            pub_key_script,
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

fn spending_block(
    prev: umbra_core::Hash,
    height: i32,
    timestamp: i64,
    bits: u32,
    nonce: u32,
    params: &umbra_core::ChainParams,
    spend: OutPoint,
    spend_value: i64,
    script_sig: Vec<u8>,
) -> umbra_core::Block {
    let coinbase = Transaction {
        version: 1,
        inputs: vec![TxIn {
            previous_output: OutPoint::null(),
            signature_script: umbra_core::validation::encode_serialized_height(height),
            sequence: u32::MAX,
        }],
        outputs: vec![TxOut {
            value: params.subsidy_at_height(height) + spend_value,
            pub_key_script: vec![0x51],
        }],
        lock_time: 0,
    };
    let spend_tx = Transaction {
        version: 2,
        inputs: vec![TxIn {
            previous_output: spend,
            signature_script: script_sig,
            sequence: u32::MAX,
        }],
        outputs: vec![TxOut {
            value: 0,
            pub_key_script: vec![0x51],
        }],
        lock_time: 0,
    };
    let merkle = umbra_core::primitives::merkle_root(&[coinbase.txid(), spend_tx.txid()]);
    umbra_core::Block {
        header: umbra_core::BlockHeader {
            merkle_root: merkle,
            ..support::header(prev, timestamp, bits, nonce)
        },
        transactions: vec![coinbase, spend_tx],
    }
}

#[test]
fn a_p2sh_output_is_spendable_by_its_redeem_script() {
    let (chain, params) = p2sh_chain();
    let genesis = chain.best_snapshot();

    // A trivial always-true redeem script (`OP_1`); the P2SH output
    // commits to its hash, not the script bytes themselves.
    let redeem_script = vec![0x51];
    let script_pubkey = p2sh_script_pubkey(&redeem_script);

    let block1 = coinbase_paying(genesis.hash, 1, genesis.timestamp + 1, params.pow_limit_bits, 1, &params, script_pubkey);
    chain.process_block(&block1, BlockFlags::NONE).unwrap();

    let spend = OutPoint::new(block1.transactions[0].txid(), 0);
    let spend_value = block1.transactions[0].outputs[0].value;
    let block2 = spending_block(
        block1.hash(),
        2,
        genesis.timestamp + 2,
        params.pow_limit_bits,
        2,
        &params,
        spend,
        spend_value,
        redeem_push(&redeem_script),
    );

    let (on_main_chain, is_orphan) = chain.process_block(&block2, BlockFlags::NONE).unwrap();
    assert!(on_main_chain);
    assert!(!is_orphan);
    assert!(chain.fetch_utxo(&spend).is_none());
}

#[test]
fn a_p2sh_spend_whose_redeem_script_does_not_execute_is_rejected() {
    let (chain, params) = p2sh_chain();
    let genesis = chain.best_snapshot();

    // The redeem script itself is unsatisfiable (`OP_0`/`OP_FALSE`); a
    // scriptSig that only matches the hash (without the redeem script
    // actually evaluating true) must still fail — this is what
    // distinguishes real P2SH execution from a hash-only check.
    let redeem_script = vec![0x00];
    let script_pubkey = p2sh_script_pubkey(&redeem_script);

    let block1 = coinbase_paying(genesis.hash, 1, genesis.timestamp + 1, params.pow_limit_bits, 1, &params, script_pubkey);
    chain.process_block(&block1, BlockFlags::NONE).unwrap();

    let spend = OutPoint::new(block1.transactions[0].txid(), 0);
    let spend_value = block1.transactions[0].outputs[0].value;
    let block2 = spending_block(
        block1.hash(),
        2,
        genesis.timestamp + 2,
        params.pow_limit_bits,
        2,
        &params,
        spend,
        spend_value,
        redeem_push(&redeem_script),
    );

    let err = chain.process_block(&block2, BlockFlags::NONE).unwrap_err();
    match err {
        ChainError::Rule(e) => assert_eq!(e.code, ErrorCode::ErrScriptValidation),
        other => panic!("expected a rule error, got {other:?}"),
    }
}
