//! Shared fixtures for the integration suites: an in-memory `BlockStore`
//! and the block-building helpers every suite needs to drive a `Chain`
//! end to end without a real database or miner.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;

use umbra_core::collaborators::{BlockStore, StoreError};
use umbra_core::{Block, BlockHeader, Chain, ChainParams, Hash, OutPoint, Transaction, TxIn, TxOut};

#[derive(Default)]
pub struct InMemoryBlockStore {
    blocks: Mutex<HashMap<Hash, Block>>,
    journals: Mutex<HashMap<Hash, Vec<umbra_core::utxo::CommittedChange>>>,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for InMemoryBlockStore {
    fn get(&self, hash: &Hash) -> Result<Option<Block>, StoreError> {
        Ok(self.blocks.lock().get(hash).cloned())
    }
    fn put(&self, block: &Block) -> Result<(), StoreError> {
        self.blocks.lock().insert(block.hash(), block.clone());
        Ok(())
    }
    fn has(&self, hash: &Hash) -> Result<bool, StoreError> {
        Ok(self.blocks.lock().contains_key(hash))
    }
    fn undo_journal(&self, hash: &Hash) -> Result<Option<Vec<umbra_core::utxo::CommittedChange>>, StoreError> {
        Ok(self.journals.lock().get(hash).cloned())
    }
    fn put_undo_journal(
        &self,
        hash: &Hash,
        journal: &[umbra_core::utxo::CommittedChange],
    ) -> Result<(), StoreError> {
        self.journals.lock().insert(*hash, journal.to_vec());
        Ok(())
    }
    fn iter_headers(&self) -> Result<Vec<BlockHeader>, StoreError> {
        Ok(self.blocks.lock().values().map(|b| b.header.clone()).collect())
    }
}

pub fn header(prev: Hash, timestamp: i64, bits: u32, nonce: u32) -> BlockHeader {
    BlockHeader {
        version: 4,
        prev_block: prev,
        merkle_root: Hash::ZERO,
        timestamp: Utc.timestamp_opt(timestamp, 0).single().unwrap(),
        bits,
        nonce,
    }
}

/// A one-coinbase block paying exactly the height's subsidy to an
/// always-true (`OP_TRUE`) output, so later blocks can spend it without
/// needing a real key pair.
pub fn coinbase_block(prev: Hash, height: i32, timestamp: i64, bits: u32, nonce: u32, params: &ChainParams) -> Block {
    let tx = Transaction {
        version: 1,
        inputs: vec![TxIn {
            previous_output: OutPoint::null(),
            signature_script: umbra_core::validation::encode_serialized_height(height),
            sequence: u32::MAX,
        }],
        outputs: vec![TxOut {
            value: params.subsidy_at_height(height),
            pub_key_script: vec![0x51],
        }],
        lock_time: 0,
    };
    let merkle = umbra_core::primitives::merkle_root(&[tx.txid()]);
    Block {
        header: BlockHeader {
            merkle_root: merkle,
            ..header(prev, timestamp, bits, nonce)
        },
        transactions: vec![tx],
    }
}

/// As [`coinbase_block`], but with an extra transaction spending
/// `spend`'s `OP_TRUE` output instead of paying the full subsidy to
/// itself, so the coinbase collects `spend`'s value as a fee.
pub fn block_spending(
    prev: Hash,
    height: i32,
    timestamp: i64,
    bits: u32,
    nonce: u32,
    params: &ChainParams,
    spend: OutPoint,
    spend_value: i64,
    spend_script_sig: Vec<u8>,
    spend_sequence: u32,
    spend_pub_key_script: Vec<u8>,
) -> Block {
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
            signature_script: spend_script_sig,
            sequence: spend_sequence,
        }],
        outputs: vec![TxOut {
            value: 0,
            pub_key_script: spend_pub_key_script,
        }],
        lock_time: 0,
    };
    let merkle = umbra_core::primitives::merkle_root(&[coinbase.txid(), spend_tx.txid()]);
    Block {
        header: BlockHeader {
            merkle_root: merkle,
            ..header(prev, timestamp, bits, nonce)
        },
        transactions: vec![coinbase, spend_tx],
    }
}

pub fn new_chain() -> (Chain, ChainParams) {
    let params = umbra_core::params::regtest_params();
    let store = Arc::new(InMemoryBlockStore::new());
    let chain = Chain::new(params.clone(), store).unwrap();
    (chain, params)
}
