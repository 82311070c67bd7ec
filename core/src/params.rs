//! Fixed chain parameters and genesis blocks (C3).
//!
//! This is the one "collaborator" the core does not treat as pluggable:
//! every other contract (block store, time source) is an interface, but
//! the parameter record itself is compiled in, per network.

use std::time::Duration;

use num_bigint::BigUint;
use num_traits::One;

use crate::hash::Hash;
use crate::primitives::{Block, BlockHeader, OutPoint, Transaction, TxIn, TxOut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Main,
    Testnet3,
    Regtest,
    Simnet,
    Signet,
}

/// A hard checkpoint: the hash a candidate chain must match at `height`,
/// used to reject far-in-the-past forks cheaply (`ErrBadCheckpoint`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub height: i32,
    pub hash: Hash,
}

/// The fixed per-network record consumed by validation (`spec.md` §6).
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub name: &'static str,
    pub net: Network,
    pub genesis_block: Block,
    pub genesis_hash: Hash,
    pub pow_limit: BigUint,
    pub pow_limit_bits: u32,
    pub coinbase_maturity: i32,
    /// P2SH (BIP16) activation height — independent of `bip0034_height`;
    /// BIP16 gates redeem-script execution, BIP34 gates coinbase height
    /// encoding, and the two are unrelated consensus rules.
    pub bip0016_height: i32,
    pub bip0034_height: i32,
    pub bip0065_height: i32,
    pub bip0066_height: i32,
    pub dgw3_switch_height: i32,
    pub target_timespan: Duration,
    pub target_time_per_block: Duration,
    pub retarget_adjustment_factor: i64,
    pub reduce_min_difficulty: bool,
    pub min_diff_reduction_time: Duration,
    /// Coinbase subsidy paid at height 0, before any halving.
    pub initial_subsidy: i64,
    /// Height interval at which the subsidy halves; never reaches 0
    /// (halvings past the point subsidy rounds to 0 just keep paying 0).
    pub subsidy_halving_interval: i32,
    pub checkpoints: Vec<Checkpoint>,
    pub pub_key_hash_addr_id: u8,
    pub script_hash_addr_id: u8,
    pub private_key_id: u8,
    pub hd_private_key_id: [u8; 4],
    pub hd_public_key_id: [u8; 4],
    pub hd_coin_type: u32,
}

impl ChainParams {
    pub fn target_timespan_secs(&self) -> i64 {
        self.target_timespan.as_secs() as i64
    }

    pub fn target_time_per_block_secs(&self) -> i64 {
        self.target_time_per_block.as_secs() as i64
    }

    pub fn retarget_interval_blocks(&self) -> i64 {
        self.target_timespan_secs() / self.target_time_per_block_secs().max(1)
    }

    /// The coinbase subsidy due at `height`: halves every
    /// `subsidy_halving_interval` blocks, floored at 0 once the shift
    /// count would exceed 63.
    pub fn subsidy_at_height(&self, height: i32) -> i64 {
        let halvings = (height / self.subsidy_halving_interval.max(1)) as u32;
        if halvings >= 64 {
            0
        } else {
            self.initial_subsidy >> halvings
        }
    }
}

const GENESIS_COINBASE_MESSAGE: [u8; 58] = [
    0x04, 0xff, 0xff, 0x00, 0x1d, 0x01, 0x04, 0x32, 0x50, 0x72, 0x65, 0x73, 0x73, 0x75, 0x72, 0x65,
    0x20, 0x6d, 0x75, 0x73, 0x74, 0x20, 0x62, 0x65, 0x20, 0x70, 0x75, 0x74, 0x20, 0x6f, 0x6e, 0x20,
    0x56, 0x6c, 0x61, 0x64, 0x69, 0x6d, 0x69, 0x72, 0x20, 0x50, 0x75, 0x74, 0x69, 0x6e, 0x20, 0x6f,
    0x76, 0x65, 0x72, 0x20, 0x43, 0x72, 0x69, 0x6d, 0x65, 0x61,
];

const GENESIS_PUB_KEY_SCRIPT: [u8; 67] = [
    0x41, 0x04, 0x67, 0x8a, 0xfd, 0xb0, 0xfe, 0x55, 0x48, 0x27, 0x19, 0x67, 0xf1, 0xa6, 0x71, 0x30,
    0xb7, 0x10, 0x5c, 0xd6, 0xa8, 0x28, 0xe0, 0x39, 0x09, 0xa6, 0x79, 0x62, 0xe0, 0xea, 0x1f, 0x61,
    0xde, 0xb6, 0x49, 0xf6, 0xbc, 0x3f, 0x4c, 0xef, 0x38, 0xc4, 0xf3, 0x55, 0x04, 0xe5, 0x1e, 0xc1,
    0x12, 0xde, 0x5c, 0x38, 0x4d, 0xf7, 0xba, 0x0b, 0x8d, 0x57, 0x8a, 0x4c, 0x70, 0x2b, 0x6b, 0xf1,
    0x1d, 0x5f, 0xac,
];

/// The single coinbase transaction shared by every stock network's
/// genesis block (`original_source/chaincfg/genesis.go::genesisCoinbaseTx`).
fn genesis_coinbase_tx() -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxIn {
            previous_output: OutPoint::null(),
            signature_script: GENESIS_COINBASE_MESSAGE.to_vec(),
            sequence: u32::MAX,
        }],
        outputs: vec![TxOut {
            value: 0,
            pub_key_script: GENESIS_PUB_KEY_SCRIPT.to_vec(),
        }],
        lock_time: 0,
    }
}

fn genesis_block(
    version: i32,
    timestamp_secs: i64,
    bits: u32,
    nonce: u32,
    merkle_root: Hash,
) -> Block {
    use chrono::{TimeZone, Utc};
    let header = BlockHeader {
        version,
        prev_block: Hash::ZERO,
        merkle_root,
        timestamp: Utc.timestamp_opt(timestamp_secs, 0).single().unwrap(),
        bits,
        nonce,
    };
    Block {
        header,
        transactions: vec![genesis_coinbase_tx()],
    }
}

/// `genesisMerkleRoot` — shared by every network's genesis block.
fn shared_genesis_merkle_root() -> Hash {
    Hash::from_bytes([
        0xbb, 0x28, 0x66, 0xaa, 0xca, 0x46, 0xc4, 0x42, 0x8a, 0xd0, 0x8b, 0x57, 0xbc, 0x9d, 0x14,
        0x93, 0xab, 0xaf, 0x64, 0x72, 0x4b, 0x6c, 0x30, 0x52, 0xa7, 0xc8, 0xf9, 0x58, 0xdf, 0x68,
        0xe9, 0x3c,
    ])
}

fn pow_limit_from_exponent_minus_one(bit_exponent: u32) -> BigUint {
    (BigUint::one() << bit_exponent) - BigUint::one()
}

pub fn main_params() -> ChainParams {
    let genesis_hash = Hash::from_bytes([
        0x23, 0x90, 0x63, 0x3b, 0x70, 0xf0, 0x62, 0xcb, 0x3a, 0x3d, 0x68, 0x14, 0xb6, 0x7e, 0x29,
        0xa8, 0x0d, 0x9d, 0x75, 0x81, 0xdb, 0x0b, 0xcc, 0x49, 0x4d, 0x59, 0x7c, 0x92, 0xc5, 0x0a,
        0x00, 0x00,
    ]);
    ChainParams {
        name: "main",
        net: Network::Main,
        genesis_block: genesis_block(112, 1_395_342_829, 0x1e0f_ffff, 220_035, shared_genesis_merkle_root()),
        genesis_hash,
        pow_limit: pow_limit_from_exponent_minus_one(255) >> 4,
        pow_limit_bits: 0x1e0f_ffff,
        coinbase_maturity: 100,
        bip0016_height: 800,
        bip0034_height: 19_200,
        bip0065_height: 170_060,
        bip0066_height: 170_060,
        dgw3_switch_height: 145_000,
        target_timespan: Duration::from_secs(24 * 60 * 60),
        target_time_per_block: Duration::from_secs(60),
        retarget_adjustment_factor: 4,
        reduce_min_difficulty: false,
        min_diff_reduction_time: Duration::from_secs(60 * 2),
        initial_subsidy: 50_000_000_000,
        subsidy_halving_interval: 150_000,
        checkpoints: Vec::new(),
        pub_key_hash_addr_id: 0x24,
        script_hash_addr_id: 0x05,
        private_key_id: 0x80,
        hd_private_key_id: [0x04, 0x88, 0xad, 0xe4],
        hd_public_key_id: [0x04, 0x88, 0xb2, 0x1e],
        hd_coin_type: 17,
    }
}

pub fn regtest_params() -> ChainParams {
    let genesis_hash = Hash::from_bytes([
        0x36, 0xcd, 0xf2, 0xdc, 0xb7, 0x55, 0x62, 0x87, 0x28, 0x2a, 0x05, 0xc0, 0x64, 0x01, 0x23,
        0x23, 0xba, 0xe6, 0x63, 0xc1, 0x6e, 0xd3, 0xcd, 0x98, 0x98, 0xfc, 0x50, 0xbb, 0xff, 0x00,
        0x00, 0x00,
    ]);
    ChainParams {
        name: "regtest",
        net: Network::Regtest,
        genesis_block: genesis_block(3, 1_440_000_002, 0x1e00_ffff, 6_556_309, shared_genesis_merkle_root()),
        genesis_hash,
        pow_limit: pow_limit_from_exponent_minus_one(255),
        pow_limit_bits: 0x207f_ffff,
        coinbase_maturity: 100,
        bip0016_height: 0,
        bip0034_height: 100_000_000,
        bip0065_height: 1_351,
        bip0066_height: 1_251,
        dgw3_switch_height: 5_000,
        target_timespan: Duration::from_secs(24),
        target_time_per_block: Duration::from_secs(1),
        retarget_adjustment_factor: 3,
        reduce_min_difficulty: true,
        min_diff_reduction_time: Duration::from_secs(2),
        initial_subsidy: 50_000_000_000,
        subsidy_halving_interval: 150,
        checkpoints: Vec::new(),
        pub_key_hash_addr_id: 0x6f,
        script_hash_addr_id: 0xc4,
        private_key_id: 0xef,
        hd_private_key_id: [0x04, 0x35, 0x83, 0x94],
        hd_public_key_id: [0x04, 0x35, 0x87, 0xcf],
        hd_coin_type: 1,
    }
}

pub fn testnet3_params() -> ChainParams {
    let genesis_hash = Hash::from_bytes([
        0x36, 0xcd, 0xf2, 0xdc, 0xb7, 0x55, 0x62, 0x87, 0x28, 0x2a, 0x05, 0xc0, 0x64, 0x01, 0x23,
        0x23, 0xba, 0xe6, 0x63, 0xc1, 0x6e, 0xd3, 0xcd, 0x98, 0x98, 0xfc, 0x50, 0xbb, 0xff, 0x00,
        0x00, 0x00,
    ]);
    ChainParams {
        name: "testnet3",
        net: Network::Testnet3,
        genesis_block: genesis_block(3, 1_440_000_002, 0x1e00_ffff, 6_556_309, shared_genesis_merkle_root()),
        genesis_hash,
        pow_limit: pow_limit_from_exponent_minus_one(255),
        pow_limit_bits: 0x1e00_ffff,
        coinbase_maturity: 100,
        bip0016_height: 800,
        bip0034_height: 21_111,
        bip0065_height: 581_885,
        bip0066_height: 330_776,
        dgw3_switch_height: 4_200,
        target_timespan: Duration::from_secs(24 * 60 * 60),
        target_time_per_block: Duration::from_secs(60),
        retarget_adjustment_factor: 4,
        reduce_min_difficulty: true,
        min_diff_reduction_time: Duration::from_secs(60 * 2),
        initial_subsidy: 50_000_000_000,
        subsidy_halving_interval: 150_000,
        checkpoints: Vec::new(),
        pub_key_hash_addr_id: 0x6f,
        script_hash_addr_id: 0xc4,
        private_key_id: 0xef,
        hd_private_key_id: [0x04, 0x35, 0x83, 0x94],
        hd_public_key_id: [0x04, 0x35, 0x87, 0xcf],
        hd_coin_type: 1,
    }
}

pub fn signet_params() -> ChainParams {
    let genesis_hash = Hash::from_bytes([
        0x31, 0xab, 0x14, 0xbb, 0x92, 0x35, 0xf2, 0xa2, 0xeb, 0x6c, 0x87, 0x7b, 0x51, 0xaf, 0x57,
        0x43, 0x25, 0x8c, 0x81, 0xe7, 0xe9, 0xcd, 0xc6, 0x93, 0x79, 0xa2, 0xa2, 0xca, 0x7f, 0x00,
        0x00, 0x00,
    ]);
    ChainParams {
        name: "signet",
        net: Network::Signet,
        genesis_block: genesis_block(3, 1_606_082_400, 0x1e00_ffff, 14_675_970, shared_genesis_merkle_root()),
        genesis_hash,
        pow_limit: pow_limit_from_exponent_minus_one(255),
        pow_limit_bits: 0x1e00_ffff,
        coinbase_maturity: 100,
        bip0016_height: 0,
        bip0034_height: 1,
        bip0065_height: 1,
        bip0066_height: 1,
        dgw3_switch_height: 1,
        target_timespan: Duration::from_secs(24 * 60 * 60),
        target_time_per_block: Duration::from_secs(60),
        retarget_adjustment_factor: 4,
        reduce_min_difficulty: false,
        min_diff_reduction_time: Duration::from_secs(60 * 2),
        initial_subsidy: 50_000_000_000,
        subsidy_halving_interval: 150_000,
        checkpoints: Vec::new(),
        pub_key_hash_addr_id: 0x6f,
        script_hash_addr_id: 0xc4,
        private_key_id: 0xef,
        hd_private_key_id: [0x04, 0x35, 0x83, 0x94],
        hd_public_key_id: [0x04, 0x35, 0x87, 0xcf],
        hd_coin_type: 1,
    }
}

pub fn simnet_params() -> ChainParams {
    let genesis_hash = Hash::from_bytes([
        0x16, 0x44, 0xca, 0x92, 0xa1, 0xab, 0x60, 0xa7, 0xb4, 0x53, 0xd9, 0x7c, 0x66, 0x5f, 0x48,
        0x9a, 0xd0, 0x61, 0xdf, 0x79, 0xc5, 0x20, 0x73, 0xd8, 0xdd, 0x69, 0xc0, 0x78, 0x89, 0xa5,
        0x0b, 0xf2,
    ]);
    ChainParams {
        name: "simnet",
        net: Network::Simnet,
        genesis_block: genesis_block(1, 1_551_661_551, 0x207f_ffff, 2, shared_genesis_merkle_root()),
        genesis_hash,
        pow_limit: pow_limit_from_exponent_minus_one(255),
        pow_limit_bits: 0x207f_ffff,
        coinbase_maturity: 100,
        bip0016_height: 0,
        bip0034_height: 0,
        bip0065_height: 0,
        bip0066_height: 0,
        dgw3_switch_height: 0,
        target_timespan: Duration::from_secs(24 * 60 * 60),
        target_time_per_block: Duration::from_secs(60),
        retarget_adjustment_factor: 4,
        reduce_min_difficulty: true,
        min_diff_reduction_time: Duration::from_secs(60 * 2),
        initial_subsidy: 50_000_000_000,
        subsidy_halving_interval: 150,
        checkpoints: Vec::new(),
        pub_key_hash_addr_id: 0x3f,
        script_hash_addr_id: 0x7b,
        private_key_id: 0x64,
        hd_private_key_id: [0x04, 0x20, 0xb9, 0x00],
        hd_public_key_id: [0x04, 0x20, 0xbd, 0x3a],
        hd_coin_type: 115,
    }
}

pub fn params_for(net: Network) -> ChainParams {
    match net {
        Network::Main => main_params(),
        Network::Testnet3 => testnet3_params(),
        Network::Regtest => regtest_params(),
        Network::Simnet => simnet_params(),
        Network::Signet => signet_params(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regtest_genesis_hash_matches_header_hash() {
        let params = regtest_params();
        assert_eq!(params.genesis_block.hash(), params.genesis_hash);
    }

    #[test]
    fn main_genesis_merkle_root_matches_coinbase_txid() {
        let params = main_params();
        assert!(params.genesis_block.merkle_root_matches());
    }

    #[test]
    fn retarget_interval_is_24_blocks_on_regtest() {
        let params = regtest_params();
        assert_eq!(params.retarget_interval_blocks(), 24);
    }

    #[test]
    fn pow_limit_bits_decode_to_pow_limit() {
        use crate::compact::bits_to_target;
        let params = main_params();
        let target = bits_to_target(params.pow_limit_bits, &params.pow_limit).unwrap();
        assert_eq!(target, params.pow_limit);
    }

    #[test]
    fn subsidy_halves_on_schedule_and_eventually_reaches_zero() {
        let params = regtest_params();
        let initial = params.subsidy_at_height(0);
        assert_eq!(initial, params.initial_subsidy);
        assert_eq!(params.subsidy_at_height(params.subsidy_halving_interval), initial / 2);
        assert_eq!(params.subsidy_at_height(params.subsidy_halving_interval * 64), 0);
    }

    #[test]
    fn every_stock_network_has_a_distinct_genesis_hash() {
        let hashes = [
            main_params().genesis_hash,
            testnet3_params().genesis_hash,
            regtest_params().genesis_hash,
            signet_params().genesis_hash,
            simnet_params().genesis_hash,
        ];
        for (i, a) in hashes.iter().enumerate() {
            for (j, b) in hashes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b);
                }
            }
        }
    }
}
