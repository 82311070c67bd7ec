//! Umbra Core: the consensus-critical block and transaction validation
//! engine for a proof-of-work chain (`spec.md`).
//!
//! Networking, RPC, storage, mempool policy, mining, and wallet logic
//! all live outside this crate; it exposes the collaborator contracts
//! (`collaborators`) they implement against and the read/write surface
//! (`chain::Chain`) they drive.

pub mod chain;
pub mod collaborators;
pub mod compact;
pub mod connect;
pub mod encoding;
pub mod error;
pub mod hash;
pub mod index;
pub mod params;
pub mod primitives;
pub mod reorg;
pub mod script;
pub mod time;
pub mod utxo;
pub mod validation;

pub use chain::{BestSnapshot, BlockFlags, Chain};
pub use collaborators::{BlockStore, RayonWorkers, ScriptWorkers, StoreError, TimeSource};
pub use error::{ChainError, ChainResult, ErrorCode, RuleError};
pub use hash::Hash;
pub use params::{ChainParams, Checkpoint, Network};
pub use primitives::{Block, BlockHeader, OutPoint, Transaction, TxIn, TxOut};
pub use time::SystemTimeSource;
