//! Error types for the **Umbra** core crate.
//!
//! Two error families exist, matching `spec.md` §7's propagation rule:
//! [`RuleError`] is a consensus-level rejection, carries a stable
//! [`ErrorCode`] peers can be scored on, and causes the offending block
//! index node (and its descendants) to be marked invalid.
//! [`ChainError`] additionally wraps collaborator/I/O failures, which
//! are fatal to the call but never flip a node's status — the caller
//! may retry once the collaborator recovers.

use thiserror::Error;

/// Closed enumeration of consensus rule violations (`spec.md` §7).
///
/// Codes are stable; peer-scoring logic in an RPC/network layer keys
/// off them, so existing variants are never renumbered or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Structural
    ErrMalformedBlock,
    ErrBadTxInput,
    ErrBadTxOutput,
    ErrBadTxOutValue,
    ErrDuplicateTxInputs,
    ErrFirstTxNotCoinbase,
    ErrMultipleCoinbases,
    ErrNoTransactions,
    ErrBlockTooBig,
    // PoW / header
    ErrInvalidPoW,
    ErrUnexpectedDifficulty,
    ErrTimeTooOld,
    ErrTimeTooNew,
    ErrInvalidTime,
    // Contextual
    ErrBadMerkleRoot,
    ErrBadCheckpoint,
    ErrForkTooOld,
    ErrCheckpointTimeTooOld,
    // Coinbase
    ErrMissingCoinbaseHeight,
    ErrBadCoinbaseHeight,
    ErrBadCoinbaseValue,
    // UTXO
    ErrMissingOrSpent,
    ErrImmatureSpend,
    ErrDoubleSpend,
    ErrSpendTooSoon,
    // Script
    ErrScriptValidation,
    ErrTooManySigOps,
    // Administrative
    ErrDuplicateBlock,
    ErrPrevBlockNotBest,
    /// Block index insertion with no known parent.
    MissingParent,
    /// Compact target decodes to an invalid 256-bit value.
    InvalidTarget,
}

impl ErrorCode {
    /// Stable wire/RPC string for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ErrMalformedBlock => "ErrMalformedBlock",
            ErrorCode::ErrBadTxInput => "ErrBadTxInput",
            ErrorCode::ErrBadTxOutput => "ErrBadTxOutput",
            ErrorCode::ErrBadTxOutValue => "ErrBadTxOutValue",
            ErrorCode::ErrDuplicateTxInputs => "ErrDuplicateTxInputs",
            ErrorCode::ErrFirstTxNotCoinbase => "ErrFirstTxNotCoinbase",
            ErrorCode::ErrMultipleCoinbases => "ErrMultipleCoinbases",
            ErrorCode::ErrNoTransactions => "ErrNoTransactions",
            ErrorCode::ErrBlockTooBig => "ErrBlockTooBig",
            ErrorCode::ErrInvalidPoW => "ErrInvalidPoW",
            ErrorCode::ErrUnexpectedDifficulty => "ErrUnexpectedDifficulty",
            ErrorCode::ErrTimeTooOld => "ErrTimeTooOld",
            ErrorCode::ErrTimeTooNew => "ErrTimeTooNew",
            ErrorCode::ErrInvalidTime => "ErrInvalidTime",
            ErrorCode::ErrBadMerkleRoot => "ErrBadMerkleRoot",
            ErrorCode::ErrBadCheckpoint => "ErrBadCheckpoint",
            ErrorCode::ErrForkTooOld => "ErrForkTooOld",
            ErrorCode::ErrCheckpointTimeTooOld => "ErrCheckpointTimeTooOld",
            ErrorCode::ErrMissingCoinbaseHeight => "ErrMissingCoinbaseHeight",
            ErrorCode::ErrBadCoinbaseHeight => "ErrBadCoinbaseHeight",
            ErrorCode::ErrBadCoinbaseValue => "ErrBadCoinbaseValue",
            ErrorCode::ErrMissingOrSpent => "ErrMissingOrSpent",
            ErrorCode::ErrImmatureSpend => "ErrImmatureSpend",
            ErrorCode::ErrDoubleSpend => "ErrDoubleSpend",
            ErrorCode::ErrSpendTooSoon => "ErrSpendTooSoon",
            ErrorCode::ErrScriptValidation => "ErrScriptValidation",
            ErrorCode::ErrTooManySigOps => "ErrTooManySigOps",
            ErrorCode::ErrDuplicateBlock => "ErrDuplicateBlock",
            ErrorCode::ErrPrevBlockNotBest => "ErrPrevBlockNotBest",
            ErrorCode::MissingParent => "MissingParent",
            ErrorCode::InvalidTarget => "InvalidTarget",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A consensus rule violation: a stable code plus a human detail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {detail}")]
pub struct RuleError {
    pub code: ErrorCode,
    pub detail: String,
}

impl RuleError {
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        RuleError {
            code,
            detail: detail.into(),
        }
    }
}

/// Top-level error returned by the engine's public API.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A consensus rule was violated; the offending node is marked
    /// invalid by the caller (`process_block`).
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// The supplied `ChainParams` disagree with this crate's hard-coded
    /// genesis table for the named network (Open Question (a)).
    #[error("chain parameters mismatch: {0}")]
    ParamsMismatch(String),

    /// A collaborator (block store, time source) failed. Fatal to the
    /// call, but does not flip any node's status: retry after recovery.
    #[error("collaborator error: {0}")]
    Collaborator(String),
}

pub type ChainResult<T> = Result<T, ChainError>;
