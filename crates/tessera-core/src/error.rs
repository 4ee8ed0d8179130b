//! Error types for the Tessera ledger.
use num_bigint::BigUint;
use thiserror::Error;

use crate::types::{Address, ChainId};

/// Failure to encode or decode a canonical value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("failed to encode: {0}")] Encode(String),
    #[error("failed to decode: {0}")] Decode(String),
}

/// Account state mutation and codec failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: BigUint, need: BigUint },
    #[error("state codec: {0}")]
    Codec(#[from] CodecError),
}

/// Action pool admission and eviction failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("duplicate nonce {nonce} for sender {sender}")]
    DuplicateNonce { sender: Address, nonce: u64 },
    #[error("insufficient balance for {sender}: available {available}, need {need}")]
    InsufficientBalance { sender: Address, available: BigUint, need: BigUint },
    #[error("transfer has empty recipient")] EmptyRecipient,
    #[error("vote has empty votee")] EmptyVotee,
    #[error("sender {0} has too many pending actions")] SenderQueueFull(Address),
    #[error(transparent)] Store(#[from] StoreError),
}

/// Block application failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("nonce gap for {sender}: expected {expected}, got {got}")]
    NonceGap { sender: Address, expected: u64, got: u64 },
    #[error("nonce 0 is reserved for genesis/coinbase credits")]
    ReservedNonce,
    #[error("invalid credit action: {0}")]
    InvalidCredit(String),
    #[error(transparent)] State(#[from] StateError),
    #[error(transparent)] Store(#[from] StoreError),
    #[error(transparent)] Codec(#[from] CodecError),
}

/// Message routing configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no subscriber registered for chain {0}")] UnknownChain(ChainId),
    #[error("subscriber already registered for chain {0}")] DuplicateSubscriber(ChainId),
    #[error("dispatcher is not running")] NotRunning,
}

/// Block synchronization failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("block for chain {got} routed to syncer for chain {expected}")]
    ChainMismatch { expected: ChainId, got: ChainId },
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Store(#[from] StoreError),
    #[error(transparent)] Network(#[from] NetworkError),
}

/// Storage backend failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend: {0}")] Backend(String),
    #[error("corrupt record for {key}: {source}")]
    Corrupt { key: String, source: CodecError },
}

/// Network transport failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("transport not attached to a dispatcher")] NotAttached,
    #[error("send failed: {0}")] Send(String),
}

/// Consensus message-handling failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("consensus handler: {0}")] Handler(String),
}

/// Node lifecycle failures.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("error when {stage}: {source}")]
    Stage { stage: &'static str, source: Box<TesseraError> },
    #[error("failed to fall back to fresh db: {0}")]
    Fallback(String),
}

/// Aggregate error for the Tessera node.
#[derive(Error, Debug)]
pub enum TesseraError {
    #[error(transparent)] Codec(#[from] CodecError),
    #[error(transparent)] State(#[from] StateError),
    #[error(transparent)] Pool(#[from] PoolError),
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Dispatch(#[from] DispatchError),
    #[error(transparent)] Sync(#[from] SyncError),
    #[error(transparent)] Store(#[from] StoreError),
    #[error(transparent)] Network(#[from] NetworkError),
    #[error(transparent)] Consensus(#[from] ConsensusError),
    #[error(transparent)] Node(#[from] NodeError),
}

impl NodeError {
    /// Wrap a subsystem error with the lifecycle stage it occurred in.
    pub fn stage(stage: &'static str, source: impl Into<TesseraError>) -> Self {
        Self::Stage { stage, source: Box::new(source.into()) }
    }
}
