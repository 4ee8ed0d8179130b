//! Trait contracts between the ledger core and its collaborators.
//!
//! - [`StateStore`] — trie-backed account map (tessera-node implements)
//! - [`ChainStore`] — canonical block history (tessera-node implements)
//! - [`Consensus`] — message-handling contract of the consensus engine;
//!   its internal agreement algorithm is out of scope here
//! - [`Lifecycle`] — ordered start/stop owned by the node orchestrator

use async_trait::async_trait;

use crate::account::AccountState;
use crate::error::{ConsensusError, StoreError, TesseraError};
use crate::types::{Address, Block, ChainId, Hash256};

/// Ordered start/stop of a node subsystem.
///
/// `stop` must be idempotent and must release all held resources within a
/// bounded grace period.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn start(&self) -> Result<(), TesseraError>;
    async fn stop(&self) -> Result<(), TesseraError>;
}

/// Trie-backed persistent map from address to account state.
///
/// Only the ledger commit path writes committed state; the action pool holds
/// a read-only view.
pub trait StateStore: Send + Sync {
    /// Look up an account. Returns `None` if the address has never been
    /// referenced.
    fn get(&self, address: &Address) -> Result<Option<AccountState>, StoreError>;

    /// Stage an account record for the next commit.
    fn put(&self, address: &Address, state: AccountState) -> Result<(), StoreError>;

    /// Persist staged records and return the new state root.
    fn commit(&self) -> Result<Hash256, StoreError>;

    /// Root hash as of the last commit.
    fn root_hash(&self) -> Result<Hash256, StoreError>;

    /// Identifier of the chain this store backs.
    fn chain_id(&self) -> ChainId;
}

/// Canonical block history.
pub trait ChainStore: Send + Sync {
    /// Height of the best applied block. Genesis is height 0.
    fn height(&self) -> Result<u64, StoreError>;

    /// Fetch the block at a height, if applied.
    fn block_by_height(&self, height: u64) -> Result<Option<Block>, StoreError>;

    /// Append an applied block to the history.
    fn append_block(&self, block: &Block) -> Result<(), StoreError>;
}

/// Message-handling contract of the consensus engine.
///
/// View-change and block-propose payloads are forwarded verbatim; their
/// wire format belongs to the consensus implementation.
#[async_trait]
pub trait Consensus: Lifecycle {
    fn handle_view_change(&self, msg: &[u8]) -> Result<(), ConsensusError>;
    fn handle_block_propose(&self, msg: &[u8]) -> Result<(), ConsensusError>;
}
