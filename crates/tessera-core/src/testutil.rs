//! In-memory store used by the core unit tests.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::account::AccountState;
use crate::error::StoreError;
use crate::traits::{ChainStore, StateStore};
use crate::types::{Address, Block, ChainId, Hash256};

/// Minimal in-memory [`StateStore`] + [`ChainStore`] for tests.
pub(crate) struct MemStateStore {
    chain_id: ChainId,
    accounts: RwLock<BTreeMap<Address, AccountState>>,
    blocks: RwLock<Vec<Block>>,
    root: RwLock<Hash256>,
}

impl MemStateStore {
    pub(crate) fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            accounts: RwLock::new(BTreeMap::new()),
            blocks: RwLock::new(Vec::new()),
            root: RwLock::new(Hash256::ZERO),
        }
    }
}

impl StateStore for MemStateStore {
    fn get(&self, address: &Address) -> Result<Option<AccountState>, StoreError> {
        Ok(self.accounts.read().get(address).cloned())
    }

    fn put(&self, address: &Address, state: AccountState) -> Result<(), StoreError> {
        self.accounts.write().insert(address.clone(), state);
        Ok(())
    }

    fn commit(&self) -> Result<Hash256, StoreError> {
        let mut hasher = blake3::Hasher::new();
        for (address, state) in self.accounts.read().iter() {
            hasher.update(address.as_str().as_bytes());
            let bytes = state.to_bytes().map_err(|e| StoreError::Corrupt {
                key: address.to_string(),
                source: match e {
                    crate::error::StateError::Codec(c) => c,
                    other => crate::error::CodecError::Encode(other.to_string()),
                },
            })?;
            hasher.update(&bytes);
        }
        let root = Hash256(hasher.finalize().into());
        *self.root.write() = root;
        Ok(root)
    }

    fn root_hash(&self) -> Result<Hash256, StoreError> {
        Ok(*self.root.read())
    }

    fn chain_id(&self) -> ChainId {
        self.chain_id
    }
}

impl ChainStore for MemStateStore {
    fn height(&self) -> Result<u64, StoreError> {
        let blocks = self.blocks.read();
        Ok(blocks.last().map(|b| b.height()).unwrap_or(0))
    }

    fn block_by_height(&self, height: u64) -> Result<Option<Block>, StoreError> {
        Ok(self
            .blocks
            .read()
            .iter()
            .find(|b| b.height() == height)
            .cloned())
    }

    fn append_block(&self, block: &Block) -> Result<(), StoreError> {
        self.blocks.write().push(block.clone());
        Ok(())
    }
}
