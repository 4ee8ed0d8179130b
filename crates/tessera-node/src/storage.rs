//! Persistent and in-memory storage backends.
//!
//! [`RocksStore`] keeps account state and block history in two RocksDB
//! databases, mirroring the split between the trie directory and the chain
//! directory on disk. Account writes are staged in memory and flushed
//! atomically with a [`WriteBatch`] at commit time.
//!
//! [`MemStore`] backs dev mode and tests with the same trait surface.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use tracing::{debug, info};

use tessera_core::account::AccountState;
use tessera_core::error::{CodecError, StoreError, TesseraError};
use tessera_core::traits::{ChainStore, Lifecycle, StateStore};
use tessera_core::types::{Address, Block, ChainId, Hash256};

// --- Column family names ---

const CF_ACCOUNTS: &str = "accounts";
const CF_BLOCKS: &str = "blocks";
const CF_METADATA: &str = "metadata";

const TRIE_CFS: &[&str] = &[CF_ACCOUNTS, CF_METADATA];
const CHAIN_CFS: &[&str] = &[CF_BLOCKS, CF_METADATA];

// --- Metadata keys ---

const META_TIP_HEIGHT: &[u8] = b"tip_height";
const META_STATE_ROOT: &[u8] = b"state_root";
const META_CHAIN_ID: &[u8] = b"chain_id";

fn backend_err(e: rocksdb::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn height_key(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

/// RocksDB-backed account state and block history.
///
/// The trie database holds account records; the chain database holds applied
/// blocks indexed by height. Both carry a metadata column family with the
/// chain id, which is verified on reopen.
pub struct RocksStore {
    chain_id: ChainId,
    trie_db: DB,
    chain_db: DB,
    staged: RwLock<HashMap<Address, AccountState>>,
}

impl RocksStore {
    /// Open or create both databases.
    ///
    /// Creates missing column families. A recorded chain id that differs
    /// from `chain_id` is a hard error rather than silent corruption.
    pub fn open(
        trie_path: impl AsRef<Path>,
        chain_path: impl AsRef<Path>,
        chain_id: ChainId,
    ) -> Result<Self, StoreError> {
        let trie_db = Self::open_db(trie_path.as_ref(), TRIE_CFS)?;
        let chain_db = Self::open_db(chain_path.as_ref(), CHAIN_CFS)?;

        let store = Self {
            chain_id,
            trie_db,
            chain_db,
            staged: RwLock::new(HashMap::new()),
        };
        store.check_chain_id(&store.trie_db)?;
        store.check_chain_id(&store.chain_db)?;
        debug!(chain_id, "opened storage");
        Ok(store)
    }

    fn open_db(path: &Path, cfs: &[&str]) -> Result<DB, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let descriptors: Vec<ColumnFamilyDescriptor> = cfs
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        DB::open_cf_descriptors(&db_opts, path, descriptors).map_err(backend_err)
    }

    /// Verify or record the chain id in a database's metadata.
    fn check_chain_id(&self, db: &DB) -> Result<(), StoreError> {
        let cf = db
            .cf_handle(CF_METADATA)
            .ok_or_else(|| StoreError::Backend("missing metadata column family".into()))?;
        match db.get_cf(&cf, META_CHAIN_ID).map_err(backend_err)? {
            Some(bytes) if bytes.len() == 4 => {
                let recorded = ChainId::from_le_bytes(bytes.try_into().unwrap());
                if recorded != self.chain_id {
                    return Err(StoreError::Backend(format!(
                        "database belongs to chain {recorded}, node configured for {}",
                        self.chain_id
                    )));
                }
            }
            Some(_) => return Err(StoreError::Backend("invalid chain id record".into())),
            None => {
                db.put_cf(&cf, META_CHAIN_ID, self.chain_id.to_le_bytes())
                    .map_err(backend_err)?;
            }
        }
        Ok(())
    }

    /// Flush both databases to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.trie_db.flush().map_err(backend_err)?;
        self.chain_db.flush().map_err(backend_err)
    }

    fn tip_height(&self) -> Result<Option<u64>, StoreError> {
        let cf = self
            .chain_db
            .cf_handle(CF_METADATA)
            .ok_or_else(|| StoreError::Backend("missing metadata column family".into()))?;
        match self.chain_db.get_cf(&cf, META_TIP_HEIGHT).map_err(backend_err)? {
            Some(bytes) if bytes.len() == 8 => {
                Ok(Some(u64::from_le_bytes(bytes.try_into().unwrap())))
            }
            Some(_) => Err(StoreError::Backend("invalid tip height record".into())),
            None => Ok(None),
        }
    }
}

impl StateStore for RocksStore {
    fn get(&self, address: &Address) -> Result<Option<AccountState>, StoreError> {
        if let Some(staged) = self.staged.read().get(address) {
            return Ok(Some(staged.clone()));
        }
        let cf = self
            .trie_db
            .cf_handle(CF_ACCOUNTS)
            .ok_or_else(|| StoreError::Backend("missing accounts column family".into()))?;
        match self
            .trie_db
            .get_cf(&cf, address.as_str().as_bytes())
            .map_err(backend_err)?
        {
            Some(bytes) => {
                let state = AccountState::from_bytes(&bytes).map_err(|e| StoreError::Corrupt {
                    key: address.to_string(),
                    source: CodecError::Decode(e.to_string()),
                })?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    fn put(&self, address: &Address, state: AccountState) -> Result<(), StoreError> {
        self.staged.write().insert(address.clone(), state);
        Ok(())
    }

    fn commit(&self) -> Result<Hash256, StoreError> {
        let cf = self
            .trie_db
            .cf_handle(CF_ACCOUNTS)
            .ok_or_else(|| StoreError::Backend("missing accounts column family".into()))?;

        let staged = std::mem::take(&mut *self.staged.write());
        let mut batch = WriteBatch::default();
        for (address, state) in &staged {
            let bytes = state.to_bytes().map_err(|e| StoreError::Corrupt {
                key: address.to_string(),
                source: CodecError::Encode(e.to_string()),
            })?;
            batch.put_cf(&cf, address.as_str().as_bytes(), bytes);
        }
        self.trie_db.write(batch).map_err(backend_err)?;

        // Root over the full account set; the iterator yields keys in order,
        // so the digest is deterministic across nodes.
        let mut hasher = blake3::Hasher::new();
        for item in self.trie_db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item.map_err(backend_err)?;
            hasher.update(&key);
            hasher.update(&value);
        }
        let root = Hash256(hasher.finalize().into());

        let meta = self
            .trie_db
            .cf_handle(CF_METADATA)
            .ok_or_else(|| StoreError::Backend("missing metadata column family".into()))?;
        self.trie_db
            .put_cf(&meta, META_STATE_ROOT, root.as_bytes())
            .map_err(backend_err)?;
        Ok(root)
    }

    fn root_hash(&self) -> Result<Hash256, StoreError> {
        let cf = self
            .trie_db
            .cf_handle(CF_METADATA)
            .ok_or_else(|| StoreError::Backend("missing metadata column family".into()))?;
        match self.trie_db.get_cf(&cf, META_STATE_ROOT).map_err(backend_err)? {
            Some(bytes) if bytes.len() == 32 => {
                let mut root = [0u8; 32];
                root.copy_from_slice(&bytes);
                Ok(Hash256(root))
            }
            Some(_) => Err(StoreError::Backend("invalid state root record".into())),
            None => Ok(Hash256::ZERO),
        }
    }

    fn chain_id(&self) -> ChainId {
        self.chain_id
    }
}

impl ChainStore for RocksStore {
    fn height(&self) -> Result<u64, StoreError> {
        Ok(self.tip_height()?.unwrap_or(0))
    }

    fn block_by_height(&self, height: u64) -> Result<Option<Block>, StoreError> {
        let cf = self
            .chain_db
            .cf_handle(CF_BLOCKS)
            .ok_or_else(|| StoreError::Backend("missing blocks column family".into()))?;
        match self
            .chain_db
            .get_cf(&cf, height_key(height))
            .map_err(backend_err)?
        {
            Some(bytes) => {
                let (block, _) =
                    bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                        .map_err(|e| StoreError::Corrupt {
                            key: format!("block:{height}"),
                            source: CodecError::Decode(e.to_string()),
                        })?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    fn append_block(&self, block: &Block) -> Result<(), StoreError> {
        let cf = self
            .chain_db
            .cf_handle(CF_BLOCKS)
            .ok_or_else(|| StoreError::Backend("missing blocks column family".into()))?;
        let meta = self
            .chain_db
            .cf_handle(CF_METADATA)
            .ok_or_else(|| StoreError::Backend("missing metadata column family".into()))?;

        let bytes = bincode::serde::encode_to_vec(block, bincode::config::standard()).map_err(
            |e| StoreError::Corrupt {
                key: format!("block:{}", block.height()),
                source: CodecError::Encode(e.to_string()),
            },
        )?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf, height_key(block.height()), bytes);
        batch.put_cf(&meta, META_TIP_HEIGHT, block.height().to_le_bytes());
        self.chain_db.write(batch).map_err(backend_err)
    }
}

#[async_trait]
impl Lifecycle for RocksStore {
    async fn start(&self) -> Result<(), TesseraError> {
        info!(height = self.height()?, "storage online");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TesseraError> {
        self.flush()?;
        info!("storage flushed and stopped");
        Ok(())
    }
}

/// In-memory storage for dev mode and tests.
pub struct MemStore {
    chain_id: ChainId,
    accounts: RwLock<BTreeMap<Address, AccountState>>,
    blocks: RwLock<BTreeMap<u64, Block>>,
    root: RwLock<Hash256>,
}

impl MemStore {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            accounts: RwLock::new(BTreeMap::new()),
            blocks: RwLock::new(BTreeMap::new()),
            root: RwLock::new(Hash256::ZERO),
        }
    }
}

impl StateStore for MemStore {
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
                source: CodecError::Encode(e.to_string()),
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

impl ChainStore for MemStore {
    fn height(&self) -> Result<u64, StoreError> {
        Ok(self
            .blocks
            .read()
            .last_key_value()
            .map(|(h, _)| *h)
            .unwrap_or(0))
    }

    fn block_by_height(&self, height: u64) -> Result<Option<Block>, StoreError> {
        Ok(self.blocks.read().get(&height).cloned())
    }

    fn append_block(&self, block: &Block) -> Result<(), StoreError> {
        self.blocks.write().insert(block.height(), block.clone());
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for MemStore {
    async fn start(&self) -> Result<(), TesseraError> {
        info!("in-memory storage online");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TesseraError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;
    use tempfile::TempDir;
    use tessera_core::action::Action;

    fn addr(s: &str) -> Address {
        Address::new(s)
    }

    fn open_store(dir: &TempDir, chain_id: ChainId) -> Result<RocksStore, StoreError> {
        RocksStore::open(
            dir.path().join("triedata"),
            dir.path().join("chaindata"),
            chain_id,
        )
    }

    #[test]
    fn staged_writes_visible_before_commit() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 1).unwrap();

        let mut state = AccountState::default();
        state.add_balance(&BigUint::from(10u64));
        store.put(&addr("alice"), state).unwrap();

        let got = store.get(&addr("alice")).unwrap().unwrap();
        assert_eq!(got.balance, BigUint::from(10u64));
    }

    #[test]
    fn commit_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let root = {
            let store = open_store(&dir, 1).unwrap();
            let mut state = AccountState::default();
            state.nonce = 3;
            state.add_balance(&BigUint::from(77u64));
            store.put(&addr("alice"), state).unwrap();
            store.commit().unwrap()
        };

        let store = open_store(&dir, 1).unwrap();
        let got = store.get(&addr("alice")).unwrap().unwrap();
        assert_eq!(got.nonce, 3);
        assert_eq!(got.balance, BigUint::from(77u64));
        assert_eq!(store.root_hash().unwrap(), root);
    }

    #[test]
    fn chain_id_mismatch_refuses_to_open() {
        let dir = TempDir::new().unwrap();
        drop(open_store(&dir, 1).unwrap());
        assert!(open_store(&dir, 2).is_err());
    }

    #[test]
    fn blocks_round_trip_and_track_tip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 1).unwrap();
        assert_eq!(store.height().unwrap(), 0);
        assert!(store.block_by_height(0).unwrap().is_none());

        let genesis = Block::new(1, 0, Hash256::ZERO, 0, vec![]).unwrap();
        store.append_block(&genesis).unwrap();
        let next = Block::new(
            1,
            1,
            genesis.hash().unwrap(),
            5,
            vec![Action::transfer(
                Address::empty(),
                0,
                addr("alice"),
                BigUint::from(9u64),
            )],
        )
        .unwrap();
        store.append_block(&next).unwrap();

        assert_eq!(store.height().unwrap(), 1);
        let got = store.block_by_height(1).unwrap().unwrap();
        assert_eq!(got, next);
    }

    #[test]
    fn mem_store_height_and_blocks() {
        let store = MemStore::new(1);
        assert_eq!(store.height().unwrap(), 0);

        let genesis = Block::new(1, 0, Hash256::ZERO, 0, vec![]).unwrap();
        store.append_block(&genesis).unwrap();
        assert_eq!(store.height().unwrap(), 0);
        assert!(store.block_by_height(0).unwrap().is_some());
    }

    #[test]
    fn mem_store_commit_changes_root() {
        let store = MemStore::new(1);
        let empty = store.commit().unwrap();
        store.put(&addr("alice"), AccountState::default()).unwrap();
        assert_ne!(store.commit().unwrap(), empty);
    }
}
