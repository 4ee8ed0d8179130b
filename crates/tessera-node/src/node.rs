//! Node orchestration.
//!
//! [`Node`] owns every subsystem and starts them in dependency order:
//! storage, dispatcher, consensus, block sync, overlay, reporting. Stop runs
//! the same list in reverse. A failure during start or stop is wrapped with
//! the stage it happened in, so logs say which subsystem broke.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use tessera_core::action::Action;
use tessera_core::error::{NodeError, TesseraError};
use tessera_core::genesis::genesis_block;
use tessera_core::ledger::Ledger;
use tessera_core::pool::ActionPool;
use tessera_core::traits::{ChainStore, Consensus, Lifecycle, StateStore};
use tessera_core::types::{Block, ChainId, Peer};

use crate::config::NodeConfig;
use crate::consensus::LoggingConsensus;
use crate::dispatcher::{Dispatcher, Subscriber};
use crate::explorer::{ChainExplorer, FakeExplorer, ReportingService};
use crate::storage::{MemStore, RocksStore};
use crate::sync::BlockSyncer;
use crate::transport::{LoopbackOverlay, Overlay};

/// Per-chain handler set: admits actions, feeds the syncer, forwards
/// consensus traffic.
struct ChainService {
    pool: Arc<ActionPool>,
    syncer: Arc<BlockSyncer>,
    consensus: Arc<dyn Consensus>,
}

#[async_trait]
impl Subscriber for ChainService {
    async fn handle_action(&self, action: Action) -> Result<(), TesseraError> {
        self.pool.admit(action)?;
        Ok(())
    }

    async fn handle_block(&self, block: Block) -> Result<(), TesseraError> {
        self.syncer.process_block(block).await?;
        Ok(())
    }

    async fn handle_block_sync(&self, block: Block) -> Result<(), TesseraError> {
        self.syncer.process_block_sync(block).await?;
        Ok(())
    }

    async fn handle_sync_request(
        &self,
        peer: Peer,
        start: u64,
        end: u64,
    ) -> Result<(), TesseraError> {
        self.syncer.process_sync_request(peer, start, end).await?;
        Ok(())
    }

    async fn handle_view_change(&self, msg: Vec<u8>) -> Result<(), TesseraError> {
        self.consensus.handle_view_change(&msg)?;
        Ok(())
    }

    async fn handle_block_propose(&self, msg: Vec<u8>) -> Result<(), TesseraError> {
        self.consensus.handle_block_propose(&msg)?;
        Ok(())
    }
}

/// A fully wired node instance.
pub struct Node {
    config: NodeConfig,
    state: Arc<dyn StateStore>,
    chain: Arc<dyn ChainStore>,
    storage: Arc<dyn Lifecycle>,
    ledger: Arc<Ledger>,
    pool: Arc<ActionPool>,
    dispatcher: Arc<Dispatcher>,
    syncer: Arc<BlockSyncer>,
    consensus: Arc<LoggingConsensus>,
    overlay: Arc<LoopbackOverlay>,
    reporting: Arc<dyn ReportingService>,
}

impl Node {
    /// Build a node over persistent storage.
    ///
    /// With `enable_fallback_to_fresh_db` set, a storage open failure moves
    /// the damaged databases aside and retries from empty, which replays
    /// genesis instead of refusing to boot.
    pub fn new(config: NodeConfig) -> Result<Self, TesseraError> {
        let store = Self::open_store(&config)?;
        let state = Arc::clone(&store) as Arc<dyn StateStore>;
        let chain = Arc::clone(&store) as Arc<dyn ChainStore>;
        let storage = store as Arc<dyn Lifecycle>;
        Self::assemble(config, state, chain, storage, None)
    }

    /// Build a dev node: in-memory storage and a seeded fake reporting
    /// facade.
    pub fn new_dev(config: NodeConfig, seed: u64) -> Result<Self, TesseraError> {
        let store = Arc::new(MemStore::new(config.chain_id));
        let state = Arc::clone(&store) as Arc<dyn StateStore>;
        let chain = Arc::clone(&store) as Arc<dyn ChainStore>;
        let storage = store as Arc<dyn Lifecycle>;
        Self::assemble(config, state, chain, storage, Some(seed))
    }

    fn assemble(
        config: NodeConfig,
        state: Arc<dyn StateStore>,
        chain: Arc<dyn ChainStore>,
        storage: Arc<dyn Lifecycle>,
        dev_seed: Option<u64>,
    ) -> Result<Self, TesseraError> {
        let ledger = Arc::new(Ledger::new(Arc::clone(&state)));
        let pool = Arc::new(ActionPool::new(Arc::clone(&state)));
        let dispatcher = Arc::new(Dispatcher::new());
        let overlay = Arc::new(LoopbackOverlay::new());
        let consensus = Arc::new(LoggingConsensus::new());

        // Bootstrap an empty chain from the configured allocation.
        if chain.block_by_height(0)?.is_none() {
            let genesis = genesis_block(config.chain_id, &config.genesis_credits)?;
            ledger.apply_block(&genesis)?;
            chain.append_block(&genesis)?;
            info!(
                chain_id = config.chain_id,
                credits = config.genesis_credits.len(),
                "connected genesis block"
            );
        }

        let syncer = Arc::new(BlockSyncer::new(
            config.chain_id,
            Arc::clone(&ledger),
            Arc::clone(&chain),
            Arc::clone(&pool),
            Arc::clone(&overlay) as Arc<dyn Overlay>,
        ));

        let service = Arc::new(ChainService {
            pool: Arc::clone(&pool),
            syncer: Arc::clone(&syncer),
            consensus: Arc::clone(&consensus) as Arc<dyn Consensus>,
        });
        dispatcher.add_subscriber(config.chain_id, service as Arc<dyn Subscriber>)?;
        overlay.attach(Arc::clone(&dispatcher));

        let reporting: Arc<dyn ReportingService> = match dev_seed {
            Some(seed) => Arc::new(FakeExplorer::new(seed)),
            None => Arc::new(ChainExplorer::new(
                Arc::clone(&state),
                Arc::clone(&chain),
                Arc::clone(&pool),
            )),
        };

        Ok(Self {
            config,
            state,
            chain,
            storage,
            ledger,
            pool,
            dispatcher,
            syncer,
            consensus,
            overlay,
            reporting,
        })
    }

    fn open_store(config: &NodeConfig) -> Result<Arc<RocksStore>, TesseraError> {
        let trie_path = config.trie_db_path();
        let chain_path = config.chain_db_path();
        match RocksStore::open(&trie_path, &chain_path, config.chain_id) {
            Ok(store) => Ok(Arc::new(store)),
            Err(e) if config.enable_fallback_to_fresh_db => {
                warn!(error = %e, "storage open failed; falling back to fresh databases");
                Self::move_aside(&chain_path)?;
                Self::move_aside(&trie_path)?;
                Ok(Arc::new(RocksStore::open(
                    &trie_path,
                    &chain_path,
                    config.chain_id,
                )?))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Rename a damaged database directory to `<path>.old`, replacing any
    /// previous fallback remnant.
    fn move_aside(path: &Path) -> Result<(), NodeError> {
        if !path.exists() {
            return Ok(());
        }
        let mut aside = path.as_os_str().to_os_string();
        aside.push(".old");
        let aside = Path::new(&aside);
        if aside.exists() {
            std::fs::remove_dir_all(aside)
                .map_err(|e| NodeError::Fallback(format!("remove {}: {e}", aside.display())))?;
        }
        std::fs::rename(path, aside)
            .map_err(|e| NodeError::Fallback(format!("rename {}: {e}", path.display())))?;
        warn!(from = %path.display(), to = %aside.display(), "moved damaged database aside");
        Ok(())
    }

    /// Start every subsystem in dependency order.
    pub async fn start(&self) -> Result<(), TesseraError> {
        for (stage, subsystem) in self.stages() {
            subsystem
                .start()
                .await
                .map_err(|e| NodeError::stage(stage, e))?;
        }
        info!(chain_id = self.config.chain_id, "node started");
        Ok(())
    }

    /// Stop every subsystem in reverse order.
    pub async fn stop(&self) -> Result<(), TesseraError> {
        for (stage, subsystem) in self.stages().into_iter().rev() {
            subsystem
                .stop()
                .await
                .map_err(|e| NodeError::stage(stage, e))?;
        }
        info!("node stopped");
        Ok(())
    }

    fn stages(&self) -> Vec<(&'static str, Arc<dyn Lifecycle>)> {
        vec![
            ("running storage", Arc::clone(&self.storage)),
            (
                "running dispatcher",
                Arc::clone(&self.dispatcher) as Arc<dyn Lifecycle>,
            ),
            (
                "running consensus",
                Arc::clone(&self.consensus) as Arc<dyn Lifecycle>,
            ),
            (
                "running block sync",
                Arc::clone(&self.syncer) as Arc<dyn Lifecycle>,
            ),
            (
                "running overlay",
                Arc::clone(&self.overlay) as Arc<dyn Lifecycle>,
            ),
            (
                "running reporting",
                Arc::clone(&self.reporting) as Arc<dyn Lifecycle>,
            ),
        ]
    }

    // --- Subsystem access ---

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn chain_id(&self) -> ChainId {
        self.config.chain_id
    }

    pub fn state(&self) -> &Arc<dyn StateStore> {
        &self.state
    }

    pub fn chain(&self) -> &Arc<dyn ChainStore> {
        &self.chain
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn pool(&self) -> &Arc<ActionPool> {
        &self.pool
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn syncer(&self) -> &Arc<BlockSyncer> {
        &self.syncer
    }

    pub fn overlay(&self) -> &Arc<LoopbackOverlay> {
        &self.overlay
    }

    pub fn reporting(&self) -> &Arc<dyn ReportingService> {
        &self.reporting
    }

    /// Height of the best applied block.
    pub fn height(&self) -> Result<u64, TesseraError> {
        Ok(self.chain.height()?)
    }
}
