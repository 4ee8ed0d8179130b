//! Out-of-order block intake and catch-up.
//!
//! Blocks arrive from the overlay in whatever order gossip delivers them.
//! The syncer applies the next expected height immediately, buffers anything
//! ahead of it, asks peers for the gap in between, and drains the buffer as
//! the gap closes. A single cursor lock serializes application, so each
//! height is applied at most once.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tessera_core::error::{SyncError, TesseraError};
use tessera_core::ledger::Ledger;
use tessera_core::pool::ActionPool;
use tessera_core::traits::{ChainStore, Lifecycle};
use tessera_core::types::{Block, ChainId, Peer};

use crate::transport::Overlay;

/// Where the syncer currently stands relative to its peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// Caught up; nothing buffered or outstanding.
    Idle,
    /// A gap request to peers is outstanding.
    Syncing,
    /// Holding out-of-order blocks waiting for the gap to close.
    Buffering,
}

#[derive(Default)]
struct Cursor {
    buffer: BTreeMap<u64, Block>,
    /// Highest height already asked of peers; avoids duplicate requests.
    requested_to: u64,
}

/// Applies inbound blocks in height order, requesting whatever is missing.
pub struct BlockSyncer {
    chain_id: ChainId,
    ledger: Arc<Ledger>,
    chain: Arc<dyn ChainStore>,
    pool: Arc<ActionPool>,
    overlay: Arc<dyn Overlay>,
    cursor: Mutex<Cursor>,
}

impl BlockSyncer {
    pub fn new(
        chain_id: ChainId,
        ledger: Arc<Ledger>,
        chain: Arc<dyn ChainStore>,
        pool: Arc<ActionPool>,
        overlay: Arc<dyn Overlay>,
    ) -> Self {
        Self {
            chain_id,
            ledger,
            chain,
            pool,
            overlay,
            cursor: Mutex::new(Cursor::default()),
        }
    }

    /// Ingest a block received from the overlay.
    ///
    /// Heights at or below the local tip are discarded, the next expected
    /// height is applied (plus any buffered successors), and anything
    /// further ahead is buffered behind a gap request.
    pub async fn process_block(&self, block: Block) -> Result<(), SyncError> {
        if block.header.chain_id != self.chain_id {
            return Err(SyncError::ChainMismatch {
                expected: self.chain_id,
                got: block.header.chain_id,
            });
        }

        let mut cursor = self.cursor.lock().await;
        let local = self.chain.height()?;
        let height = block.height();

        if height <= local {
            debug!(height, local, "discarding already-applied block");
            return Ok(());
        }

        if height == local + 1 {
            self.apply(&block)?;
            self.drain(&mut cursor).await?;
            return Ok(());
        }

        // A gap: buffer the block and ask peers for the missing range once.
        cursor.buffer.entry(height).or_insert(block);
        if cursor.requested_to < height - 1 {
            self.overlay.request_blocks(local + 1, height - 1).await?;
            cursor.requested_to = height - 1;
            info!(from = local + 1, to = height - 1, "requested missing blocks");
        }
        Ok(())
    }

    /// Ingest a block served in response to a sync request.
    pub async fn process_block_sync(&self, block: Block) -> Result<(), SyncError> {
        self.process_block(block).await
    }

    /// Serve blocks `start..=end` back to a requesting peer.
    ///
    /// Heights the local chain does not have are skipped rather than
    /// failing the whole response.
    pub async fn process_sync_request(
        &self,
        peer: Peer,
        start: u64,
        end: u64,
    ) -> Result<(), SyncError> {
        let mut blocks = Vec::new();
        for height in start..=end {
            if let Some(block) = self.chain.block_by_height(height)? {
                blocks.push(block);
            }
        }
        debug!(%peer, start, end, served = blocks.len(), "serving sync request");
        self.overlay.send_blocks(&peer, &blocks).await?;
        Ok(())
    }

    /// Current sync status, derived from the cursor and local tip.
    pub async fn state(&self) -> Result<SyncState, SyncError> {
        let cursor = self.cursor.lock().await;
        let local = self.chain.height()?;
        Ok(if !cursor.buffer.is_empty() {
            SyncState::Buffering
        } else if cursor.requested_to > local {
            SyncState::Syncing
        } else {
            SyncState::Idle
        })
    }

    /// Number of out-of-order blocks currently held.
    pub async fn buffered(&self) -> usize {
        self.cursor.lock().await.buffer.len()
    }

    /// Apply one block: ledger first, then history, then pool eviction.
    fn apply(&self, block: &Block) -> Result<(), SyncError> {
        let local = self.chain.height()?;
        if let Some(tip) = self.chain.block_by_height(local)? {
            let tip_hash = tip.hash().map_err(tessera_core::error::LedgerError::Codec)?;
            if block.header.prev_hash != tip_hash {
                warn!(
                    height = block.height(),
                    "discarding block that does not extend the local tip"
                );
                return Ok(());
            }
        }
        self.ledger.apply_block(block)?;
        self.chain.append_block(block)?;
        self.pool.evict(&block.actions);
        info!(height = block.height(), "applied block");
        Ok(())
    }

    /// Apply buffered successors while they line up with the tip.
    async fn drain(&self, cursor: &mut Cursor) -> Result<(), SyncError> {
        loop {
            let next = self.chain.height()? + 1;
            match cursor.buffer.remove(&next) {
                Some(block) => self.apply(&block)?,
                None => break,
            }
        }
        let local = self.chain.height()?;
        if cursor.requested_to <= local {
            cursor.requested_to = 0;
        }
        // Anything left below the tip is stale.
        let local = self.chain.height()?;
        cursor.buffer.retain(|height, _| *height > local);
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for BlockSyncer {
    async fn start(&self) -> Result<(), TesseraError> {
        info!(height = self.chain.height()?, "block sync online");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TesseraError> {
        let buffered = self.buffered().await;
        if buffered > 0 {
            warn!(buffered, "stopping with unapplied buffered blocks");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;
    use tessera_core::action::Action;
    use tessera_core::genesis::genesis_block;
    use tessera_core::traits::StateStore;
    use tessera_core::types::{Address, Hash256};

    use crate::storage::MemStore;
    use crate::transport::LoopbackOverlay;

    struct Harness {
        syncer: BlockSyncer,
        store: Arc<MemStore>,
        overlay: Arc<LoopbackOverlay>,
        chain: Vec<Block>,
    }

    /// Build a linked chain of `len` post-genesis blocks, each crediting
    /// `alice`, and a syncer whose local tip is genesis.
    fn harness(len: u64) -> Harness {
        let store = Arc::new(MemStore::new(1));
        let ledger = Arc::new(Ledger::new(
            Arc::clone(&store) as Arc<dyn StateStore>
        ));
        let pool = Arc::new(ActionPool::new(Arc::clone(&store) as Arc<dyn StateStore>));
        let overlay = Arc::new(LoopbackOverlay::new());

        let genesis = genesis_block(1, &[]).unwrap();
        ledger.apply_block(&genesis).unwrap();
        store.append_block(&genesis).unwrap();

        let mut chain = Vec::new();
        let mut prev = genesis.hash().unwrap();
        for height in 1..=len {
            let credit = Action::transfer(
                Address::empty(),
                0,
                Address::new("alice"),
                BigUint::from(1u64),
            );
            let block = Block::new(1, height, prev, height, vec![credit]).unwrap();
            prev = block.hash().unwrap();
            chain.push(block);
        }

        let syncer = BlockSyncer::new(
            1,
            ledger,
            Arc::clone(&store) as Arc<dyn ChainStore>,
            pool,
            Arc::clone(&overlay) as Arc<dyn Overlay>,
        );
        Harness { syncer, store, overlay, chain }
    }

    fn block_at(h: &Harness, height: u64) -> Block {
        h.chain[(height - 1) as usize].clone()
    }

    #[tokio::test]
    async fn applies_next_height_immediately() {
        let h = harness(1);
        h.syncer.process_block(block_at(&h, 1)).await.unwrap();
        assert_eq!(h.store.height().unwrap(), 1);
        assert_eq!(h.syncer.state().await.unwrap(), SyncState::Idle);
    }

    #[tokio::test]
    async fn buffers_ahead_and_requests_gap() {
        let h = harness(5);
        h.syncer.process_block(block_at(&h, 4)).await.unwrap();

        assert_eq!(h.store.height().unwrap(), 0);
        assert_eq!(h.syncer.buffered().await, 1);
        assert_eq!(h.overlay.request_log(), vec![(1, 3)]);
        assert_eq!(h.syncer.state().await.unwrap(), SyncState::Buffering);
    }

    #[tokio::test]
    async fn does_not_rerequest_covered_gap() {
        let h = harness(5);
        h.syncer.process_block(block_at(&h, 5)).await.unwrap();
        h.syncer.process_block(block_at(&h, 3)).await.unwrap();
        // Height 3 sits inside the already-requested 1..=4 range.
        assert_eq!(h.overlay.request_log(), vec![(1, 4)]);
    }

    #[tokio::test]
    async fn out_of_order_arrival_applies_each_height_once() {
        let h = harness(5);
        // Local tip 2, then 5, 3, 4 arrive.
        h.syncer.process_block(block_at(&h, 1)).await.unwrap();
        h.syncer.process_block(block_at(&h, 2)).await.unwrap();
        h.syncer.process_block(block_at(&h, 5)).await.unwrap();
        h.syncer.process_block(block_at(&h, 3)).await.unwrap();
        h.syncer.process_block(block_at(&h, 4)).await.unwrap();

        assert_eq!(h.store.height().unwrap(), 5);
        assert_eq!(h.syncer.buffered().await, 0);
        assert_eq!(h.syncer.state().await.unwrap(), SyncState::Idle);
        // Each credit applied exactly once: balance equals the block count.
        let alice = h
            .store
            .get(&Address::new("alice"))
            .unwrap()
            .unwrap();
        assert_eq!(alice.balance, BigUint::from(5u64));
    }

    #[tokio::test]
    async fn discards_already_applied_heights() {
        let h = harness(2);
        h.syncer.process_block(block_at(&h, 1)).await.unwrap();
        h.syncer.process_block(block_at(&h, 1)).await.unwrap();

        assert_eq!(h.store.height().unwrap(), 1);
        let alice = h.store.get(&Address::new("alice")).unwrap().unwrap();
        assert_eq!(alice.balance, BigUint::from(1u64));
    }

    #[tokio::test]
    async fn rejects_wrong_chain() {
        let h = harness(1);
        let foreign = Block::new(2, 1, Hash256::ZERO, 0, vec![]).unwrap();
        let err = h.syncer.process_block(foreign).await.unwrap_err();
        assert!(matches!(err, SyncError::ChainMismatch { expected: 1, got: 2 }));
    }

    #[tokio::test]
    async fn discards_block_not_extending_tip() {
        let h = harness(1);
        let stray = Block::new(1, 1, Hash256::ZERO, 99, vec![]).unwrap();
        h.syncer.process_block(stray).await.unwrap();
        assert_eq!(h.store.height().unwrap(), 0);
        // The real height 1 still applies.
        h.syncer.process_block(block_at(&h, 1)).await.unwrap();
        assert_eq!(h.store.height().unwrap(), 1);
    }

    #[tokio::test]
    async fn serves_sync_requests_skipping_missing() {
        let h = harness(2);
        h.syncer.process_block(block_at(&h, 1)).await.unwrap();

        h.syncer
            .process_sync_request("peer-9".to_string(), 0, 5)
            .await
            .unwrap();
        let served = h.overlay.served_log();
        assert_eq!(served.len(), 1);
        let (peer, blocks) = &served[0];
        assert_eq!(peer, "peer-9");
        // Genesis and height 1 exist; 2..=5 do not.
        assert_eq!(blocks.len(), 2);
    }
}
