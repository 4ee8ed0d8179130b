//! Outbound overlay seam.
//!
//! [`Overlay`] is the node's only view of the peer network: broadcast a
//! block, ask peers for a height range, serve blocks back to one peer.
//! [`LoopbackOverlay`] is the in-process implementation used by dev mode and
//! tests; it records outbound traffic and can feed messages back through an
//! attached dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use tessera_core::error::{NetworkError, TesseraError};
use tessera_core::message::Message;
use tessera_core::traits::Lifecycle;
use tessera_core::types::{Block, ChainId, Peer};

use crate::dispatcher::Dispatcher;

/// Outbound side of the peer network.
#[async_trait]
pub trait Overlay: Lifecycle {
    /// Wire the dispatcher that inbound messages are routed through.
    fn attach(&self, dispatcher: Arc<Dispatcher>);

    /// Announce a freshly produced block to all peers.
    ///
    /// This is the block producer's seam. The sync intake path never
    /// rebroadcasts a block it received; only a consensus engine that mints
    /// its own blocks calls this.
    async fn broadcast_block(&self, block: &Block) -> Result<(), NetworkError>;

    /// Ask peers for blocks in `start..=end`.
    async fn request_blocks(&self, start: u64, end: u64) -> Result<(), NetworkError>;

    /// Serve blocks back to one requesting peer.
    async fn send_blocks(&self, peer: &Peer, blocks: &[Block]) -> Result<(), NetworkError>;
}

/// In-process overlay that records traffic instead of sending it.
#[derive(Default)]
pub struct LoopbackOverlay {
    dispatcher: RwLock<Option<Arc<Dispatcher>>>,
    broadcasts: Mutex<Vec<Block>>,
    requests: Mutex<Vec<(u64, u64)>>,
    served: Mutex<Vec<(Peer, Vec<Block>)>>,
}

impl LoopbackOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject an inbound message, as if a peer had sent it.
    pub async fn deliver(&self, chain_id: ChainId, message: Message) -> Result<(), TesseraError> {
        let dispatcher = self
            .dispatcher
            .read()
            .clone()
            .ok_or(NetworkError::NotAttached)?;
        dispatcher.dispatch(chain_id, message).await?;
        Ok(())
    }

    /// Blocks broadcast so far.
    pub fn broadcast_log(&self) -> Vec<Block> {
        self.broadcasts.lock().clone()
    }

    /// Height ranges requested so far.
    pub fn request_log(&self) -> Vec<(u64, u64)> {
        self.requests.lock().clone()
    }

    /// Blocks served to individual peers so far.
    pub fn served_log(&self) -> Vec<(Peer, Vec<Block>)> {
        self.served.lock().clone()
    }
}

#[async_trait]
impl Overlay for LoopbackOverlay {
    fn attach(&self, dispatcher: Arc<Dispatcher>) {
        *self.dispatcher.write() = Some(dispatcher);
    }

    async fn broadcast_block(&self, block: &Block) -> Result<(), NetworkError> {
        debug!(height = block.height(), "loopback broadcast");
        self.broadcasts.lock().push(block.clone());
        Ok(())
    }

    async fn request_blocks(&self, start: u64, end: u64) -> Result<(), NetworkError> {
        debug!(start, end, "loopback block request");
        self.requests.lock().push((start, end));
        Ok(())
    }

    async fn send_blocks(&self, peer: &Peer, blocks: &[Block]) -> Result<(), NetworkError> {
        debug!(%peer, count = blocks.len(), "loopback serve");
        self.served.lock().push((peer.clone(), blocks.to_vec()));
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for LoopbackOverlay {
    async fn start(&self) -> Result<(), TesseraError> {
        info!("loopback overlay started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TesseraError> {
        info!("loopback overlay stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::types::Hash256;

    #[tokio::test]
    async fn records_outbound_traffic() {
        let overlay = LoopbackOverlay::new();
        let block = Block::new(1, 4, Hash256::ZERO, 0, vec![]).unwrap();

        overlay.broadcast_block(&block).await.unwrap();
        overlay.request_blocks(2, 3).await.unwrap();
        overlay
            .send_blocks(&"peer-1".to_string(), std::slice::from_ref(&block))
            .await
            .unwrap();

        assert_eq!(overlay.broadcast_log().len(), 1);
        assert_eq!(overlay.request_log(), vec![(2, 3)]);
        assert_eq!(overlay.served_log()[0].0, "peer-1");
    }

    #[tokio::test]
    async fn deliver_without_dispatcher_fails() {
        let overlay = LoopbackOverlay::new();
        let err = overlay
            .deliver(1, Message::ViewChange(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, TesseraError::Network(NetworkError::NotAttached)));
    }
}
