//! Consensus message handling.
//!
//! The agreement algorithm itself lives behind the [`Consensus`] trait;
//! [`LoggingConsensus`] is the standalone-node implementation that accepts
//! consensus traffic, counts it, and logs it without forming agreement.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use tessera_core::error::{ConsensusError, TesseraError};
use tessera_core::traits::{Consensus, Lifecycle};

/// Records and logs consensus traffic; never proposes or votes.
#[derive(Default)]
pub struct LoggingConsensus {
    view_changes: AtomicU64,
    proposals: AtomicU64,
}

impl LoggingConsensus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view_changes_seen(&self) -> u64 {
        self.view_changes.load(Ordering::Relaxed)
    }

    pub fn proposals_seen(&self) -> u64 {
        self.proposals.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Lifecycle for LoggingConsensus {
    async fn start(&self) -> Result<(), TesseraError> {
        info!("consensus online (observe-only)");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TesseraError> {
        Ok(())
    }
}

#[async_trait]
impl Consensus for LoggingConsensus {
    fn handle_view_change(&self, msg: &[u8]) -> Result<(), ConsensusError> {
        let seen = self.view_changes.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(bytes = msg.len(), seen, "view change received");
        Ok(())
    }

    fn handle_block_propose(&self, msg: &[u8]) -> Result<(), ConsensusError> {
        let seen = self.proposals.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(bytes = msg.len(), seen, "block proposal received");
        Ok(())
    }
}
