//! Read-only reporting over a running node.
//!
//! [`ReportingService`] answers the questions an operator or external tool
//! asks: chain height, an account's balance, a block by height, and the
//! pool's pending count. [`ChainExplorer`] answers from the real stores;
//! [`FakeExplorer`] answers from a seeded random source for dev mode, so
//! dashboards can be exercised without a live chain.

use std::sync::Arc;

use async_trait::async_trait;
use num_bigint::BigUint;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use tessera_core::error::TesseraError;
use tessera_core::pool::ActionPool;
use tessera_core::traits::{ChainStore, Lifecycle, StateStore};
use tessera_core::types::{Address, Block};

/// Read-only view of a node for operators and external tooling.
#[async_trait]
pub trait ReportingService: Lifecycle {
    fn chain_height(&self) -> Result<u64, TesseraError>;
    fn balance(&self, address: &Address) -> Result<BigUint, TesseraError>;
    fn block(&self, height: u64) -> Result<Option<Block>, TesseraError>;
    fn pending_actions(&self) -> Result<usize, TesseraError>;
}

/// Reporting backed by the node's live stores.
pub struct ChainExplorer {
    state: Arc<dyn StateStore>,
    chain: Arc<dyn ChainStore>,
    pool: Arc<ActionPool>,
}

impl ChainExplorer {
    pub fn new(
        state: Arc<dyn StateStore>,
        chain: Arc<dyn ChainStore>,
        pool: Arc<ActionPool>,
    ) -> Self {
        Self { state, chain, pool }
    }
}

#[async_trait]
impl Lifecycle for ChainExplorer {
    async fn start(&self) -> Result<(), TesseraError> {
        info!("explorer online");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TesseraError> {
        Ok(())
    }
}

#[async_trait]
impl ReportingService for ChainExplorer {
    fn chain_height(&self) -> Result<u64, TesseraError> {
        Ok(self.chain.height()?)
    }

    fn balance(&self, address: &Address) -> Result<BigUint, TesseraError> {
        Ok(self
            .state
            .get(address)?
            .map(|s| s.balance)
            .unwrap_or_default())
    }

    fn block(&self, height: u64) -> Result<Option<Block>, TesseraError> {
        Ok(self.chain.block_by_height(height)?)
    }

    fn pending_actions(&self) -> Result<usize, TesseraError> {
        Ok(self.pool.len())
    }
}

/// Randomized reporting facade for dev mode.
///
/// Every answer is drawn from a seeded generator, so a given seed replays
/// the same sequence.
pub struct FakeExplorer {
    rng: Mutex<StdRng>,
}

impl FakeExplorer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl Lifecycle for FakeExplorer {
    async fn start(&self) -> Result<(), TesseraError> {
        info!("fake explorer online");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TesseraError> {
        Ok(())
    }
}

#[async_trait]
impl ReportingService for FakeExplorer {
    fn chain_height(&self) -> Result<u64, TesseraError> {
        Ok(self.rng.lock().gen_range(0..10_000))
    }

    fn balance(&self, _address: &Address) -> Result<BigUint, TesseraError> {
        Ok(BigUint::from(self.rng.lock().gen_range(0u64..1_000_000)))
    }

    fn block(&self, _height: u64) -> Result<Option<Block>, TesseraError> {
        Ok(None)
    }

    fn pending_actions(&self) -> Result<usize, TesseraError> {
        Ok(self.rng.lock().gen_range(0..100))
    }
}
