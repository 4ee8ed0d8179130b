//! # tessera-node — Full node: storage, dispatch, sync, orchestration.
//!
//! Composes the Tessera subsystems into a running full node:
//! - [`storage::RocksStore`] / [`storage::MemStore`] — account and block storage
//! - [`dispatcher::Dispatcher`] — inbound message routing by chain
//! - [`sync::BlockSyncer`] — out-of-order block buffering and catch-up
//! - [`node::Node`] — ordered lifecycle wiring of everything above
//! - [`config::NodeConfig`] — node configuration

pub mod config;
pub mod consensus;
pub mod dispatcher;
pub mod explorer;
pub mod node;
pub mod storage;
pub mod sync;
pub mod transport;

pub use config::NodeConfig;
pub use dispatcher::{Dispatcher, Subscriber};
pub use node::Node;
pub use storage::{MemStore, RocksStore};
pub use sync::BlockSyncer;
pub use transport::Overlay;
