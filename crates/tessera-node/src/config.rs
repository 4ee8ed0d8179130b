//! Node configuration.
//!
//! Provides [`NodeConfig`] with defaults for data directory, chain identity,
//! and recovery behavior. Configuration is set programmatically or from
//! command-line flags in the binary.

use std::path::PathBuf;

use num_bigint::BigUint;
use tessera_core::types::{Address, ChainId};

/// Default chain identifier for a mainnet-flavored node.
pub const DEFAULT_CHAIN_ID: ChainId = 1;

/// Configuration for a full node instance.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Identifier of the chain this node participates in.
    pub chain_id: ChainId,
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Run with in-memory storage and a randomized reporting facade.
    pub dev: bool,
    /// On storage open failure, move the damaged databases aside and start
    /// from a fresh genesis instead of refusing to boot.
    pub enable_fallback_to_fresh_db: bool,
    /// Log level filter string (e.g. "info", "debug", "tessera_node=trace").
    pub log_level: String,
    /// Initial balance allocation applied at genesis.
    pub genesis_credits: Vec<(Address, BigUint)>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tessera");

        Self {
            chain_id: DEFAULT_CHAIN_ID,
            data_dir,
            dev: false,
            enable_fallback_to_fresh_db: false,
            log_level: "info".to_string(),
            genesis_credits: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Path to the block database.
    pub fn chain_db_path(&self) -> PathBuf {
        self.data_dir.join("chaindata")
    }

    /// Path to the account state database.
    pub fn trie_db_path(&self) -> PathBuf {
        self.data_dir.join("triedata")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_paths_under_data_dir() {
        let mut cfg = NodeConfig::default();
        cfg.data_dir = PathBuf::from("/tmp/tessera-test");
        assert_eq!(cfg.chain_db_path(), PathBuf::from("/tmp/tessera-test/chaindata"));
        assert_eq!(cfg.trie_db_path(), PathBuf::from("/tmp/tessera-test/triedata"));
    }

    #[test]
    fn defaults() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.chain_id, DEFAULT_CHAIN_ID);
        assert!(!cfg.dev);
        assert!(!cfg.enable_fallback_to_fresh_db);
        assert_eq!(cfg.log_level, "info");
    }
}
