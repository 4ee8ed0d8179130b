//! Tessera full node binary.
//!
//! Boots a node over RocksDB storage, or an in-memory dev node with a
//! randomized reporting facade, and runs until Ctrl+C.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use num_bigint::BigUint;
use tessera_core::types::Address;
use tessera_node::{Node, NodeConfig};
use tracing::{error, info};

/// Tessera full node.
#[derive(Parser, Debug)]
#[command(
    name = "tessera-node",
    version,
    about = "Tessera full node with RocksDB storage"
)]
struct Args {
    /// Data directory for chain and account databases
    #[arg(long, default_value = None)]
    data_dir: Option<PathBuf>,

    /// Chain identifier
    #[arg(long, default_value_t = tessera_node::config::DEFAULT_CHAIN_ID)]
    chain_id: u32,

    /// Run with in-memory storage and a randomized reporting facade.
    ///
    /// Also enabled by APP_ENV=development.
    #[arg(long)]
    dev: bool,

    /// Seed for the dev-mode reporting facade (random when omitted)
    #[arg(long)]
    dev_seed: Option<u64>,

    /// On storage open failure, move the damaged databases aside and
    /// bootstrap fresh instead of refusing to boot
    #[arg(long)]
    fallback_to_fresh_db: bool,

    /// Genesis balance allocation, repeatable (address=amount)
    #[arg(long = "credit", value_parser = parse_credit)]
    credits: Vec<(Address, BigUint)>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

/// Parse an `address=amount` genesis allocation.
fn parse_credit(raw: &str) -> Result<(Address, BigUint), String> {
    let (address, amount) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected address=amount, got {raw:?}"))?;
    if address.is_empty() {
        return Err("credit address is empty".to_string());
    }
    let amount = amount
        .parse::<BigUint>()
        .map_err(|e| format!("bad amount {amount:?}: {e}"))?;
    Ok((Address::new(address), amount))
}

impl Args {
    fn into_config(self) -> (NodeConfig, Option<u64>, String) {
        let dev = self.dev
            || std::env::var("APP_ENV")
                .map(|v| v == "development")
                .unwrap_or(false);

        let data_dir = self.data_dir.unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tessera")
        });

        let config = NodeConfig {
            chain_id: self.chain_id,
            data_dir,
            dev,
            enable_fallback_to_fresh_db: self.fallback_to_fresh_db,
            log_level: self.log_level,
            genesis_credits: self.credits,
        };
        let seed = dev.then(|| self.dev_seed.unwrap_or_else(rand::random));
        (config, seed, self.log_format)
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let (config, dev_seed, log_format) = args.into_config();

    init_logging(&config.log_level, &log_format);

    info!("Tessera node v{}", env!("CARGO_PKG_VERSION"));
    info!("chain_id: {}", config.chain_id);
    info!("data_dir: {:?}", config.data_dir);

    let node = if let Some(seed) = dev_seed {
        info!(seed, "running in dev mode with in-memory storage");
        Node::new_dev(config, seed)
    } else {
        if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
            error!("failed to create data_dir: {}", e);
            process::exit(1);
        }
        Node::new(config)
    };
    let node = match node {
        Ok(n) => n,
        Err(e) => {
            error!("failed to build node: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = node.start().await {
        error!("failed to start node: {}", e);
        process::exit(1);
    }

    match node.height() {
        Ok(height) => info!("chain tip at height {}", height),
        Err(e) => error!("failed to read chain tip: {}", e),
    }
    info!("Tessera node running (Ctrl+C to stop)");

    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    info!("received Ctrl+C, shutting down...");

    if let Err(e) = node.stop().await {
        error!("error during shutdown: {}", e);
        process::exit(1);
    }
    info!("Tessera node shutdown complete");
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output (suitable for log
/// aggregation pipelines). Any other value defaults to human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
