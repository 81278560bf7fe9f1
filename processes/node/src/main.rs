//! 'main' for the Tributary node process

use std::sync::Arc;

use anyhow::Result;
use caryatid_process::Process;
use caryatid_sdk::ModuleRegistry;
use clap::Parser;
use config::{Config, Environment, File};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use tributary_common::{messages::Message, Block, BlockBody, BlockHash, BlockHeader, ChainId};
use tributary_module_block_sync::{
    chain_store::InMemoryChainStore, production::ProductionSchedule, BlockSync,
};

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long, value_name = "PATH", default_values_t = vec!["node.toml".to_string()])]
    config: Vec<String>,
}

/// Genesis block the chain store is seeded with
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
struct GenesisConfig {
    chain_id: ChainId,
    hash: BlockHash,
    #[serde(default)]
    timestamp: u64,
}

impl GenesisConfig {
    fn block(&self) -> Block {
        Block {
            header: BlockHeader {
                chain_id: self.chain_id,
                height: 0,
                previous_hash: BlockHash::default(),
                hash: self.hash,
                timestamp: self.timestamp,
            },
            body: BlockBody::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Standard logging using RUST_LOG for log levels
    let fmt_layer = fmt::layer().with_filter(EnvFilter::from_default_env());
    Registry::default().with(fmt_layer).init();

    info!("Tributary node process");

    // Read the config
    let args = Args::parse();
    let mut builder = Config::builder();
    for file in &args.config {
        builder = builder.add_source(File::with_name(file));
    }
    let config = Arc::new(builder.add_source(Environment::with_prefix("TRIBUTARY")).build()?);

    let genesis: GenesisConfig = config.get("genesis")?;
    info!(chain = %genesis.chain_id, "Genesis block {}", genesis.hash);

    // Create the process
    let mut process = Process::<Message>::create(config.clone()).await;

    // Block sync owns the chain store; production stays off until a producer reports in
    let store = InMemoryChainStore::new(genesis.block());
    process.register(Arc::new(BlockSync::new(store, ProductionSchedule::new())));

    // Run it
    process.run().await?;

    // Bye!
    info!("Exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn genesis_block_from_config() {
        let config = Config::builder()
            .add_source(File::from_str(include_str!("../node.toml"), FileFormat::Toml))
            .build()
            .unwrap();

        let genesis: GenesisConfig = config.get("genesis").unwrap();
        let block = genesis.block();

        assert_eq!(block.header.height, 0);
        assert_eq!(block.header.chain_id, ChainId::new(*b"TRIB"));
        assert!(block.header.hash.to_string().starts_with("c0ffee00"));
        assert!(block.body.transactions.is_empty());
    }
}
