use anyhow::{bail, Result};
use config::Config;
use tributary_common::ChainId;

use crate::block_collection::CollectionConfig;

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BlockSyncConfig {
    pub chain_id: ChainId,
    pub round_window: u64,
    pub received_topic: String,
    pub validation_topic: String,
    pub production_topic: String,
    pub proposed_topic: String,
    pub committed_topic: String,
    pub rollback_topic: String,
    pub status_topic: String,
}

impl BlockSyncConfig {
    pub fn try_load(config: &Config) -> Result<Self> {
        let full_config = Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config.default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config.clone())
            .build()?;
        let loaded: Self = full_config.try_deserialize()?;
        if loaded.round_window == 0 {
            bail!("round-window must be at least 1");
        }
        Ok(loaded)
    }

    pub fn collection_config(&self) -> CollectionConfig {
        CollectionConfig {
            chain_id: self.chain_id,
            round_window: self.round_window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn load(overrides: &str) -> Result<BlockSyncConfig> {
        let config = Config::builder().add_source(File::from_str(overrides, FileFormat::Toml)).build()?;
        BlockSyncConfig::try_load(&config)
    }

    #[test]
    fn defaults_fill_missing_keys() {
        let cfg = load("").unwrap();
        assert_eq!(cfg.chain_id, ChainId::new(*b"TRIB"));
        assert_eq!(cfg.round_window, 8);
        assert_eq!(cfg.received_topic, "tributary.block.received");
        assert_eq!(cfg.status_topic, "tributary.sync.status");
    }

    #[test]
    fn process_config_overrides_defaults() {
        let cfg = load("chain-id = \"0a0b0c0d\"\nround-window = 3\nproposed-topic = \"test.proposed\"").unwrap();
        assert_eq!(cfg.chain_id, ChainId::new([0x0a, 0x0b, 0x0c, 0x0d]));
        assert_eq!(cfg.round_window, 3);
        assert_eq!(cfg.proposed_topic, "test.proposed");
        assert_eq!(cfg.collection_config().round_window, 3);
    }

    #[test]
    fn zero_round_window_is_rejected() {
        assert!(load("round-window = 0").is_err());
    }

    #[test]
    fn malformed_chain_id_is_rejected() {
        assert!(load("chain-id = \"xyz\"").is_err());
    }
}
