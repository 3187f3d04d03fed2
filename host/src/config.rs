use std::borrow::Cow;
use std::env;

use anyhow::{Context, Result};
use dotenv::dotenv;
use globe_consensus_core::limits::BlockSizeLimits;
use globe_consensus_core::params::{ConsensusParams, Network, NETWORK_PARAMS, NETWORK_TYPE};

const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub network: Network,
    /// Governance block size, `None` keeps the default limits.
    pub block_size: Option<u32>,
    pub log_filter: String,
}

impl Config {
    /// Reads `.env` if present, then the process environment.
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let network = match lookup("GLOBE_NETWORK") {
            Some(name) => name
                .parse()
                .with_context(|| format!("GLOBE_NETWORK has an unknown network name {name:?}"))?,
            None => NETWORK_TYPE,
        };
        let block_size = lookup("GLOBE_BLOCK_SIZE")
            .map(|size| {
                size.parse::<u32>()
                    .with_context(|| format!("GLOBE_BLOCK_SIZE must be a byte count, got {size:?}"))
            })
            .transpose()?;

        Ok(Config {
            network,
            block_size,
            log_filter: lookup("GLOBE_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }

    /// Command-line values take precedence over the environment.
    pub fn with_overrides(mut self, network: Option<Network>, block_size: Option<u32>) -> Self {
        if let Some(network) = network {
            self.network = network;
        }
        if block_size.is_some() {
            self.block_size = block_size;
        }
        self
    }

    /// Parameters of the configured network. The build network reuses the
    /// process-wide set, any other network is built on demand.
    pub fn consensus_params(&self) -> Cow<'static, ConsensusParams> {
        if self.network == NETWORK_TYPE {
            Cow::Borrowed(&*NETWORK_PARAMS)
        } else {
            Cow::Owned(ConsensusParams::for_network(self.network))
        }
    }

    pub fn block_size_limits(&self) -> Result<BlockSizeLimits> {
        let mut limits = BlockSizeLimits::default();
        if let Some(size) = self.block_size {
            limits
                .update_block_size(size)
                .context("invalid governance block size")?;
        }
        Ok(limits)
    }
}
