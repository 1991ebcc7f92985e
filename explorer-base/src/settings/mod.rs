//! Settings and configuration for explorer agents
//!
//! ## Introduction
//!
//! Explorer agents have a shared core, which contains the network, the
//! database location, connection info for the guardian network and the rpc
//! endpoints of each watched chain. In addition, each agent has
//! agent-specific settings.
//!
//! All agents share the [`Settings`] struct in this crate, and then define any
//! additional `Settings` in their own crate. By convention this is done in
//! `settings.rs` using the [`decl_settings!`](crate::decl_settings) macro.
//!
//! ### Configuration
//!
//! Agents read settings from the config files and/or env.
//!
//! Config files are loaded from `./config/*.json` plus any file listed in the
//! comma separated `CONFIG_FILES` env var.
//!
//! #### N.B.: Environment variable names correspond 1:1 with cfg file's JSON object hierarchy.
//!
//! Environment variables prefixed with:
//!
//! *  `EXPLORER_BASE__`
//!
//! *  `EXPLORER_[agentname]__`, e.g. `EXPLORER_INGESTOR__` or `EXPLORER_TRACKER__`
//!
//! are read as overrides of the json configuration. Path components are
//! separated by `__` and written in snake case; they are re-cased to the
//! camelCase used in the json files. For example
//! `EXPLORER_BASE__CHAINS__ETHEREUM__RPC_URL=ws://localhost:8546` overrides
//! `chains.ethereum.rpcUrl`.
//!
//! ### Configuration value precedence
//!
//! Configuration key/value pairs are loaded in the following order, with later
//! sources taking precedence:
//!
//! 1. The files in `./config`, in file name order.
//! 2. The files listed in `CONFIG_FILES`, in list order.
//! 3. Env vars prefixed `EXPLORER_BASE__`, shared by every agent.
//! 4. Env vars prefixed `EXPLORER_{AGENT}__`, used by a single agent.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use prometheus::Registry;
use serde::Deserialize;

use explorer_core::{KnownChain, Network, VaaNotifier};

pub use chains::{ChainConf, ChainProtocol};
pub use loader::load_settings_object;

use crate::{
    db::{ExplorerDB, DB},
    settings::trace::TracingConfig,
    CoreMetrics, GuardianRpcClient, NoopNotifier, RedisNotifier,
};

/// Chain configuration
mod chains;

mod loader;

/// Tracing subscriber management
pub mod trace;

const DEFAULT_RPC_TIMEOUT_SECS: u64 = 15;

fn default_rpc_timeout_secs() -> u64 {
    DEFAULT_RPC_TIMEOUT_SECS
}

/// Settings shared by every agent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Deployment the explorer indexes
    #[serde(default)]
    pub network: Network,
    /// The path to use for the DB file
    pub db: String,
    /// Redis used to publish the latest sequence per emitter
    #[serde(default)]
    pub redis_uri: Option<String>,
    /// Public RPC of a peer guardian
    #[serde(default)]
    pub guardian_grpc_url: Option<String>,
    /// Spy service streaming signed messages
    #[serde(default)]
    pub spy_grpc_url: Option<String>,
    /// Overrides the rpc url of the ethereum chain
    #[serde(default)]
    pub eth_rpc_url: Option<String>,
    /// Overrides the rpc url of the bsc chain
    #[serde(default)]
    pub bsc_rpc_url: Option<String>,
    /// Overrides the rpc url of the alephium chain
    #[serde(default)]
    pub alph_rpc_url: Option<String>,
    /// Watched chains by name
    #[serde(default)]
    pub chains: BTreeMap<String, ChainConf>,
    /// Timeout of every chain and peer request
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    /// The tracing configuration
    #[serde(default)]
    pub tracing: TracingConfig,
    /// Serve the statistics projection from memory
    #[serde(default)]
    pub enable_cache: bool,
}

impl AsRef<Settings> for Settings {
    fn as_ref(&self) -> &Settings {
        self
    }
}

/// Settings of an agent defined from configuration
pub trait LoadableFromSettings: AsRef<Settings> + Sized {
    /// Create a new instance of these settings by reading the configs and env
    /// vars.
    fn load() -> Result<Self>;
}

impl Settings {
    /// Timeout applied to chain and peer requests
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// Watched chains with the flat rpc url overrides applied
    pub fn chain_confs(&self) -> BTreeMap<String, ChainConf> {
        self.chains
            .iter()
            .map(|(name, conf)| {
                let mut conf = conf.clone();
                let url_override = match KnownChain::from_repr(conf.chain_id) {
                    Some(KnownChain::Ethereum) => self.eth_rpc_url.as_ref(),
                    Some(KnownChain::Bsc) => self.bsc_rpc_url.as_ref(),
                    Some(KnownChain::Alephium) => self.alph_rpc_url.as_ref(),
                    _ => None,
                };
                if let Some(url) = url_override {
                    conf.rpc_url = url.clone();
                }
                (name.clone(), conf)
            })
            .collect()
    }

    /// Look up a watched chain by name
    pub fn chain_conf(&self, name: &str) -> Result<ChainConf> {
        self.chain_confs()
            .remove(name)
            .ok_or_else(|| eyre::eyre!("No configuration for chain `{name}`"))
    }

    /// Open the database
    pub fn try_db(&self) -> Result<DB> {
        DB::from_path(&PathBuf::from(&self.db))
            .wrap_err_with(|| format!("Failed to open db at {}", self.db))
    }

    /// Scope a database to the configured network
    pub fn explorer_db(&self, db: DB) -> ExplorerDB {
        ExplorerDB::new(self.network, db)
    }

    /// Create the metrics registry of an agent
    pub fn metrics(&self, name: &str) -> Result<Arc<CoreMetrics>> {
        Ok(Arc::new(
            CoreMetrics::new(name, Registry::new()).wrap_err("Failed to register metrics")?,
        ))
    }

    /// Client of the peer guardian's public RPC
    pub fn guardian_rpc(&self) -> Result<Option<GuardianRpcClient>> {
        self.guardian_grpc_url
            .as_deref()
            .map(|url| GuardianRpcClient::connect_lazy(url, self.rpc_timeout()))
            .transpose()
    }

    /// Notifier invoked after each persisted message
    pub async fn notifier(&self) -> Result<Arc<dyn VaaNotifier>> {
        Ok(match &self.redis_uri {
            Some(uri) => Arc::new(RedisNotifier::connect(uri).await?),
            None => Arc::new(NoopNotifier),
        })
    }
}
