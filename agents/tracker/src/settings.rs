//! Configuration

use serde::Deserialize;

use explorer_base::decl_settings;

fn default_max_wait_confirmations() -> u64 {
    60
}

fn default_confirmation_safety() -> u64 {
    100
}

fn default_event_batch_size() -> u64 {
    100
}

/// A transaction to extract bridge events from again
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReobservationConf {
    /// Chain id of the transaction
    pub chain_id: u16,
    /// Transaction hash or id in the chain's native form
    pub tx_hash: String,
}

decl_settings!(Tracker {
    /// Blocks a pending message may wait past its confirmation depth
    #[serde(default = "default_max_wait_confirmations")]
    max_wait_confirmations: u64,
    /// Events re-processed behind the recorded cursor on restart
    #[serde(default = "default_confirmation_safety")]
    confirmation_safety: u64,
    /// Contract events fetched per request
    #[serde(default = "default_event_batch_size")]
    event_batch_size: u64,
    /// Names of the chains to watch, every configured chain if empty
    #[serde(default)]
    chains_to_watch: Vec<String>,
    /// Transactions re-observed at startup
    #[serde(default)]
    reobserve: Vec<ReobservationConf>,
});
