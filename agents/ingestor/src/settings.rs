//! Configuration

use std::collections::HashMap;

use eyre::{eyre, Result};
use serde::Deserialize;

use explorer_base::decl_settings;
use explorer_core::{utils::hex_to_h256, Emitter, EmitterKind, H256, MAX_VAA_BATCH_SIZE};

fn default_interval_secs() -> u64 {
    60
}

fn default_batch_size() -> usize {
    MAX_VAA_BATCH_SIZE
}

fn default_dedup_capacity() -> u64 {
    explorer_base::DEFAULT_DEDUP_CAPACITY
}

fn default_queue_capacity() -> usize {
    256
}

fn default_stats_flush_interval() -> u64 {
    30
}

fn default_cache_days() -> u64 {
    1000
}

/// An emitter whose messages are backfilled and decoded
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitterConf {
    /// Chain of the emitter
    pub chain_id: u16,
    /// Hex address, padded to 32 bytes
    pub address: String,
    /// Chain its messages target
    pub target_chain: u16,
    /// Application behind the emitter
    pub kind: EmitterKind,
    /// Lowest sequence tracked when nothing is stored for the emitter yet
    #[serde(default)]
    pub watermark: u64,
}

impl EmitterConf {
    /// The emitter this configures
    pub fn emitter(&self) -> Result<Emitter> {
        let address = hex_to_h256(&self.address)
            .ok_or_else(|| eyre!("Invalid emitter address {}", self.address))?;
        Ok(Emitter {
            chain: self.chain_id,
            address,
            target_chain: self.target_chain,
        })
    }
}

/// A token with a price feed
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedTokenConf {
    /// Native chain of the token
    pub chain_id: u16,
    /// Native address, hex padded to 32 bytes
    pub address: String,
    /// CoinGecko id of the token
    pub coin_gecko_id: String,
}

/// Where guardian sets are read from
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianSetContractConf {
    /// Name of an EVM chain in `chains`
    pub chain: String,
    /// Core contract address, the chain's `contractAddress` if unset
    #[serde(default)]
    pub address: Option<String>,
}

decl_settings!(Ingestor {
    /// Seconds between runs of the missing message fetcher
    #[serde(default = "default_interval_secs")]
    fetch_missing_vaas_interval: u64,
    /// Sequences requested per peer call, at most 20
    #[serde(default = "default_batch_size")]
    fetch_vaa_batch_size: usize,
    /// Seconds between polls of the guardian set contract
    #[serde(default = "default_interval_secs")]
    fetch_guardian_set_interval: u64,
    /// Emitters to backfill and decode
    #[serde(default)]
    emitters: Vec<EmitterConf>,
    /// Message ids remembered by the gossip deduplicator
    #[serde(default = "default_dedup_capacity")]
    dedup_capacity: u64,
    /// Capacity of the queue between verification and persistence
    #[serde(default = "default_queue_capacity")]
    queue_capacity: usize,
    /// Seconds between flushes of the statistics aggregator
    #[serde(default = "default_stats_flush_interval")]
    stats_flush_interval: u64,
    /// Days of statistics held by the projection
    #[serde(default = "default_cache_days")]
    cache_days: u64,
    /// Authoritative source of guardian sets
    #[serde(default)]
    guardian_set_contract: Option<GuardianSetContractConf>,
    /// Price api used for notional values
    #[serde(default)]
    coin_gecko_url: Option<String>,
    /// Tokens whose transfers are valued in USD
    #[serde(default)]
    listed_tokens: Vec<ListedTokenConf>,
});

impl IngestorSettings {
    /// Batch size clamped to what peers accept
    pub fn batch_size(&self) -> usize {
        self.fetch_vaa_batch_size.clamp(1, MAX_VAA_BATCH_SIZE)
    }

    /// Price feed ids by `(token chain, token address)`
    pub fn listed_tokens(&self) -> Result<HashMap<(u16, H256), String>> {
        self.listed_tokens
            .iter()
            .map(|token| {
                let address = hex_to_h256(&token.address)
                    .ok_or_else(|| eyre!("Invalid token address {}", token.address))?;
                Ok(((token.chain_id, address), token.coin_gecko_id.clone()))
            })
            .collect()
    }
}
