use std::sync::Arc;
use std::time::Duration;

use eyre::{eyre, Context, Result};
use serde::Deserialize;

use explorer_alephium::AlephiumProvider;
use explorer_core::{
    utils::hex_to_h256, ContractEventsProvider, EvmProvider, GuardianSetSource, H160,
};
use explorer_ethereum::{
    BuildableWithProvider, ConnectionConf, EvmProviderBuilder, GuardianSetSourceBuilder,
};

/// How the explorer talks to a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChainProtocol {
    /// Block subscription plus log filters
    Evm,
    /// Numbered contract events over the full node REST API
    Alephium,
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_block_time_ms() -> u64 {
    12_000
}

/// A watched chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConf {
    /// Bridge chain id
    pub chain_id: u16,
    /// Protocol of the chain
    pub protocol: ChainProtocol,
    /// Node endpoint
    pub rpc_url: String,
    /// Address of the bridge core contract
    pub contract_address: String,
    /// Minimum confirmations before a message is recorded
    #[serde(default)]
    pub min_confirmations: u64,
    /// Interval between polls of the node
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Nominal block time, used to convert confirmations to a time delay
    #[serde(default = "default_block_time_ms")]
    pub block_time_ms: u64,
    /// Cursor used when nothing was recorded for this chain yet, typically
    /// the deployment block of the contract
    #[serde(default)]
    pub start_event_index: u64,
    /// Group of the contract on sharded chains
    #[serde(default)]
    pub group: u32,
}

impl ChainConf {
    /// Interval between polls of the node
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Nominal block time
    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }

    fn evm_contract(&self) -> Result<H160> {
        self.ensure_protocol(ChainProtocol::Evm)?;
        let address = hex_to_h256(&self.contract_address)
            .ok_or_else(|| eyre!("Invalid contract address {}", self.contract_address))?;
        Ok(H160::from(address))
    }

    fn ensure_protocol(&self, expected: ChainProtocol) -> Result<()> {
        if self.protocol != expected {
            return Err(eyre!(
                "Chain {} uses {:?}, expected {:?}",
                self.chain_id,
                self.protocol,
                expected
            ));
        }
        Ok(())
    }

    /// Build the block and log access of an EVM chain
    pub async fn build_evm_provider(&self, timeout: Duration) -> Result<Arc<dyn EvmProvider>> {
        let contract = self.evm_contract()?;
        EvmProviderBuilder {
            poll_interval: self.poll_interval(),
        }
        .build_with_connection_conf(ConnectionConf::from_url(&self.rpc_url), contract, timeout)
        .await
        .wrap_err_with(|| format!("Failed to connect to chain {}", self.chain_id))
    }

    /// Build the guardian set source reading this chain's core contract
    pub async fn build_guardian_set_source(
        &self,
        timeout: Duration,
    ) -> Result<Arc<dyn GuardianSetSource>> {
        let contract = self.evm_contract()?;
        GuardianSetSourceBuilder
            .build_with_connection_conf(ConnectionConf::from_url(&self.rpc_url), contract, timeout)
            .await
            .wrap_err_with(|| format!("Failed to connect to chain {}", self.chain_id))
    }

    /// Build the contract event access of an Alephium chain
    pub fn build_contract_events_provider(
        &self,
        timeout: Duration,
    ) -> Result<Arc<dyn ContractEventsProvider>> {
        self.ensure_protocol(ChainProtocol::Alephium)?;
        let provider = AlephiumProvider::new(
            &self.rpc_url,
            self.contract_address.clone(),
            self.group,
            timeout,
        )?;
        Ok(Arc::new(provider))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn conf(protocol: &str) -> ChainConf {
        serde_json::from_value(serde_json::json!({
            "chainId": 255,
            "protocol": protocol,
            "rpcUrl": "http://localhost:22973",
            "contractAddress": "not-hex",
        }))
        .unwrap()
    }

    #[test]
    fn defaults_apply() {
        let conf = conf("alephium");
        assert_eq!(conf.poll_interval(), Duration::from_secs(5));
        assert_eq!(conf.min_confirmations, 0);
        assert_eq!(conf.group, 0);
    }

    #[tokio::test]
    async fn evm_builders_reject_other_protocols() {
        let conf = conf("alephium");
        assert!(conf.build_evm_provider(Duration::from_secs(1)).await.is_err());
        assert!(conf
            .build_contract_events_provider(Duration::from_secs(1))
            .is_ok());
    }
}
