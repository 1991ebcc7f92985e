use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::prelude::{Http, Middleware, Provider, Ws, WsClientError};
use reqwest::{Client, Url};
use thiserror::Error;

use explorer_core::{ChainCommunicationError, ChainResult, EvmProvider, GuardianSetSource, H160};

use crate::{ConnectionConf, EthereumGuardianSetSource, EthereumProvider};

/// An error when connecting to an ethereum provider.
#[derive(Error, Debug)]
pub enum EthereumProviderConnectionError {
    /// Underlying reqwest lib threw an error
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),
    /// A URL string could not be parsed
    #[error("Failed to parse url {1:?}: {0}")]
    InvalidUrl(url::ParseError, String),
    /// Underlying websocket library threw an error
    #[error(transparent)]
    WebsocketClientError(#[from] WsClientError),
}

impl From<EthereumProviderConnectionError> for ChainCommunicationError {
    fn from(e: EthereumProviderConnectionError) -> Self {
        ChainCommunicationError::from_other(e)
    }
}

/// A trait for dynamic trait creation with provider initialization.
#[async_trait]
pub trait BuildableWithProvider {
    /// The type that will be created.
    type Output;

    /// Construct a new instance of the associated trait using a connection
    /// config. `timeout` bounds every HTTP request.
    async fn build_with_connection_conf(
        &self,
        conn: ConnectionConf,
        contract: H160,
        timeout: Duration,
    ) -> ChainResult<Self::Output> {
        Ok(match conn {
            ConnectionConf::Http { url } => {
                let http_client = Client::builder()
                    .timeout(timeout)
                    .build()
                    .map_err(EthereumProviderConnectionError::from)?;
                let parsed_url = url
                    .parse::<Url>()
                    .map_err(|e| EthereumProviderConnectionError::InvalidUrl(e, url))?;
                let http_provider = Http::new_with_client(parsed_url, http_client);
                self.build_with_provider(Provider::new(http_provider), contract)
                    .await
            }
            ConnectionConf::Ws { url } => {
                let ws = Ws::connect(url)
                    .await
                    .map_err(EthereumProviderConnectionError::from)?;
                self.build_with_provider(Provider::new(ws), contract).await
            }
        })
    }

    /// Construct a new instance of the associated trait using a provider.
    async fn build_with_provider<M>(&self, provider: M, contract: H160) -> Self::Output
    where
        M: Middleware + 'static;
}

/// Builds the block and log access of a watched chain
#[derive(Debug, Clone, Copy)]
pub struct EvmProviderBuilder {
    /// How often the block subscription polls for new heads
    pub poll_interval: Duration,
}

#[async_trait]
impl BuildableWithProvider for EvmProviderBuilder {
    type Output = Arc<dyn EvmProvider>;

    async fn build_with_provider<M>(&self, provider: M, contract: H160) -> Self::Output
    where
        M: Middleware + 'static,
    {
        Arc::new(EthereumProvider::new(
            Arc::new(provider),
            contract,
            self.poll_interval,
        ))
    }
}

/// Builds a guardian set source reading the core contract
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardianSetSourceBuilder;

#[async_trait]
impl BuildableWithProvider for GuardianSetSourceBuilder {
    type Output = Arc<dyn GuardianSetSource>;

    async fn build_with_provider<M>(&self, provider: M, contract: H160) -> Self::Output
    where
        M: Middleware + 'static,
    {
        Arc::new(EthereumGuardianSetSource::new(Arc::new(provider), contract))
    }
}
