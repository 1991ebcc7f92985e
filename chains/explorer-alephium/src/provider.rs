use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

use explorer_core::{
    ChainBlockHeader, ChainCommunicationError, ChainResult, ContractEvent, ContractEventsProvider,
};

use crate::api::{
    decode_message_fields, BlockHeaderEntry, ChainInfo, ContractEventsByTxId, ContractEvents,
    HashesAtHeight, RichTransaction,
};

/// Index of the message event in the bridge contract's event list
pub const MESSAGE_EVENT_INDEX: i32 = 0;

/// An error when connecting to a full node.
#[derive(Error, Debug)]
pub enum AlephiumConnectionError {
    /// Underlying reqwest lib threw an error
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),
    /// A URL string could not be parsed
    #[error("Failed to parse url {1:?}: {0}")]
    InvalidUrl(url::ParseError, String),
}

impl From<AlephiumConnectionError> for ChainCommunicationError {
    fn from(e: AlephiumConnectionError) -> Self {
        ChainCommunicationError::from_other(e)
    }
}

/// The bridge contract on one Alephium group, read over REST.
#[derive(Debug, Clone)]
pub struct AlephiumProvider {
    client: Client,
    base: Url,
    contract: String,
    group: u32,
}

impl AlephiumProvider {
    /// Connect to the full node at `url`; `group` is the contract's group
    pub fn new(
        url: &str,
        contract: impl Into<String>,
        group: u32,
        timeout: Duration,
    ) -> Result<Self, AlephiumConnectionError> {
        let base = url
            .parse::<Url>()
            .map_err(|e| AlephiumConnectionError::InvalidUrl(e, url.to_owned()))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            contract: contract.into(),
            group,
        })
    }

    fn url(&self, path: &str) -> ChainResult<Url> {
        self.base
            .join(path)
            .map_err(|e| AlephiumConnectionError::InvalidUrl(e, path.to_owned()).into())
    }

    /// GET `path`, `None` on 404
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ChainResult<Option<T>> {
        let response = self
            .client
            .get(self.url(path)?)
            .query(query)
            .send()
            .await
            .map_err(ChainCommunicationError::from_other)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(ChainCommunicationError::from_other)?;
        Ok(Some(
            response
                .json()
                .await
                .map_err(ChainCommunicationError::from_other)?,
        ))
    }

    async fn get_required<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ChainResult<T> {
        self.get(path, query)
            .await?
            .ok_or_else(|| ChainCommunicationError::CustomError(format!("{path} not found")))
    }

    fn group_query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("fromGroup", self.group.to_string()),
            ("toGroup", self.group.to_string()),
        ]
    }
}

#[async_trait]
impl ContractEventsProvider for AlephiumProvider {
    #[instrument(level = "debug", err, skip(self))]
    async fn events_count(&self) -> ChainResult<u64> {
        self.get_required(
            &format!("events/contract/{}/current-count", self.contract),
            &[],
        )
        .await
    }

    #[instrument(err, skip(self))]
    async fn events(&self, start: u64, limit: u64) -> ChainResult<Vec<ContractEvent>> {
        let page: ContractEvents = self
            .get_required(
                &format!("events/contract/{}", self.contract),
                &[("start", start.to_string()), ("limit", limit.to_string())],
            )
            .await
            .map_err(|err| ChainCommunicationError::LogFetchFailed(err.to_string()))?;

        let mut events = vec![];
        for (offset, entry) in page.events.into_iter().enumerate() {
            if entry.event_index != MESSAGE_EVENT_INDEX {
                continue;
            }
            events.push(ContractEvent {
                message: decode_message_fields(&entry.fields)?,
                tx_id: entry.tx_id,
                block_hash: entry.block_hash,
                event_index: start + offset as u64,
            });
        }
        Ok(events)
    }

    #[instrument(err, skip(self))]
    async fn events_by_tx(&self, tx_id: &str) -> ChainResult<Vec<ContractEvent>> {
        let Some(found) = self
            .get::<ContractEventsByTxId>(&format!("events/tx-id/{tx_id}"), &[])
            .await?
        else {
            return Ok(vec![]);
        };
        found
            .events
            .into_iter()
            .filter(|entry| {
                entry.contract_address == self.contract && entry.event_index == MESSAGE_EVENT_INDEX
            })
            .map(|entry| {
                Ok(ContractEvent {
                    message: decode_message_fields(&entry.fields)?,
                    tx_id: tx_id.to_owned(),
                    block_hash: entry.block_hash,
                    // reobserved events are not tied to a cursor position
                    event_index: 0,
                })
            })
            .collect()
    }

    #[instrument(level = "debug", err, skip(self))]
    async fn block_header(&self, block_hash: &str) -> ChainResult<Option<ChainBlockHeader>> {
        Ok(self
            .get::<BlockHeaderEntry>(&format!("blockflow/headers/{block_hash}"), &[])
            .await?
            .map(|header| ChainBlockHeader {
                hash: header.hash,
                height: header.height,
                timestamp: header.timestamp,
            }))
    }

    #[instrument(level = "debug", err, skip(self))]
    async fn tip_header(&self) -> ChainResult<ChainBlockHeader> {
        let info: ChainInfo = self
            .get_required("blockflow/chain-info", &self.group_query())
            .await?;
        let mut query = self.group_query();
        query.push(("height", info.current_height.to_string()));
        let hashes: HashesAtHeight = self.get_required("blockflow/hashes", &query).await?;
        let tip = hashes.headers.into_iter().next().ok_or_else(|| {
            ChainCommunicationError::BlockUnavailable(info.current_height.to_string())
        })?;
        let header = self.block_header(&tip).await?;
        header.ok_or(ChainCommunicationError::BlockUnavailable(tip))
    }

    #[instrument(level = "debug", err, skip(self))]
    async fn is_block_in_main_chain(&self, block_hash: &str) -> ChainResult<bool> {
        self.get_required(
            "blockflow/is-block-in-main-chain",
            &[("blockHash", block_hash.to_owned())],
        )
        .await
    }

    #[instrument(level = "debug", err, skip(self))]
    async fn transaction_sender(&self, tx_id: &str) -> ChainResult<Option<String>> {
        let tx = self
            .get::<RichTransaction>(&format!("transactions/rich-details/{tx_id}"), &[])
            .await?;
        let sender = tx.and_then(|tx| tx.unsigned.inputs.into_iter().next().map(|i| i.address));
        if sender.is_none() {
            debug!(tx_id, "No sender for transaction");
        }
        Ok(sender)
    }
}
