use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::prelude::{Filter, Middleware};
use ethers::types::{BlockId, BlockNumber, Log, U64};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info_span, instrument, warn};
use tracing_futures::Instrument;

use explorer_core::{
    BlockInfo, BlockSubscription, ChainCommunicationError, ChainResult, EvmProvider,
    LoggedMessage, TxReceiptInfo, H160, H256,
};

use crate::{decode_message_log, log_message_published_topic};

/// Consecutive failed polls after which a block subscription is declared
/// lost
const MAX_POLL_FAILURES: u32 = 5;
const HEADER_BUFFER: usize = 64;

/// An `EvmProvider` over any ethers middleware, scoped to one core contract.
pub struct EthereumProvider<M>
where
    M: Middleware,
{
    provider: Arc<M>,
    contract: H160,
    poll_interval: Duration,
}

impl<M> Debug for EthereumProvider<M>
where
    M: Middleware,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthereumProvider")
            .field("contract", &self.contract)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl<M> EthereumProvider<M>
where
    M: Middleware + 'static,
{
    /// Create a provider for the core contract at `contract`
    pub fn new(provider: Arc<M>, contract: H160, poll_interval: Duration) -> Self {
        Self {
            provider,
            contract,
            poll_interval,
        }
    }

    fn decode_logs(&self, mut logs: Vec<Log>) -> ChainResult<Vec<LoggedMessage>> {
        let topic = log_message_published_topic();
        logs.retain(|log| log.address == self.contract && log.topics.first() == Some(&topic));
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        logs.iter().map(decode_message_log).collect()
    }
}

async fn fetch_block<M: Middleware + 'static>(provider: &M, id: BlockId) -> ChainResult<Option<BlockInfo>> {
    let Some(block) = provider
        .get_block(id)
        .await
        .map_err(ChainCommunicationError::from_other)?
    else {
        return Ok(None);
    };
    match (block.number, block.hash) {
        (Some(number), Some(hash)) => Ok(Some(BlockInfo {
            number: number.as_u64(),
            hash,
            timestamp: block.timestamp.low_u64(),
        })),
        // pending block
        _ => Ok(None),
    }
}

/// Push every block from `from` (or the current head) to `headers`, in
/// height order, until the receiver is dropped or the node stays unreachable.
/// A block that cannot be fetched is retried on the next tick.
async fn poll_blocks<M: Middleware + 'static>(
    provider: Arc<M>,
    headers: mpsc::Sender<BlockInfo>,
    interval: Duration,
    from: Option<u64>,
) -> ChainResult<()> {
    let mut next = from;
    let mut failures = 0;
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if headers.is_closed() {
            return Ok(());
        }
        let head = match provider.get_block_number().await {
            Ok(head) => head.as_u64(),
            Err(err) => {
                failures += 1;
                warn!(error = %err, failures, "Failed to poll block number");
                if failures >= MAX_POLL_FAILURES {
                    return Err(ChainCommunicationError::SubscriptionLost(err.to_string()));
                }
                continue;
            }
        };
        let mut failed = None;
        for number in next.unwrap_or(head)..=head {
            let id = BlockNumber::Number(U64::from(number)).into();
            let block = match fetch_block(provider.as_ref(), id).await {
                Ok(Some(block)) => block,
                Ok(None) => {
                    debug!(number, "Block not served yet");
                    break;
                }
                Err(err) => {
                    failed = Some(err);
                    break;
                }
            };
            if headers.send(block).await.is_err() {
                return Ok(());
            }
            next = Some(number + 1);
        }
        match failed {
            Some(err) => {
                failures += 1;
                warn!(error = %err, failures, "Failed to fetch block");
                if failures >= MAX_POLL_FAILURES {
                    return Err(ChainCommunicationError::SubscriptionLost(err.to_string()));
                }
            }
            None => failures = 0,
        }
    }
}

#[async_trait]
impl<M> EvmProvider for EthereumProvider<M>
where
    M: Middleware + 'static,
{
    async fn subscribe_blocks(&self, from: Option<u64>) -> ChainResult<BlockSubscription> {
        let (header_tx, headers) = mpsc::channel(HEADER_BUFFER);
        let (error_tx, errors) = oneshot::channel();
        let provider = self.provider.clone();
        let interval = self.poll_interval;
        tokio::spawn(
            async move {
                if let Err(err) = poll_blocks(provider, header_tx, interval, from).await {
                    let _ = error_tx.send(err);
                }
                debug!("Block subscription ended");
            }
            .instrument(info_span!("EvmBlockSubscription", contract = ?self.contract)),
        );
        Ok(BlockSubscription { headers, errors })
    }

    #[instrument(level = "debug", err, skip(self))]
    async fn block_number(&self) -> ChainResult<u64> {
        Ok(self
            .provider
            .get_block_number()
            .await
            .map_err(ChainCommunicationError::from_other)?
            .as_u64())
    }

    #[instrument(level = "debug", err, skip(self))]
    async fn block_by_hash(&self, hash: H256) -> ChainResult<Option<BlockInfo>> {
        fetch_block(self.provider.as_ref(), hash.into()).await
    }

    #[instrument(err, skip(self))]
    async fn published_messages(&self, block_hash: H256) -> ChainResult<Vec<LoggedMessage>> {
        let filter = Filter::new()
            .at_block_hash(block_hash)
            .address(self.contract)
            .topic0(log_message_published_topic());
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|err| ChainCommunicationError::LogFetchFailed(err.to_string()))?;
        self.decode_logs(logs)
    }

    #[instrument(err, skip(self))]
    async fn published_messages_in_range(
        &self,
        from: u64,
        to: u64,
    ) -> ChainResult<Vec<LoggedMessage>> {
        let filter = Filter::new()
            .from_block(from)
            .to_block(to)
            .address(self.contract)
            .topic0(log_message_published_topic());
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|err| ChainCommunicationError::LogFetchFailed(err.to_string()))?;
        self.decode_logs(logs)
    }

    #[instrument(err, skip(self))]
    async fn published_messages_in_tx(&self, tx_hash: H256) -> ChainResult<Vec<LoggedMessage>> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|err| ChainCommunicationError::LogFetchFailed(err.to_string()))?;
        match receipt {
            Some(receipt) => self.decode_logs(receipt.logs),
            None => Ok(vec![]),
        }
    }

    #[instrument(level = "debug", err, skip(self))]
    async fn transaction_sender(&self, tx_hash: H256) -> ChainResult<Option<H160>> {
        Ok(self
            .provider
            .get_transaction(tx_hash)
            .await
            .map_err(ChainCommunicationError::from_other)?
            .map(|tx| tx.from))
    }

    #[instrument(level = "debug", err, skip(self))]
    async fn transaction_receipt(&self, tx_hash: H256) -> ChainResult<Option<TxReceiptInfo>> {
        let Some(receipt) = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(ChainCommunicationError::from_other)?
        else {
            return Ok(None);
        };
        let (Some(block_hash), Some(block_number)) = (receipt.block_hash, receipt.block_number)
        else {
            return Ok(None);
        };
        Ok(Some(TxReceiptInfo {
            block_hash,
            block_number: block_number.as_u64(),
            // pre-byzantium receipts carry no status
            success: receipt.status.map_or(true, |status| status == U64::one()),
        }))
    }
}

#[cfg(test)]
mod test {
    use ethers::providers::{JsonRpcError, MockProvider, MockResponse, Provider};
    use ethers::types::{Address, Block, U256};

    use super::*;
    use crate::message_log::test::message_log;

    #[tokio::test]
    async fn keeps_only_core_contract_logs_in_index_order() {
        let contract = H160::repeat_byte(0xc0);
        let (provider, mock) = Provider::mocked();
        let block_hash = H256::repeat_byte(1);

        let mut foreign = message_log(H160::repeat_byte(1), 9, block_hash, 0);
        foreign.address = Address::repeat_byte(0xff);
        let mut second = message_log(H160::repeat_byte(1), 2, block_hash, 5);
        second.address = contract;
        let mut first = message_log(H160::repeat_byte(1), 1, block_hash, 2);
        first.address = contract;
        mock.push::<Vec<Log>, _>(vec![second, foreign, first]).unwrap();

        let provider: EthereumProvider<Provider<MockProvider>> =
            EthereumProvider::new(Arc::new(provider), contract, Duration::from_secs(1));
        let messages = provider.published_messages(block_hash).await.unwrap();
        let sequences: Vec<u64> = messages.iter().map(|m| m.message.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[tokio::test]
    async fn range_logs_are_ordered_by_block_then_index() {
        let contract = H160::repeat_byte(0xc0);
        let (provider, mock) = Provider::mocked();
        let mut logs = vec![];
        for (block, sequence, log_index) in [(11u64, 3u64, 0u64), (10, 2, 4), (10, 1, 1)] {
            let mut log = message_log(H160::repeat_byte(1), sequence, H256::zero(), log_index);
            log.address = contract;
            log.block_number = Some(U64::from(block));
            logs.push(log);
        }
        mock.push::<Vec<Log>, _>(logs).unwrap();

        let provider: EthereumProvider<Provider<MockProvider>> =
            EthereumProvider::new(Arc::new(provider), contract, Duration::from_secs(1));
        let messages = provider.published_messages_in_range(10, 11).await.unwrap();
        let sequences: Vec<u64> = messages.iter().map(|m| m.message.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn block_fetch_errors_are_retried_on_the_next_tick() {
        let (provider, mock) = Provider::mocked();
        let block: Block<H256> = Block {
            number: Some(U64::from(7)),
            hash: Some(H256::repeat_byte(7)),
            timestamp: U256::from(1_700_000_000u64),
            ..Default::default()
        };
        // responses are served last pushed first
        mock.push(block).unwrap();
        mock.push(U64::from(7)).unwrap();
        mock.push_response(MockResponse::Error(JsonRpcError {
            code: -32000,
            message: "header not found".into(),
            data: None,
        }));
        mock.push(U64::from(7)).unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        tokio::spawn(poll_blocks(
            Arc::new(provider),
            tx,
            Duration::from_millis(1),
            Some(7),
        ));
        let header = rx.recv().await.unwrap();
        assert_eq!(header.number, 7);
        assert_eq!(header.hash, H256::repeat_byte(7));
        assert_eq!(header.timestamp, 1_700_000_000);
    }
}
