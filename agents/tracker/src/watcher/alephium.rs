use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use itertools::Itertools;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use explorer_core::{
    BlockTransactions, BridgeTransaction, ChainBlockHeader, ContractEvent, ContractEventsProvider,
    Emitter,
};

use super::{effective_confirmations, OrphanReason, ReobservationRequest, WatcherMetrics};
use crate::error::WatcherError;

/// Polls the event counter of a bridge contract whose events carry a
/// native ordinal, publishing events block by block once confirmed.
#[derive(Debug)]
pub struct ContractEventsWatcher {
    chain: u16,
    provider: Arc<dyn ContractEventsProvider>,
    next_index: u64,
    batch_size: u64,
    min_confirmations: u64,
    block_time: Duration,
    confirmed: mpsc::Sender<BlockTransactions>,
    metrics: WatcherMetrics,
}

/// Outcome of processing the events of one block
enum GroupOutcome {
    Published,
    Orphaned,
    Unconfirmed,
}

impl ContractEventsWatcher {
    /// Create a watcher resuming at event `next_index`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: u16,
        provider: Arc<dyn ContractEventsProvider>,
        next_index: u64,
        batch_size: u64,
        min_confirmations: u64,
        block_time: Duration,
        confirmed: mpsc::Sender<BlockTransactions>,
        metrics: WatcherMetrics,
    ) -> Self {
        Self {
            chain,
            provider,
            next_index,
            batch_size: batch_size.max(1),
            min_confirmations,
            block_time,
            confirmed,
            metrics,
        }
    }

    /// Index of the next event to process
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Poll every `period` and serve reobservation requests
    pub async fn run(
        mut self,
        period: Duration,
        reobservations: Arc<Mutex<mpsc::Receiver<ReobservationRequest>>>,
    ) -> Result<()> {
        let mut reobservations = reobservations.lock().await;
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(chain = self.chain, next_index = self.next_index, "Watching contract events");
        let mut requests_open = true;
        loop {
            tokio::select! {
                _ = ticker.tick() => match self.poll().await {
                    Err(WatcherError::RecorderStopped) => {
                        return Err(WatcherError::RecorderStopped.into())
                    }
                    Err(err) => warn!(
                        chain = self.chain,
                        next_index = self.next_index,
                        error = %err,
                        "Failed to poll contract events"
                    ),
                    Ok(()) => {}
                },
                request = reobservations.recv(), if requests_open => match request {
                    Some(request) => {
                        if let Err(err) = self.reobserve(&request).await {
                            warn!(
                                chain = self.chain,
                                tx = %request.tx_hash,
                                error = %err,
                                "Reobservation failed"
                            );
                        }
                    }
                    None => requests_open = false,
                },
            }
        }
    }

    /// Process events from the cursor up to the current count, stopping at
    /// the first block that is not confirmed yet.
    #[instrument(skip(self), fields(chain = self.chain, next_index = self.next_index))]
    pub async fn poll(&mut self) -> Result<(), WatcherError> {
        let count = self
            .provider
            .events_count()
            .await
            .map_err(WatcherError::LogFetchFailed)?;
        if self.next_index >= count {
            return Ok(());
        }
        let tip = self.provider.tip_header().await?;

        while self.next_index < count {
            let limit = self.batch_size.min(count - self.next_index);
            let events = self
                .provider
                .events(self.next_index, limit)
                .await
                .map_err(WatcherError::LogFetchFailed)?;
            if events.is_empty() {
                break;
            }
            // a block cut by the page boundary is published in two parts;
            // the recorder writes per transaction so both parts land whole
            for group in group_by_block(events) {
                let last = group.last().map_or(self.next_index, |event| event.event_index);
                match self.process_group(group, &tip).await? {
                    GroupOutcome::Unconfirmed => {
                        self.metrics.cursor(self.next_index);
                        return Ok(());
                    }
                    GroupOutcome::Published | GroupOutcome::Orphaned => {
                        self.next_index = last + 1;
                    }
                }
            }
        }
        self.metrics.cursor(self.next_index);
        Ok(())
    }

    async fn process_group(
        &self,
        events: Vec<ContractEvent>,
        tip: &ChainBlockHeader,
    ) -> Result<GroupOutcome, WatcherError> {
        let Some(first) = events.first() else {
            return Ok(GroupOutcome::Published);
        };
        let block_hash = first.block_hash.clone();
        let header = self
            .provider
            .block_header(&block_hash)
            .await?
            .ok_or_else(|| WatcherError::BlockUnavailable(block_hash.clone()))?;

        let confirmations = events
            .iter()
            .map(|event| {
                effective_confirmations(event.message.consistency_level, self.min_confirmations)
            })
            .max()
            .unwrap_or(self.min_confirmations);
        let delay = self.block_time.as_millis() as u64 * confirmations;
        if tip.timestamp < header.timestamp + delay {
            debug!(block = %block_hash, confirmations, "Block not confirmed yet");
            return Ok(GroupOutcome::Unconfirmed);
        }

        if !self.provider.is_block_in_main_chain(&block_hash).await? {
            let err = WatcherError::ForkDetected(block_hash.clone());
            warn!(chain = self.chain, error = %err, events = events.len(), "Dropping events");
            for event in &events {
                self.metrics.orphaned(OrphanReason::NotInMainChain, &event.tx_id);
            }
            return Ok(GroupOutcome::Orphaned);
        }

        let mut transactions = Vec::with_capacity(events.len());
        for event in events {
            transactions.push(self.bridge_transaction(event, &header).await?);
        }
        debug!(block = %block_hash, txs = transactions.len(), "Publishing confirmed transactions");
        self.confirmed
            .send(BlockTransactions {
                chain: self.chain,
                block_hash,
                block_number: header.height,
                block_timestamp: header.timestamp,
                transactions,
            })
            .await
            .map_err(|_| WatcherError::RecorderStopped)?;
        Ok(GroupOutcome::Published)
    }

    async fn bridge_transaction(
        &self,
        event: ContractEvent,
        header: &ChainBlockHeader,
    ) -> Result<BridgeTransaction, WatcherError> {
        let sender = match self.provider.transaction_sender(&event.tx_id).await? {
            Some(sender) => sender,
            None => {
                let err = WatcherError::TxSenderUnknown(event.tx_id.clone());
                warn!(chain = self.chain, error = %err, "Recording transaction without sender");
                String::new()
            }
        };
        let emitter = Emitter {
            chain: self.chain,
            address: event.message.emitter,
            target_chain: event.message.target_chain,
        };
        Ok(BridgeTransaction {
            vaa_id: emitter.vaa_id(event.message.sequence),
            tx_id: event.tx_id,
            sender_address: sender,
            block_hash: event.block_hash,
            block_number: header.height,
            block_timestamp: header.timestamp,
            event_index: event.event_index,
        })
    }

    /// Extract the events of a transaction again. Unconfirmed blocks are
    /// skipped; the request can be repeated once they are.
    #[instrument(skip(self), fields(chain = self.chain))]
    pub async fn reobserve(&mut self, request: &ReobservationRequest) -> Result<(), WatcherError> {
        let events = self
            .provider
            .events_by_tx(&request.tx_hash)
            .await
            .map_err(WatcherError::LogFetchFailed)?;
        info!(events = events.len(), "Reobserving transaction");
        let tip = self.provider.tip_header().await?;
        for group in group_by_block(events) {
            if let GroupOutcome::Unconfirmed = self.process_group(group, &tip).await? {
                info!(tx = %request.tx_hash, "Reobserved transaction not confirmed yet");
            }
        }
        Ok(())
    }
}

/// Split events into runs sharing a block, keeping their order
fn group_by_block(events: Vec<ContractEvent>) -> Vec<Vec<ContractEvent>> {
    events
        .into_iter()
        .group_by(|event| event.block_hash.clone())
        .into_iter()
        .map(|(_, group)| group.collect())
        .collect()
}

#[cfg(test)]
mod test {
    use explorer_base::CoreMetrics;
    use explorer_core::{MessagePublication, H256};
    use explorer_test::mocks::MockContractEventsProvider;
    use prometheus::Registry;
    use tracing_test::traced_test;

    use super::*;

    const CHAIN: u16 = 255;
    const BLOCK_TIME_MS: u64 = 1000;

    fn event(index: u64, block: &str) -> ContractEvent {
        ContractEvent {
            message: MessagePublication {
                emitter: H256::repeat_byte(0xa1),
                sequence: index,
                nonce: 0,
                target_chain: 2,
                payload: vec![],
                consistency_level: 0,
            },
            tx_id: format!("tx{index}"),
            block_hash: block.to_owned(),
            event_index: index,
        }
    }

    fn header(hash: &str, height: u64) -> ChainBlockHeader {
        ChainBlockHeader {
            hash: hash.to_owned(),
            height,
            timestamp: height * BLOCK_TIME_MS,
        }
    }

    /// Events 0..5 spread over blocks a, a, b, c, c at heights 10, 11, 12
    fn provider(tip: u64, orphaned: &'static str) -> MockContractEventsProvider {
        let events = vec![
            event(0, "a"),
            event(1, "a"),
            event(2, "b"),
            event(3, "c"),
            event(4, "c"),
        ];
        let mut provider = MockContractEventsProvider::new();
        provider.expect__events_count().returning(|| Ok(5));
        provider.expect__events().returning(move |start, limit| {
            Ok(events
                .iter()
                .filter(|e| e.event_index >= start && e.event_index < start + limit)
                .cloned()
                .collect())
        });
        provider
            .expect__tip_header()
            .returning(move || Ok(header("tip", tip)));
        provider.expect__block_header().returning(|hash| {
            let height = match hash {
                "a" => 10,
                "b" => 11,
                _ => 12,
            };
            Ok(Some(header(hash, height)))
        });
        provider
            .expect__is_block_in_main_chain()
            .returning(move |hash| Ok(hash != orphaned));
        provider
            .expect__transaction_sender()
            .returning(|tx| Ok(Some(format!("sender-of-{tx}"))));
        provider
    }

    fn watcher(
        provider: MockContractEventsProvider,
        next_index: u64,
        min_confirmations: u64,
    ) -> (
        ContractEventsWatcher,
        mpsc::Receiver<BlockTransactions>,
        WatcherMetrics,
    ) {
        let metrics = CoreMetrics::new("test", Registry::new()).unwrap();
        let metrics = WatcherMetrics::new("alephium", &metrics);
        let (sender, receiver) = mpsc::channel(16);
        let watcher = ContractEventsWatcher::new(
            CHAIN,
            Arc::new(provider),
            next_index,
            2,
            min_confirmations,
            Duration::from_millis(BLOCK_TIME_MS),
            sender,
            metrics.clone(),
        );
        (watcher, receiver, metrics)
    }

    #[tokio::test]
    async fn events_are_published_per_block_in_order() {
        let (mut watcher, mut confirmed, metrics) = watcher(provider(20, "none"), 0, 1);
        watcher.poll().await.unwrap();
        assert_eq!(watcher.next_index(), 5);

        let blocks: Vec<BlockTransactions> =
            std::iter::from_fn(|| confirmed.try_recv().ok()).collect();
        let hashes: Vec<&str> = blocks.iter().map(|b| b.block_hash.as_str()).collect();
        // batches of two split block c's run from block b
        assert_eq!(hashes, vec!["a", "b", "c", "c"]);
        assert_eq!(blocks[0].transactions.len(), 2);
        assert_eq!(blocks[0].block_timestamp, 10 * BLOCK_TIME_MS);
        assert_eq!(blocks[0].transactions[1].sender_address, "sender-of-tx1");
        assert_eq!(blocks[2].transactions[0].event_index, 3);
        assert_eq!(metrics.orphaned_count(OrphanReason::NotInMainChain), 0);
    }

    #[tokio::test]
    async fn unconfirmed_blocks_hold_the_cursor() {
        // block b (height 11) needs 2 blocks of delay, the tip is at 12
        let (mut watcher, mut confirmed, _) = watcher(provider(12, "none"), 0, 2);
        watcher.poll().await.unwrap();
        assert_eq!(watcher.next_index(), 2);
        assert_eq!(confirmed.try_recv().unwrap().block_hash, "a");
        assert!(confirmed.try_recv().is_err());
    }

    #[tokio::test]
    #[traced_test]
    async fn events_of_side_chain_blocks_are_dropped() {
        let (mut watcher, mut confirmed, metrics) = watcher(provider(20, "b"), 1, 0);
        watcher.poll().await.unwrap();
        assert_eq!(watcher.next_index(), 5);
        let hashes: Vec<String> = std::iter::from_fn(|| confirmed.try_recv().ok())
            .map(|b| b.block_hash)
            .collect();
        assert_eq!(hashes, vec!["a", "c"]);
        assert_eq!(metrics.orphaned_count(OrphanReason::NotInMainChain), 1);
        assert!(logs_contain("Dropping events"));
    }

    #[tokio::test]
    async fn reobservation_republishes_confirmed_events() {
        let mut provider = provider(20, "none");
        provider
            .expect__events_by_tx()
            .returning(|tx| Ok(vec![event(tx[2..].parse().unwrap(), "b")]));
        let (mut watcher, mut confirmed, _) = watcher(provider, 5, 0);
        watcher
            .reobserve(&ReobservationRequest {
                chain_id: CHAIN,
                tx_hash: "tx2".to_owned(),
            })
            .await
            .unwrap();
        let block = confirmed.try_recv().unwrap();
        assert_eq!(block.transactions[0].tx_id, "tx2");
        assert_eq!(watcher.next_index(), 5);
    }
}
