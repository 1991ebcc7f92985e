use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use eyre::Result;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, instrument, warn};

use explorer_core::{
    utils::hex_to_h256, BlockInfo, BlockTransactions, BridgeTransaction, ChainCommunicationError,
    Emitter, EvmProvider, LoggedMessage, H256,
};

use super::{effective_confirmations, OrphanReason, ReobservationRequest, WatcherMetrics};
use crate::error::WatcherError;

/// `(tx hash, block hash, emitter, sequence)`
type PendingKey = (H256, H256, H256, u64);

/// Blocks covered by one log query while catching up
const BACKFILL_RANGE: u64 = 1_000;

#[derive(Debug, Clone)]
struct PendingMessage {
    logged: LoggedMessage,
    /// `None` until the sender lookup succeeds
    sender: Option<String>,
    block_timestamp: u64,
    confirm_at: u64,
    expires_at: u64,
}

/// Follows new blocks of an EVM chain, holding each published message until
/// its confirmation depth is reached and its receipt still places it in the
/// block it was observed in.
#[derive(Debug)]
pub struct EvmWatcher {
    chain: u16,
    provider: Arc<dyn EvmProvider>,
    min_confirmations: u64,
    max_wait_confirmations: u64,
    pending: BTreeMap<PendingKey, PendingMessage>,
    /// Blocks whose logs could not be fetched yet, by height
    unscanned: BTreeMap<u64, BlockInfo>,
    resume_from: Option<u64>,
    confirmed: mpsc::Sender<BlockTransactions>,
    metrics: WatcherMetrics,
}

impl EvmWatcher {
    /// Create a watcher publishing to `confirmed`
    pub fn new(
        chain: u16,
        provider: Arc<dyn EvmProvider>,
        min_confirmations: u64,
        max_wait_confirmations: u64,
        confirmed: mpsc::Sender<BlockTransactions>,
        metrics: WatcherMetrics,
    ) -> Self {
        Self {
            chain,
            provider,
            min_confirmations,
            max_wait_confirmations,
            pending: BTreeMap::new(),
            unscanned: BTreeMap::new(),
            resume_from: None,
            confirmed,
            metrics,
        }
    }

    /// Scan the blocks from `height` up to the head before following new
    /// blocks
    pub fn resume_from(mut self, height: u64) -> Self {
        self.resume_from = Some(height);
        self
    }

    /// Consume new blocks and reobservation requests until the subscription
    /// is lost.
    pub async fn run(
        mut self,
        reobservations: Arc<Mutex<mpsc::Receiver<ReobservationRequest>>>,
    ) -> Result<()> {
        let mut reobservations = reobservations.lock().await;
        let head = self.provider.block_number().await?;
        let from = match self.resume_from.take() {
            Some(from) if from <= head => {
                self.backfill(from, head).await?;
                head + 1
            }
            Some(from) => from,
            None => head,
        };
        let mut subscription = self
            .provider
            .subscribe_blocks(Some(from))
            .await
            .map_err(WatcherError::SubscriptionLost)?;
        info!(chain = self.chain, from, "Subscribed to new blocks");
        let mut requests_open = true;
        loop {
            tokio::select! {
                block = subscription.headers.recv() => {
                    let Some(block) = block else {
                        let err = (&mut subscription.errors).await.unwrap_or_else(|_| {
                            ChainCommunicationError::SubscriptionLost(
                                "header stream closed".to_owned(),
                            )
                        });
                        return Err(WatcherError::SubscriptionLost(err).into());
                    };
                    match self.handle_block(block).await {
                        Err(WatcherError::RecorderStopped) => {
                            return Err(WatcherError::RecorderStopped.into())
                        }
                        Err(err) => warn!(
                            chain = self.chain,
                            block = block.number,
                            error = %err,
                            "Failed to process block"
                        ),
                        Ok(()) => {}
                    }
                }
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

    /// Track the messages published in `block` and publish those whose
    /// confirmation depth it reaches.
    #[instrument(skip_all, fields(chain = self.chain, block = block.number))]
    pub async fn handle_block(&mut self, block: BlockInfo) -> Result<(), WatcherError> {
        self.unscanned.insert(block.number, block);
        self.scan_unscanned(block.number).await;
        self.confirm_up_to(block.number).await?;
        self.metrics.cursor(block.number);
        Ok(())
    }

    /// Fetch the logs of every block not scanned yet. A block whose logs stay
    /// unavailable for the wait limit is given up on.
    async fn scan_unscanned(&mut self, height: u64) {
        let blocks: Vec<BlockInfo> = self.unscanned.values().copied().collect();
        for block in blocks {
            match self.provider.published_messages(block.hash).await {
                Ok(logs) => {
                    self.unscanned.remove(&block.number);
                    for logged in logs {
                        self.track(logged, block.timestamp).await;
                    }
                }
                Err(err) if height >= block.number + self.max_wait_confirmations => {
                    self.unscanned.remove(&block.number);
                    warn!(
                        chain = self.chain,
                        block = block.number,
                        error = %WatcherError::LogFetchFailed(err),
                        "Giving up on block"
                    );
                }
                Err(err) => debug!(
                    block = block.number,
                    error = %err,
                    "Logs unavailable, retrying next block"
                ),
            }
        }
    }

    /// Track every message published in `[from, head]`, then publish the
    /// ones already deep enough.
    #[instrument(skip(self), fields(chain = self.chain))]
    async fn backfill(&mut self, from: u64, head: u64) -> Result<(), WatcherError> {
        info!("Scanning blocks published while stopped");
        let mut timestamps: HashMap<H256, u64> = HashMap::new();
        let mut start = from;
        while start <= head {
            let end = head.min(start + BACKFILL_RANGE - 1);
            let logs = self
                .provider
                .published_messages_in_range(start, end)
                .await
                .map_err(WatcherError::LogFetchFailed)?;
            for logged in logs {
                let timestamp = match timestamps.get(&logged.block_hash) {
                    Some(timestamp) => *timestamp,
                    None => {
                        let block = self
                            .provider
                            .block_by_hash(logged.block_hash)
                            .await?
                            .ok_or_else(|| {
                                WatcherError::BlockUnavailable(format!("{:?}", logged.block_hash))
                            })?;
                        timestamps.insert(block.hash, block.timestamp);
                        block.timestamp
                    }
                };
                self.track(logged, timestamp).await;
            }
            self.confirm_up_to(head).await?;
            self.metrics.cursor(end);
            start = end + 1;
        }
        Ok(())
    }

    /// Sender of a transaction in `0x` form, empty if the chain does not know
    /// the transaction and `None` if the lookup failed.
    async fn sender_of(&self, tx_hash: H256) -> Option<String> {
        match self.provider.transaction_sender(tx_hash).await {
            Ok(Some(sender)) => Some(format!("0x{}", hex::encode(sender))),
            Ok(None) => {
                let err = WatcherError::TxSenderUnknown(format!("{:?}", tx_hash));
                warn!(chain = self.chain, error = %err, "Recording transaction without sender");
                Some(String::new())
            }
            Err(err) => {
                debug!(tx = ?tx_hash, error = %err, "Sender lookup failed");
                None
            }
        }
    }

    async fn track(&mut self, logged: LoggedMessage, block_timestamp: u64) {
        let key = (
            logged.tx_hash,
            logged.block_hash,
            logged.message.emitter,
            logged.message.sequence,
        );
        if self.pending.contains_key(&key) {
            return;
        }
        let sender = self.sender_of(logged.tx_hash).await;
        let confirmations =
            effective_confirmations(logged.message.consistency_level, self.min_confirmations);
        let confirm_at = logged.block_number + confirmations;
        debug!(
            tx = ?logged.tx_hash,
            sequence = logged.message.sequence,
            confirm_at,
            "Tracking published message"
        );
        self.pending.insert(
            key,
            PendingMessage {
                sender,
                block_timestamp,
                confirm_at,
                expires_at: confirm_at + self.max_wait_confirmations,
                logged,
            },
        );
    }

    /// Re-check the receipt of every message due at `height`, publishing
    /// the ones still in their block. Messages whose receipt cannot be
    /// fetched stay pending until they expire.
    async fn confirm_up_to(&mut self, height: u64) -> Result<(), WatcherError> {
        let due: Vec<PendingKey> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.confirm_at <= height)
            .map(|(key, _)| *key)
            .collect();

        let mut confirmed = vec![];
        for key in due {
            let Some(pending) = self.pending.get(&key) else {
                continue;
            };
            let tx = format!("{:?}", pending.logged.tx_hash);
            let receipt = match self.provider.transaction_receipt(pending.logged.tx_hash).await {
                Ok(receipt) => receipt,
                Err(err) => {
                    if height >= pending.expires_at {
                        self.pending.remove(&key);
                        self.metrics.orphaned(OrphanReason::Timeout, &tx);
                    } else {
                        debug!(tx, error = %err, "Receipt unavailable, retrying next block");
                    }
                    continue;
                }
            };
            let Some(mut pending) = self.pending.remove(&key) else {
                continue;
            };
            match receipt {
                None => self.metrics.orphaned(OrphanReason::ReceiptMissing, &tx),
                Some(receipt) if receipt.block_hash != pending.logged.block_hash => {
                    self.metrics.orphaned(OrphanReason::BlockhashMismatch, &tx)
                }
                Some(receipt) if !receipt.success => {
                    self.metrics.orphaned(OrphanReason::Reverted, &tx)
                }
                Some(_) => {
                    if pending.sender.is_none() {
                        pending.sender = match self.sender_of(pending.logged.tx_hash).await {
                            Some(sender) => Some(sender),
                            None => {
                                let err = WatcherError::TxSenderUnknown(tx.clone());
                                warn!(
                                    chain = self.chain,
                                    error = %err,
                                    "Recording transaction without sender"
                                );
                                Some(String::new())
                            }
                        };
                    }
                    confirmed.push(pending)
                }
            }
        }
        self.publish(confirmed).await
    }

    async fn publish(&self, mut confirmed: Vec<PendingMessage>) -> Result<(), WatcherError> {
        confirmed.sort_by_key(|pending| (pending.logged.block_number, pending.logged.log_index));
        let mut blocks: Vec<BlockTransactions> = vec![];
        for pending in confirmed {
            let block_hash = format!("{:?}", pending.logged.block_hash);
            let transaction = self.bridge_transaction(&pending, &block_hash);
            match blocks.last_mut() {
                Some(block) if block.block_hash == block_hash => {
                    block.transactions.push(transaction)
                }
                _ => blocks.push(BlockTransactions {
                    chain: self.chain,
                    block_hash,
                    block_number: pending.logged.block_number,
                    block_timestamp: pending.block_timestamp * 1000,
                    transactions: vec![transaction],
                }),
            }
        }
        for block in blocks {
            debug!(
                block = %block.block_hash,
                txs = block.transactions.len(),
                "Publishing confirmed transactions"
            );
            self.confirmed
                .send(block)
                .await
                .map_err(|_| WatcherError::RecorderStopped)?;
        }
        Ok(())
    }

    fn bridge_transaction(&self, pending: &PendingMessage, block_hash: &str) -> BridgeTransaction {
        let message = &pending.logged.message;
        let emitter = Emitter {
            chain: self.chain,
            address: message.emitter,
            target_chain: message.target_chain,
        };
        BridgeTransaction {
            vaa_id: emitter.vaa_id(message.sequence),
            tx_id: format!("{:?}", pending.logged.tx_hash),
            sender_address: pending.sender.clone().unwrap_or_default(),
            block_hash: block_hash.to_owned(),
            block_number: pending.logged.block_number,
            block_timestamp: pending.block_timestamp * 1000,
            event_index: pending.logged.block_number,
        }
    }

    /// Extract the messages of a transaction again and apply the usual
    /// confirmation policy at the current height.
    #[instrument(skip(self), fields(chain = self.chain))]
    pub async fn reobserve(&mut self, request: &ReobservationRequest) -> Result<(), WatcherError> {
        let tx_hash = hex_to_h256(&request.tx_hash)
            .ok_or_else(|| WatcherError::InvalidTxHash(request.tx_hash.clone()))?;
        let logs = self
            .provider
            .published_messages_in_tx(tx_hash)
            .await
            .map_err(WatcherError::LogFetchFailed)?;
        info!(messages = logs.len(), "Reobserving transaction");
        for logged in logs {
            let block = self
                .provider
                .block_by_hash(logged.block_hash)
                .await?
                .ok_or_else(|| {
                    WatcherError::BlockUnavailable(format!("{:?}", logged.block_hash))
                })?;
            self.track(logged, block.timestamp).await;
        }
        let height = self.provider.block_number().await?;
        self.confirm_up_to(height).await
    }
}
