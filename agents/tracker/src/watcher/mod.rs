//! Chain watchers. Each owns its pending state and publishes confirmed
//! transactions, grouped by block, to the recorder.

use prometheus::{IntCounterVec, IntGaugeVec};
use strum::IntoStaticStr;
use tracing::debug;

use explorer_base::CoreMetrics;

pub use alephium::ContractEventsWatcher;
pub use evm::EvmWatcher;

mod alephium;
mod evm;

/// Extract the bridge events of a transaction again
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReobservationRequest {
    /// Chain of the transaction
    pub chain_id: u16,
    /// Transaction hash or id in the chain's native form
    pub tx_hash: String,
}

/// Why an observed event was dropped before publication
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum OrphanReason {
    /// The receipt places the transaction in another block
    BlockhashMismatch,
    /// The transaction is no longer mined
    ReceiptMissing,
    /// The transaction failed
    Reverted,
    /// Not confirmed within the wait limit
    Timeout,
    /// The containing block left the main chain
    NotInMainChain,
}

/// Metrics of one chain's watcher
#[derive(Debug, Clone)]
pub struct WatcherMetrics {
    chain: String,
    orphaned: IntCounterVec,
    cursor: IntGaugeVec,
}

impl WatcherMetrics {
    /// Metrics labelled with the chain's name
    pub fn new(chain: &str, metrics: &CoreMetrics) -> Self {
        Self {
            chain: chain.to_owned(),
            orphaned: metrics.orphaned_messages(),
            cursor: metrics.watcher_cursor(),
        }
    }

    fn orphaned(&self, reason: OrphanReason, tx: &str) {
        let reason: &'static str = reason.into();
        debug!(chain = %self.chain, tx, reason, "Dropped orphaned message");
        self.orphaned
            .with_label_values(&[&self.chain, reason])
            .inc();
    }

    fn cursor(&self, value: u64) {
        self.cursor
            .with_label_values(&[&self.chain])
            .set(value as i64);
    }

    #[cfg(test)]
    fn orphaned_count(&self, reason: OrphanReason) -> u64 {
        self.orphaned
            .with_label_values(&[&self.chain, reason.into()])
            .get()
    }
}

/// The effective confirmation depth of a message: its own request, raised
/// to the chain's minimum.
pub fn effective_confirmations(consistency_level: u8, min_confirmations: u64) -> u64 {
    u64::from(consistency_level).max(min_confirmations)
}
