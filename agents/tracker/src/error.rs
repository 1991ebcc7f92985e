use explorer_base::db::DbError;
use explorer_core::ChainCommunicationError;

/// Errors of a chain watcher. Only a lost subscription ends the watcher;
/// everything else is logged and retried from the last confirmed cursor.
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    /// A block referenced by an event could not be fetched
    #[error("Block {0} unavailable")]
    BlockUnavailable(String),
    /// Logs or contract events could not be fetched
    #[error("Failed to fetch bridge events: {0}")]
    LogFetchFailed(#[source] ChainCommunicationError),
    /// An event's block left the canonical chain
    #[error("Block {0} is no longer canonical")]
    ForkDetected(String),
    /// The sender of a transaction could not be resolved
    #[error("Sender of {0} unknown")]
    TxSenderUnknown(String),
    /// The block subscription ended
    #[error("Block subscription lost: {0}")]
    SubscriptionLost(#[source] ChainCommunicationError),
    /// A reobservation named a transaction the chain cannot parse
    #[error("Invalid transaction hash {0}")]
    InvalidTxHash(String),
    /// Any other provider failure
    #[error(transparent)]
    Provider(#[from] ChainCommunicationError),
    /// The recorder stopped
    #[error("Transaction recorder stopped")]
    RecorderStopped,
    /// The store failed
    #[error(transparent)]
    Db(#[from] DbError),
}
