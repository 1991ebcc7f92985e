use explorer_base::db::DbError;
use explorer_core::{ChainCommunicationError, MessageIdError, VaaError, VerifyError};

/// Reasons a gossip message is dropped before persistence. None of them is
/// reported back to the sender.
#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    /// The bytes do not form a well formed message
    #[error(transparent)]
    Malformed(#[from] VaaError),
    /// The signatures do not verify
    #[error(transparent)]
    Verify(#[from] VerifyError),
    /// The persistence queue is full
    #[error("Persistence queue is full")]
    QueueFull,
    /// The persistence stage stopped
    #[error("Persistence queue is closed")]
    QueueClosed,
    /// An observation's message id did not parse
    #[error(transparent)]
    BadMessageId(#[from] MessageIdError),
    /// An observation or heartbeat is not signed by a current guardian
    #[error("Not signed by a current guardian: {0}")]
    BadEnvelope(String),
    /// The envelope did not decode
    #[error("Undecodable gossip envelope: {0}")]
    Undecodable(#[from] prost::DecodeError),
    /// Storing an observation or heartbeat failed
    #[error(transparent)]
    Db(#[from] DbError),
}

impl IngressError {
    /// Label of the dropped message metric
    pub fn reason(&self) -> &'static str {
        match self {
            IngressError::Malformed(_) | IngressError::Undecodable(_) => "malformed_vaa",
            IngressError::Verify(VerifyError::UnknownGuardianSet(_)) => "unknown_guardian_set",
            IngressError::Verify(VerifyError::NoQuorum { .. }) => "no_quorum",
            IngressError::Verify(VerifyError::BadSignature(_)) => "bad_signature",
            IngressError::QueueFull => "queue_full",
            IngressError::QueueClosed => "queue_closed",
            IngressError::BadMessageId(_) | IngressError::BadEnvelope(_) => "bad_envelope",
            IngressError::Db(_) => "db_error",
        }
    }
}

/// Errors of one backfill round. The round is retried on the next tick.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The peer could not be reached or failed the call
    #[error("Peer guardian rpc unavailable: {0}")]
    PeerRpcUnavailable(#[from] ChainCommunicationError),
    /// The store failed
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Errors of the statistics aggregator
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    /// A transfer amount is not a decimal integer
    #[error("Invalid amount `{0}`")]
    InvalidAmount(String),
    /// The store failed
    #[error(transparent)]
    Db(#[from] DbError),
}
