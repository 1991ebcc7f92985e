use std::error::Error as StdError;

/// The result of interacting with a chain or a peer.
pub type ChainResult<T> = Result<T, ChainCommunicationError>;

/// Errors from the canonical byte codecs of stored types.
#[derive(Debug, thiserror::Error)]
pub enum ExplorerProtocolError {
    /// IO error from Read/Write usage
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    /// A string field held invalid UTF-8
    #[error("Invalid utf-8 in encoded string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    /// A tag byte did not match any known variant
    #[error("Unknown tag {tag} while decoding {ty}")]
    UnknownTag {
        /// Decoded type
        ty: &'static str,
        /// The offending tag
        tag: u8,
    },
}

/// Errors parsing the signed message wire format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaaError {
    /// The bytes do not form a well formed message
    #[error("Malformed VAA: {0}")]
    MalformedVaa(String),
}

/// Errors verifying a parsed message against the guardian set history.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// The guardian set index is not (yet) known
    #[error("Unknown guardian set {0}")]
    UnknownGuardianSet(u32),
    /// Fewer signatures than the quorum of the set
    #[error("No quorum: {signatures} signatures, {quorum} required")]
    NoQuorum {
        /// Signatures present
        signatures: usize,
        /// Signatures required
        quorum: usize,
    },
    /// A signature failed to recover or recovered to the wrong guardian
    #[error("Bad signature from guardian {0}")]
    BadSignature(u8),
}

/// Errors parsing a message id of the form
/// `emitterChain/emitterAddress/targetChain/sequence`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageIdError {
    /// Wrong number of `/` separated parts
    #[error("Expected 4 parts in message id, found {0}")]
    WrongPartCount(usize),
    /// A numeric part did not parse
    #[error("Invalid number `{0}` in message id")]
    InvalidNumber(String),
    /// The emitter address was not 64 hex characters
    #[error("Invalid emitter address `{0}` in message id")]
    InvalidEmitterAddress(String),
}

/// Errors decoding a message payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    /// Payload id is not handled for this emitter
    #[error("Unsupported payload with id {0}")]
    UnsupportedPayload(u8),
    /// Payload has the wrong length or a field is invalid
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

/// ChainCommunicationError contains errors returned when attempting to
/// call a chain, a guardian peer, or a notification sink.
#[derive(Debug, thiserror::Error)]
pub enum ChainCommunicationError {
    /// The requested block could not be fetched
    #[error("Block {0} unavailable")]
    BlockUnavailable(String),
    /// Logs or contract events could not be fetched
    #[error("Failed to fetch logs: {0}")]
    LogFetchFailed(String),
    /// A subscription stream ended or errored
    #[error("Subscription lost: {0}")]
    SubscriptionLost(String),
    /// A custom error from a provider implementation
    #[error(transparent)]
    Other(Box<dyn StdError + Send + Sync>),
    /// A free form error
    #[error("{0}")]
    CustomError(String),
}

impl ChainCommunicationError {
    /// Wrap any error
    pub fn from_other<E: StdError + Send + Sync + 'static>(err: E) -> Self {
        Self::Other(Box::new(err))
    }

    /// Creates a chain communication error of the other error variant from a static string
    pub fn from_other_str(err: &str) -> Self {
        Self::CustomError(err.to_owned())
    }
}
