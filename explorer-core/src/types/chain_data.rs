use tokio::sync::{mpsc, oneshot};

use crate::{ChainCommunicationError, H256};

/// Header of an EVM block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Height
    pub number: u64,
    /// Hash
    pub hash: H256,
    /// Seconds since epoch
    pub timestamp: u64,
}

/// The fields of a bridge message publication event, common to all chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePublication {
    /// Emitter contract, padded to 32 bytes
    pub emitter: H256,
    /// Sequence
    pub sequence: u64,
    /// Nonce
    pub nonce: u32,
    /// Target chain
    pub target_chain: u16,
    /// Payload
    pub payload: Vec<u8>,
    /// Requested confirmation depth
    pub consistency_level: u8,
}

/// A `LogMessagePublished` log of an EVM chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedMessage {
    /// The publication
    pub message: MessagePublication,
    /// Transaction that emitted the log
    pub tx_hash: H256,
    /// Block containing the transaction
    pub block_hash: H256,
    /// Height of the block
    pub block_number: u64,
    /// Position of the log in the block
    pub log_index: u64,
}

/// The parts of a transaction receipt the watcher checks before confirming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceiptInfo {
    /// Block the transaction is currently included in
    pub block_hash: H256,
    /// Height of that block
    pub block_number: u64,
    /// Whether execution succeeded
    pub success: bool,
}

/// A bridge message event of a chain that numbers its contract events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractEvent {
    /// The publication
    pub message: MessagePublication,
    /// Transaction that emitted the event
    pub tx_id: String,
    /// Block containing the transaction
    pub block_hash: String,
    /// Ordinal of the event within the contract
    pub event_index: u64,
}

/// Header of a block on a contract-event chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBlockHeader {
    /// Hash
    pub hash: String,
    /// Height
    pub height: u64,
    /// Milliseconds since epoch
    pub timestamp: u64,
}

/// One entry of a peer guardian's batch response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaaBatchEntry {
    /// Sequence of the message
    pub sequence: u64,
    /// Raw wire bytes
    pub vaa_bytes: Vec<u8>,
}

/// A push model subscription to new block headers. Headers arrive on
/// `headers`; a terminal error is delivered once on `errors`. Dropping the
/// subscription tells the producer to stop.
#[derive(Debug)]
pub struct BlockSubscription {
    /// New headers, in arrival order
    pub headers: mpsc::Receiver<BlockInfo>,
    /// The reason the subscription ended
    pub errors: oneshot::Receiver<ChainCommunicationError>,
}
