//! Chain facing interfaces used by the watchers. Each returns already
//! normalized data so watchers stay chain agnostic.

use std::fmt::Debug;

use async_trait::async_trait;
use auto_impl::auto_impl;

use crate::{
    BlockInfo, BlockSubscription, ChainBlockHeader, ChainResult, ContractEvent, LoggedMessage,
    TxReceiptInfo, H160, H256,
};

/// An EVM chain with the bridge core contract deployed.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait EvmProvider: Send + Sync + Debug {
    /// Subscribe to block headers from height `from` onwards, or from the
    /// current head when `from` is `None`
    async fn subscribe_blocks(&self, from: Option<u64>) -> ChainResult<BlockSubscription>;

    /// Latest block height
    async fn block_number(&self) -> ChainResult<u64>;

    /// Block by hash, `None` if the node does not know it
    async fn block_by_hash(&self, hash: H256) -> ChainResult<Option<BlockInfo>>;

    /// `LogMessagePublished` logs of the core contract in a block, in log
    /// index order
    async fn published_messages(&self, block_hash: H256) -> ChainResult<Vec<LoggedMessage>>;

    /// `LogMessagePublished` logs of the core contract in blocks `[from, to]`,
    /// ordered by block then log index
    async fn published_messages_in_range(
        &self,
        from: u64,
        to: u64,
    ) -> ChainResult<Vec<LoggedMessage>>;

    /// `LogMessagePublished` logs emitted by a single transaction
    async fn published_messages_in_tx(&self, tx_hash: H256) -> ChainResult<Vec<LoggedMessage>>;

    /// Sender of a transaction, `None` if the transaction is unknown
    async fn transaction_sender(&self, tx_hash: H256) -> ChainResult<Option<H160>>;

    /// Receipt of a transaction, `None` if it is not (or no longer) mined
    async fn transaction_receipt(&self, tx_hash: H256) -> ChainResult<Option<TxReceiptInfo>>;
}

/// A chain whose bridge contract events carry a native ordinal.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait ContractEventsProvider: Send + Sync + Debug {
    /// `GetContractEventsCount` of the bridge contract
    async fn events_count(&self) -> ChainResult<u64>;

    /// Message events with ordinals in `[start, start + limit)`, ascending
    async fn events(&self, start: u64, limit: u64) -> ChainResult<Vec<ContractEvent>>;

    /// Message events emitted by one transaction
    async fn events_by_tx(&self, tx_id: &str) -> ChainResult<Vec<ContractEvent>>;

    /// Header of a block
    async fn block_header(&self, block_hash: &str) -> ChainResult<Option<ChainBlockHeader>>;

    /// Header of the current tip of the contract's chain
    async fn tip_header(&self) -> ChainResult<ChainBlockHeader>;

    /// `IsBlockInMainChain`
    async fn is_block_in_main_chain(&self, block_hash: &str) -> ChainResult<bool>;

    /// Address that signed a transaction, in native form
    async fn transaction_sender(&self, tx_id: &str) -> ChainResult<Option<String>>;
}
