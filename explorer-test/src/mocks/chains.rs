#![allow(non_snake_case)]
#![allow(missing_docs)]

use async_trait::async_trait;
use mockall::*;

use explorer_core::*;

mock! {
    pub EvmProvider {
        pub fn _subscribe_blocks(&self, from: Option<u64>) -> ChainResult<BlockSubscription> {}

        pub fn _block_number(&self) -> ChainResult<u64> {}

        pub fn _block_by_hash(&self, hash: H256) -> ChainResult<Option<BlockInfo>> {}

        pub fn _published_messages(&self, block_hash: H256) -> ChainResult<Vec<LoggedMessage>> {}

        pub fn _published_messages_in_range(
            &self,
            from: u64,
            to: u64,
        ) -> ChainResult<Vec<LoggedMessage>> {}

        pub fn _published_messages_in_tx(&self, tx_hash: H256) -> ChainResult<Vec<LoggedMessage>> {}

        pub fn _transaction_sender(&self, tx_hash: H256) -> ChainResult<Option<H160>> {}

        pub fn _transaction_receipt(&self, tx_hash: H256) -> ChainResult<Option<TxReceiptInfo>> {}
    }
}

impl std::fmt::Debug for MockEvmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockEvmProvider")
    }
}

#[async_trait]
impl EvmProvider for MockEvmProvider {
    async fn subscribe_blocks(&self, from: Option<u64>) -> ChainResult<BlockSubscription> {
        self._subscribe_blocks(from)
    }

    async fn block_number(&self) -> ChainResult<u64> {
        self._block_number()
    }

    async fn block_by_hash(&self, hash: H256) -> ChainResult<Option<BlockInfo>> {
        self._block_by_hash(hash)
    }

    async fn published_messages(&self, block_hash: H256) -> ChainResult<Vec<LoggedMessage>> {
        self._published_messages(block_hash)
    }

    async fn published_messages_in_range(
        &self,
        from: u64,
        to: u64,
    ) -> ChainResult<Vec<LoggedMessage>> {
        self._published_messages_in_range(from, to)
    }

    async fn published_messages_in_tx(&self, tx_hash: H256) -> ChainResult<Vec<LoggedMessage>> {
        self._published_messages_in_tx(tx_hash)
    }

    async fn transaction_sender(&self, tx_hash: H256) -> ChainResult<Option<H160>> {
        self._transaction_sender(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> ChainResult<Option<TxReceiptInfo>> {
        self._transaction_receipt(tx_hash)
    }
}

mock! {
    pub ContractEventsProvider {
        pub fn _events_count(&self) -> ChainResult<u64> {}

        pub fn _events(&self, start: u64, limit: u64) -> ChainResult<Vec<ContractEvent>> {}

        pub fn _events_by_tx(&self, tx_id: &str) -> ChainResult<Vec<ContractEvent>> {}

        pub fn _block_header(&self, block_hash: &str) -> ChainResult<Option<ChainBlockHeader>> {}

        pub fn _tip_header(&self) -> ChainResult<ChainBlockHeader> {}

        pub fn _is_block_in_main_chain(&self, block_hash: &str) -> ChainResult<bool> {}

        pub fn _transaction_sender(&self, tx_id: &str) -> ChainResult<Option<String>> {}
    }
}

impl std::fmt::Debug for MockContractEventsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockContractEventsProvider")
    }
}

#[async_trait]
impl ContractEventsProvider for MockContractEventsProvider {
    async fn events_count(&self) -> ChainResult<u64> {
        self._events_count()
    }

    async fn events(&self, start: u64, limit: u64) -> ChainResult<Vec<ContractEvent>> {
        self._events(start, limit)
    }

    async fn events_by_tx(&self, tx_id: &str) -> ChainResult<Vec<ContractEvent>> {
        self._events_by_tx(tx_id)
    }

    async fn block_header(&self, block_hash: &str) -> ChainResult<Option<ChainBlockHeader>> {
        self._block_header(block_hash)
    }

    async fn tip_header(&self) -> ChainResult<ChainBlockHeader> {
        self._tip_header()
    }

    async fn is_block_in_main_chain(&self, block_hash: &str) -> ChainResult<bool> {
        self._is_block_in_main_chain(block_hash)
    }

    async fn transaction_sender(&self, tx_id: &str) -> ChainResult<Option<String>> {
        self._transaction_sender(tx_id)
    }
}
