use rocksdb::WriteBatch;
use tracing::{debug, instrument};

use explorer_core::{BlockTransactions, BridgeTransaction, Encode, VaaId};

use super::{ExplorerDB, Result};

const TRANSACTION: &str = "transaction_";
const TX_BY_SENDER: &str = "tx_by_sender_";
const LATEST_EVENT_INDEX: &str = "latest_event_index_";

impl ExplorerDB {
    /// Upsert the confirmed transactions of a block in one write and advance
    /// the chain's event index cursor. Re-recording a transaction overwrites
    /// it, so replays after a restart are harmless.
    #[instrument(
        skip_all,
        fields(chain = block.chain, block = %block.block_hash, txs = block.transactions.len()),
        err
    )]
    pub fn upsert_transactions(&self, block: &BlockTransactions) -> Result<()> {
        if block.transactions.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        for tx in &block.transactions {
            let id = tx.vaa_id.to_vec();
            self.batch_encodable(&mut batch, TRANSACTION, &id, tx);
            self.batch_encodable(
                &mut batch,
                TX_BY_SENDER,
                Self::sender_key(&tx.sender_address, &tx.vaa_id),
                &tx.vaa_id,
            );
        }

        let highest = block
            .transactions
            .iter()
            .map(|tx| tx.event_index)
            .max()
            .unwrap_or_default();
        if self
            .latest_event_index(block.chain)?
            .map_or(true, |current| highest > current)
        {
            self.batch_encodable(
                &mut batch,
                LATEST_EVENT_INDEX,
                block.chain.to_vec(),
                &highest,
            );
        }
        self.write(batch)?;
        debug!(highest, "Recorded block transactions");
        Ok(())
    }

    fn sender_key(sender: &str, id: &VaaId) -> Vec<u8> {
        let mut key = sender.to_owned().to_vec();
        key.extend(id.emitter_chain.to_vec());
        key.extend(id.target_chain.to_vec());
        key.extend(id.to_vec());
        key
    }

    /// The transaction that published a message
    pub fn retrieve_transaction(&self, id: &VaaId) -> Result<Option<BridgeTransaction>> {
        self.retrieve_keyed_decodable(TRANSACTION, id)
    }

    /// Transactions sent by `sender`, optionally restricted to one
    /// `(emitterChain, targetChain)` route
    pub fn transactions_by_address(
        &self,
        sender: &str,
        route: Option<(u16, u16)>,
    ) -> Result<Vec<BridgeTransaction>> {
        let mut prefix = sender.to_owned().to_vec();
        if let Some((emitter_chain, target_chain)) = route {
            prefix.extend(emitter_chain.to_vec());
            prefix.extend(target_chain.to_vec());
        }
        self.prefix_entries::<VaaId>(TX_BY_SENDER, prefix)?
            .into_iter()
            .filter_map(|(_, id)| self.retrieve_transaction(&id).transpose())
            .collect()
    }

    /// Highest event index recorded for a chain
    pub fn latest_event_index(&self, chain: u16) -> Result<Option<u64>> {
        self.retrieve_keyed_decodable(LATEST_EVENT_INDEX, &chain)
    }
}

#[cfg(test)]
mod test {
    use explorer_core::{Emitter, Network, H256};

    use super::*;
    use crate::db::test_utils::run_test_db;

    fn tx(sequence: u64, sender: &str, target_chain: u16, event_index: u64) -> BridgeTransaction {
        let emitter = Emitter {
            chain: 255,
            address: H256::repeat_byte(3),
            target_chain,
        };
        BridgeTransaction {
            vaa_id: emitter.vaa_id(sequence),
            tx_id: format!("tx{sequence}"),
            sender_address: sender.to_owned(),
            block_hash: "b1".into(),
            block_number: 10,
            block_timestamp: 1_000,
            event_index,
        }
    }

    fn block(transactions: Vec<BridgeTransaction>) -> BlockTransactions {
        BlockTransactions {
            chain: 255,
            block_hash: "b1".into(),
            block_number: 10,
            block_timestamp: 1_000,
            transactions,
        }
    }

    #[tokio::test]
    async fn records_transactions_and_tracks_cursor() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Devnet, db);
            assert_eq!(db.latest_event_index(255).unwrap(), None);

            db.upsert_transactions(&block(vec![tx(0, "alice", 2, 4), tx(1, "bob", 2, 5)]))
                .unwrap();
            assert_eq!(db.latest_event_index(255).unwrap(), Some(5));

            // replaying older events leaves the cursor where it is
            db.upsert_transactions(&block(vec![tx(0, "alice", 2, 4)]))
                .unwrap();
            assert_eq!(db.latest_event_index(255).unwrap(), Some(5));

            let stored = db.retrieve_transaction(&tx(1, "bob", 2, 5).vaa_id).unwrap();
            assert_eq!(stored, Some(tx(1, "bob", 2, 5)));
        })
        .await;
    }

    #[tokio::test]
    async fn looks_up_transactions_by_sender_and_route() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Devnet, db);
            db.upsert_transactions(&block(vec![
                tx(0, "alice", 2, 1),
                tx(1, "alice", 4, 2),
                tx(2, "alicia", 2, 3),
            ]))
            .unwrap();

            assert_eq!(db.transactions_by_address("alice", None).unwrap().len(), 2);
            let to_bsc = db.transactions_by_address("alice", Some((255, 4))).unwrap();
            assert_eq!(to_bsc, vec![tx(1, "alice", 4, 2)]);
            assert!(db.transactions_by_address("carol", None).unwrap().is_empty());
        })
        .await;
    }
}
