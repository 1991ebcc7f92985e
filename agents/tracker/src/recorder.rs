use std::sync::Arc;

use eyre::Result;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use explorer_base::db::{DbError, ExplorerDB};
use explorer_core::BlockTransactions;

/// The event index a contract-event watcher resumes from. A chain with
/// history is rewound by `safety` events so recent blocks are processed
/// again; re-recording is idempotent.
pub fn resume_index(
    db: &ExplorerDB,
    chain: u16,
    safety: u64,
    start: u64,
) -> Result<u64, DbError> {
    Ok(match db.latest_event_index(chain)? {
        Some(latest) => latest.saturating_sub(safety).max(1),
        None => start,
    })
}

/// Record confirmed blocks until every watcher has hung up
pub async fn run_recorder(
    db: ExplorerDB,
    confirmed: Arc<Mutex<mpsc::Receiver<BlockTransactions>>>,
) -> Result<()> {
    let mut confirmed = confirmed.lock().await;
    info!("Recording confirmed transactions");
    while let Some(block) = confirmed.recv().await {
        record(&db, &block)?;
    }
    warn!("All watchers stopped, recorder exiting");
    Ok(())
}

fn record(db: &ExplorerDB, block: &BlockTransactions) -> Result<(), DbError> {
    db.upsert_transactions(block)?;
    debug!(
        chain = block.chain,
        block = block.block_number,
        txs = block.transactions.len(),
        "Recorded block"
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use explorer_core::{BridgeTransaction, Emitter, Network, H256};
    use explorer_test::test_utils::run_test_db;

    use super::*;

    fn block(chain: u16, event_indices: &[u64]) -> BlockTransactions {
        let emitter = Emitter {
            chain,
            address: H256::repeat_byte(5),
            target_chain: 2,
        };
        BlockTransactions {
            chain,
            block_hash: "blk".into(),
            block_number: 42,
            block_timestamp: 1_000,
            transactions: event_indices
                .iter()
                .map(|&index| BridgeTransaction {
                    vaa_id: emitter.vaa_id(index),
                    tx_id: format!("tx{index}"),
                    sender_address: "sender".into(),
                    block_hash: "blk".into(),
                    block_number: 42,
                    block_timestamp: 1_000,
                    event_index: index,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn resume_rewinds_by_the_safety_margin() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Devnet, db);
            assert_eq!(resume_index(&db, 255, 100, 0).unwrap(), 0);
            assert_eq!(resume_index(&db, 255, 100, 17).unwrap(), 17);

            db.upsert_transactions(&block(255, &[30])).unwrap();
            assert_eq!(resume_index(&db, 255, 100, 17).unwrap(), 1);
            db.upsert_transactions(&block(255, &[250])).unwrap();
            assert_eq!(resume_index(&db, 255, 100, 0).unwrap(), 150);
        })
        .await;
    }

    #[tokio::test]
    async fn recorder_drains_until_watchers_hang_up() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Devnet, db);
            let (sender, receiver) = mpsc::channel(4);
            let receiver = Arc::new(Mutex::new(receiver));
            let recorder = tokio::spawn(run_recorder(db.clone(), receiver));

            // one block published in two parts
            sender.send(block(255, &[1, 2])).await.unwrap();
            sender.send(block(255, &[3])).await.unwrap();
            // replayed after a restart
            sender.send(block(255, &[2])).await.unwrap();
            drop(sender);
            recorder.await.unwrap().unwrap();

            assert_eq!(db.latest_event_index(255).unwrap(), Some(3));
            for index in [1, 2, 3] {
                let part = block(255, &[index]).transactions.remove(0);
                assert!(db.retrieve_transaction(&part.vaa_id).unwrap().is_some());
            }
            let replayed = block(255, &[2]).transactions.remove(0);
            assert_eq!(
                db.retrieve_transaction(&replayed.vaa_id).unwrap(),
                Some(replayed)
            );
        })
        .await;
    }
}
