use std::sync::Arc;
use std::time::Duration;

use eyre::{eyre, Result};
use prometheus::IntCounterVec;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use explorer_base::db::ExplorerDB;
use explorer_core::{Emitter, GuardianRpc, Vaa, VaaBatchEntry, MAX_VAA_BATCH_SIZE};

use crate::error::FetchError;
use crate::fanout::Persistence;
use crate::verifier::VaaVerifier;

/// Backfills sequences recorded as missing by asking a peer guardian for
/// them.
#[derive(Debug, Clone)]
pub struct MissingVaaFetcher {
    db: ExplorerDB,
    rpc: Arc<dyn GuardianRpc>,
    verifier: VaaVerifier,
    persistence: Persistence,
    emitters: Vec<Emitter>,
    batch_size: usize,
    fetched: IntCounterVec,
}

impl MissingVaaFetcher {
    /// Create a fetcher for `emitters`
    pub fn new(
        db: ExplorerDB,
        rpc: Arc<dyn GuardianRpc>,
        verifier: VaaVerifier,
        persistence: Persistence,
        emitters: Vec<Emitter>,
        batch_size: usize,
        fetched: IntCounterVec,
    ) -> Self {
        Self {
            db,
            rpc,
            verifier,
            persistence,
            emitters,
            batch_size: batch_size.clamp(1, MAX_VAA_BATCH_SIZE),
            fetched,
        }
    }

    /// Run a round every `period` until cancelled
    pub async fn run(self, period: Duration) -> Result<()> {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let filled = self
                .run_round()
                .instrument(info_span!("MissingVaaRound"))
                .await;
            if filled > 0 {
                info!(filled, "Backfilled missing VAAs");
            }
        }
    }

    /// One pass over every emitter. Failures leave the sequences missing
    /// for the next round.
    pub async fn run_round(&self) -> usize {
        let mut filled = 0;
        for emitter in &self.emitters {
            match self.fetch_emitter(emitter).await {
                Ok(count) => filled += count,
                Err(err) => warn!(%emitter, error = %err, "Missing VAA fetch failed"),
            }
        }
        filled
    }

    /// Resolve up to one batch of the oldest missing sequences of
    /// `emitter`. Returns how many were removed from the missing set.
    #[instrument(skip(self), fields(%emitter))]
    pub async fn fetch_emitter(&self, emitter: &Emitter) -> Result<usize, FetchError> {
        let missing = self.db.find_oldest_missing(emitter, self.batch_size)?;
        if missing.is_empty() {
            return Ok(0);
        }

        // stored by a concurrent upsert since the gap was recorded
        let mut resolved = vec![];
        let mut absent = vec![];
        for sequence in missing {
            if self.db.contains_vaa(&emitter.vaa_id(sequence))? {
                resolved.push(sequence);
            } else {
                absent.push(sequence);
            }
        }

        let governance = self.db.is_governance(emitter.chain, &emitter.address);
        for chunk in absent.chunks(MAX_VAA_BATCH_SIZE) {
            let entries = if governance {
                self.rpc.governance_vaa_batch(chunk).await?
            } else {
                self.rpc.non_governance_vaa_batch(emitter, chunk).await?
            };
            if entries.len() < chunk.len() {
                debug!(
                    requested = chunk.len(),
                    returned = entries.len(),
                    "Peer returned a partial batch"
                );
            }
            for entry in entries {
                let sequence = entry.sequence;
                match self.admit(emitter, entry) {
                    Ok((vaa, bytes)) => {
                        self.persistence.persist(&vaa, &bytes).await?;
                        resolved.push(sequence);
                    }
                    Err(err) => warn!(sequence, error = %err, "Rejected VAA returned by peer"),
                }
            }
        }

        self.db.remove_missing(emitter, &resolved)?;
        self.fetched
            .with_label_values(&[&emitter.chain.to_string()])
            .inc_by(resolved.len() as u64);
        Ok(resolved.len())
    }

    /// Peers are not trusted: returned messages are verified like gossip
    /// and must be the sequence asked for.
    fn admit(&self, emitter: &Emitter, entry: VaaBatchEntry) -> Result<(Vaa, Vec<u8>)> {
        let vaa = Vaa::parse(&entry.vaa_bytes)?;
        self.verifier.verify(&vaa)?;
        let expected = self.db.canonical_emitter(*emitter);
        if self.db.canonical_emitter(vaa.id().emitter()) != expected
            || vaa.sequence != entry.sequence
        {
            return Err(eyre!("Peer returned {} for sequence {}", vaa.id(), entry.sequence));
        }
        Ok((vaa, entry.vaa_bytes))
    }
}

#[cfg(test)]
mod test {
    use explorer_base::{CoreMetrics, NoopNotifier};
    use explorer_core::{ChainCommunicationError, Network, H256};
    use explorer_test::fixtures::{guardian_keys, guardian_set, VaaBuilder};
    use explorer_test::mocks::{MockGuardianRpc, MockGuardianSetSource};
    use explorer_test::test_utils::run_test_db;
    use k256::ecdsa::SigningKey;
    use prometheus::Registry;
    use tokio::sync::mpsc;

    use super::*;
    use crate::guardian_sets::GuardianSetTracker;

    fn emitter() -> Emitter {
        Emitter {
            chain: 2,
            address: H256::repeat_byte(7),
            target_chain: 255,
        }
    }

    fn entry(keys: &[SigningKey], emitter: &Emitter, sequence: u64) -> VaaBatchEntry {
        VaaBatchEntry {
            sequence,
            vaa_bytes: VaaBuilder::new(
                emitter.chain,
                emitter.address,
                emitter.target_chain,
                sequence,
            )
            .bytes(keys),
        }
    }

    async fn fetcher(
        db: &ExplorerDB,
        keys: &[SigningKey],
        rpc: MockGuardianRpc,
        emitters: Vec<Emitter>,
    ) -> MissingVaaFetcher {
        let set = guardian_set(0, keys);
        let mut source = MockGuardianSetSource::new();
        source
            .expect__current_guardian_set_index()
            .returning(|| Ok(0));
        source
            .expect__guardian_set()
            .returning(move |_| Ok(Some(set.clone())));
        let metrics = CoreMetrics::new("test", Registry::new()).unwrap();
        let tracker = GuardianSetTracker::load(
            db.clone(),
            Network::Mainnet,
            Some(Arc::new(source)),
            metrics.guardian_set_index(),
        )
        .await
        .unwrap();
        let (decoded, _) = mpsc::channel(64);
        let persistence = Persistence::new(
            db.clone(),
            Arc::new(NoopNotifier),
            decoded,
            metrics.vaas_persisted(),
        );
        MissingVaaFetcher::new(
            db.clone(),
            Arc::new(rpc),
            VaaVerifier::new(Arc::new(tracker)),
            persistence,
            emitters,
            20,
            metrics.missing_vaas_fetched(),
        )
    }

    #[tokio::test]
    async fn fetched_sequences_leave_the_missing_set() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Mainnet, db);
            let keys = guardian_keys(4);
            for sequence in [0, 4] {
                let builder = VaaBuilder::new(2, emitter().address, 255, sequence);
                db.upsert_vaa(&builder.signed_by(&keys), &builder.bytes(&keys))
                    .unwrap();
            }
            assert_eq!(db.find_oldest_missing(&emitter(), 20).unwrap(), vec![1, 2, 3]);

            let peer_keys = keys.clone();
            let mut rpc = MockGuardianRpc::new();
            rpc.expect__non_governance_vaa_batch()
                .times(1)
                .returning(move |emitter, sequences| {
                    assert_eq!(sequences, &[1, 2, 3]);
                    // sparse: 2 is unknown to the peer
                    Ok(vec![entry(&peer_keys, emitter, 1), entry(&peer_keys, emitter, 3)])
                });
            let fetcher = fetcher(&db, &keys, rpc, vec![emitter()]).await;

            assert_eq!(fetcher.fetch_emitter(&emitter()).await.unwrap(), 2);
            assert_eq!(db.find_oldest_missing(&emitter(), 20).unwrap(), vec![2]);
            assert_eq!(db.stored_sequences(&emitter()).unwrap(), vec![0, 1, 3, 4]);
        })
        .await
    }

    #[tokio::test]
    async fn sequences_stored_concurrently_skip_the_peer() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Mainnet, db);
            let keys = guardian_keys(4);
            for sequence in [0, 2] {
                let builder = VaaBuilder::new(2, emitter().address, 255, sequence);
                db.upsert_vaa(&builder.signed_by(&keys), &builder.bytes(&keys))
                    .unwrap();
            }
            let mut rpc = MockGuardianRpc::new();
            rpc.expect__non_governance_vaa_batch().times(0);
            let fetcher = fetcher(&db, &keys, rpc, vec![emitter()]).await;

            let builder = VaaBuilder::new(2, emitter().address, 255, 1);
            db.upsert_vaa(&builder.signed_by(&keys), &builder.bytes(&keys))
                .unwrap();
            assert_eq!(fetcher.fetch_emitter(&emitter()).await.unwrap(), 0);
            assert!(db.find_oldest_missing(&emitter(), 20).unwrap().is_empty());
        })
        .await
    }

    #[tokio::test]
    async fn unverifiable_or_unreachable_peers_leave_gaps_for_the_next_round() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Mainnet, db);
            let keys = guardian_keys(4);
            for sequence in [0, 2] {
                let builder = VaaBuilder::new(2, emitter().address, 255, sequence);
                db.upsert_vaa(&builder.signed_by(&keys), &builder.bytes(&keys))
                    .unwrap();
            }

            let impostors = guardian_keys(5)[1..].to_vec();
            let mut rpc = MockGuardianRpc::new();
            let mut calls = 0;
            rpc.expect__non_governance_vaa_batch()
                .times(2)
                .returning(move |emitter, _| {
                    calls += 1;
                    if calls == 1 {
                        Err(ChainCommunicationError::from_other_str("connection refused"))
                    } else {
                        Ok(vec![entry(&impostors, emitter, 1)])
                    }
                });
            let fetcher = fetcher(&db, &keys, rpc, vec![emitter()]).await;

            assert!(matches!(
                fetcher.fetch_emitter(&emitter()).await,
                Err(FetchError::PeerRpcUnavailable(_))
            ));
            assert_eq!(fetcher.run_round().await, 0);
            assert_eq!(db.find_oldest_missing(&emitter(), 20).unwrap(), vec![1]);
        })
        .await
    }

    #[tokio::test]
    async fn governance_gaps_use_the_governance_batch() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Mainnet, db);
            let keys = guardian_keys(4);
            let (chain, address) = Network::Mainnet.governance_emitter();
            let governance = Emitter {
                chain,
                address,
                target_chain: 0,
            };
            // target chains vary across governance messages
            for (sequence, target) in [(0, 0), (2, 2)] {
                let builder = VaaBuilder::new(chain, address, target, sequence);
                db.upsert_vaa(&builder.signed_by(&keys), &builder.bytes(&keys))
                    .unwrap();
            }

            let peer_keys = keys.clone();
            let mut rpc = MockGuardianRpc::new();
            rpc.expect__governance_vaa_batch()
                .times(1)
                .returning(move |sequences| {
                    assert_eq!(sequences, &[1]);
                    let emitter = Emitter {
                        target_chain: 4,
                        ..governance
                    };
                    Ok(vec![entry(&peer_keys, &emitter, 1)])
                });
            let fetcher = fetcher(&db, &keys, rpc, vec![governance]).await;

            assert_eq!(fetcher.run_round().await, 1);
            assert!(db.find_oldest_missing(&governance, 20).unwrap().is_empty());
        })
        .await
    }
}
