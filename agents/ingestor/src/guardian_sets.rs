use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use eyre::{eyre, Result};
use parking_lot::RwLock;
use prometheus::IntGaugeVec;
use tokio::sync::{broadcast, Notify};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use explorer_base::db::ExplorerDB;
use explorer_core::{ChainCommunicationError, GuardianSet, GuardianSetSource, Network};

/// A guardian set index that is not known yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Guardian set index {0} not yet known")]
pub struct NotFound(pub u32);

/// The ordered history of guardian sets.
///
/// Sets are appended in index order only; a set is never appended before all
/// lower indices are known.
#[derive(Debug)]
pub struct GuardianSetTracker {
    db: ExplorerDB,
    source: Option<Arc<dyn GuardianSetSource>>,
    history: RwLock<BTreeMap<u32, GuardianSet>>,
    appended: broadcast::Sender<GuardianSet>,
    poll_now: Notify,
    index_gauge: IntGaugeVec,
}

impl GuardianSetTracker {
    /// Load the persisted history, seeding it from the network preset or the
    /// source when nothing is persisted yet.
    pub async fn load(
        db: ExplorerDB,
        network: Network,
        source: Option<Arc<dyn GuardianSetSource>>,
        index_gauge: IntGaugeVec,
    ) -> Result<Self> {
        let mut sets = db.guardian_sets()?;
        if sets.is_empty() {
            let seed = match (network.initial_guardian_set(), &source) {
                (Some(set), _) => set,
                (None, Some(source)) => {
                    let index = source.current_guardian_set_index().await?;
                    source
                        .guardian_set(index)
                        .await?
                        .ok_or_else(|| eyre!("Current guardian set {index} not found"))?
                }
                (None, None) => return Err(eyre!("No guardian set known for {network}")),
            };
            db.store_guardian_set(&seed)?;
            sets.push(seed);
        }

        let history: BTreeMap<u32, GuardianSet> =
            sets.into_iter().map(|set| (set.index, set)).collect();
        if let Some(current) = history.keys().next_back() {
            index_gauge.with_label_values(&[]).set(*current as i64);
        }
        let (appended, _) = broadcast::channel(16);
        Ok(Self {
            db,
            source,
            history: RwLock::new(history),
            appended,
            poll_now: Notify::new(),
            index_gauge,
        })
    }

    /// The guardian set with index `index`
    pub fn get_by_index(&self, index: u32) -> Result<GuardianSet, NotFound> {
        self.history.read().get(&index).cloned().ok_or(NotFound(index))
    }

    /// The set with the highest index
    pub fn current(&self) -> GuardianSet {
        self.history
            .read()
            .values()
            .next_back()
            .cloned()
            .unwrap_or_else(|| GuardianSet::new(0, vec![]))
    }

    /// Receive every set appended from now on
    pub fn subscribe(&self) -> broadcast::Receiver<GuardianSet> {
        self.appended.subscribe()
    }

    /// Ask the poll loop to run now rather than on its next tick
    pub fn request_poll(&self) {
        self.poll_now.notify_one();
    }

    fn append(&self, set: GuardianSet) -> Result<()> {
        let mut history = self.history.write();
        let current = history.keys().next_back().copied();
        if current.is_some_and(|current| set.index != current + 1) {
            return Err(eyre!(
                "Refusing to append guardian set {} after {:?}",
                set.index,
                current
            ));
        }
        self.db.store_guardian_set(&set)?;
        info!(index = set.index, guardians = set.keys.len(), "Appended guardian set");
        self.index_gauge.with_label_values(&[]).set(set.index as i64);
        history.insert(set.index, set.clone());
        // nobody listening is fine
        let _ = self.appended.send(set);
        Ok(())
    }

    /// Reconcile with the source, appending every set between the current
    /// one and the source's current index. Returns the number of appended
    /// sets.
    #[instrument(skip(self), err)]
    pub async fn poll(&self) -> Result<usize> {
        let Some(source) = &self.source else {
            return Ok(0);
        };
        let latest = source.current_guardian_set_index().await?;
        let current = self.current().index;
        if latest <= current {
            debug!(current, latest, "Guardian set up to date");
            return Ok(0);
        }

        let mut appended = 0;
        for index in current + 1..=latest {
            let set = source.guardian_set(index).await?.ok_or_else(|| {
                ChainCommunicationError::CustomError(format!(
                    "Guardian set {index} missing at source"
                ))
            })?;
            if set.index != index {
                return Err(eyre!("Source returned set {} for index {index}", set.index));
            }
            self.append(set)?;
            appended += 1;
        }
        Ok(appended)
    }

    /// Poll every `period` or when requested. Errors are logged and the poll
    /// is retried on the next tick.
    pub async fn run(self: Arc<Self>, period: Duration) -> Result<()> {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.poll_now.notified() => {}
            }
            if let Err(err) = self.poll().await {
                warn!(error = %err, "Failed to poll guardian sets");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use explorer_base::db::DB;
    use explorer_base::CoreMetrics;
    use explorer_test::fixtures::{guardian_keys, guardian_set};
    use explorer_test::mocks::MockGuardianSetSource;
    use explorer_test::test_utils::run_test_db;
    use prometheus::Registry;

    use super::*;

    fn gauge() -> IntGaugeVec {
        CoreMetrics::new("test", Registry::new())
            .unwrap()
            .guardian_set_index()
    }

    fn explorer_db(db: DB) -> ExplorerDB {
        ExplorerDB::new(Network::Mainnet, db)
    }

    #[tokio::test]
    async fn backfills_every_skipped_index_in_order() {
        run_test_db(|db| async move {
            let keys = guardian_keys(3);
            let mut source = MockGuardianSetSource::new();
            let mut indices = vec![0u32, 3u32].into_iter();
            source
                .expect__current_guardian_set_index()
                .times(2)
                .returning(move || Ok(indices.next().unwrap()));
            let fetch_keys = keys.clone();
            source
                .expect__guardian_set()
                .returning(move |index| Ok(Some(guardian_set(index, &fetch_keys))));

            let tracker = GuardianSetTracker::load(
                explorer_db(db.clone()),
                Network::Mainnet,
                Some(Arc::new(source)),
                gauge(),
            )
            .await
            .unwrap();
            let mut appended = tracker.subscribe();
            assert_eq!(tracker.current().index, 0);

            assert_eq!(tracker.poll().await.unwrap(), 3);
            assert_eq!(tracker.current().index, 3);
            for index in 1..=3 {
                assert_eq!(tracker.get_by_index(index).unwrap().index, index);
                assert_eq!(appended.recv().await.unwrap().index, index);
            }
            assert_eq!(tracker.get_by_index(4), Err(NotFound(4)));
            assert_eq!(explorer_db(db).guardian_sets().unwrap().len(), 4);
        })
        .await
    }

    #[tokio::test]
    async fn keeps_serving_when_a_set_is_missing_at_source() {
        run_test_db(|db| async move {
            let keys = guardian_keys(1);
            let mut source = MockGuardianSetSource::new();
            source
                .expect__current_guardian_set_index()
                .returning(|| Ok(2));
            let fetch_keys = keys.clone();
            source.expect__guardian_set().returning(move |index| {
                Ok((index != 1).then(|| guardian_set(index, &fetch_keys)))
            });

            let tracker = GuardianSetTracker::load(
                explorer_db(db),
                Network::Devnet,
                Some(Arc::new(source)),
                gauge(),
            )
            .await
            .unwrap();
            assert!(tracker.poll().await.is_err());
            assert_eq!(tracker.current().index, 0);
            assert_eq!(tracker.get_by_index(2), Err(NotFound(2)));
        })
        .await
    }

    #[tokio::test]
    async fn devnet_starts_from_the_preset() {
        run_test_db(|db| async move {
            let tracker = GuardianSetTracker::load(explorer_db(db), Network::Devnet, None, gauge())
                .await
                .unwrap();
            assert_eq!(tracker.current(), Network::Devnet.initial_guardian_set().unwrap());
            assert_eq!(tracker.poll().await.unwrap(), 0);
        })
        .await
    }
}
