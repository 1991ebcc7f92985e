use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, info_span, instrument::Instrumented, warn, Instrument};

use explorer_base::{
    db::ExplorerDB, impl_as_ref_core, run_all, supervise, BaseAgent, ChainConf, ChainProtocol,
    CoreMetrics, ExplorerAgentCore, DEFAULT_RESTART_BACKOFF,
};
use explorer_core::{BlockTransactions, ContractEventsProvider, EvmProvider};

use crate::recorder::{resume_index, run_recorder};
use crate::settings::TrackerSettings;
use crate::watcher::{ContractEventsWatcher, EvmWatcher, ReobservationRequest, WatcherMetrics};

/// Capacity of the channel between the watchers and the recorder
const CONFIRMED_CAPACITY: usize = 1_000;

#[derive(Debug, Clone)]
enum ChainAccess {
    Evm(Arc<dyn EvmProvider>),
    ContractEvents(Arc<dyn ContractEventsProvider>),
}

/// A watched chain with its connection and reobservation queue
#[derive(Debug)]
struct WatchedChain {
    name: String,
    conf: ChainConf,
    access: ChainAccess,
    reobservations: Arc<Mutex<mpsc::Receiver<ReobservationRequest>>>,
}

/// Watches the bridge contracts and records the confirmed source
/// transactions of their messages
#[derive(Debug)]
pub struct Tracker {
    core: ExplorerAgentCore,
    chains: Vec<WatchedChain>,
    confirmed_sender: mpsc::Sender<BlockTransactions>,
    confirmed: Arc<Mutex<mpsc::Receiver<BlockTransactions>>>,
    max_wait_confirmations: u64,
    confirmation_safety: u64,
    event_batch_size: u64,
}

impl_as_ref_core!(Tracker);

impl Tracker {
    async fn connect(conf: &ChainConf, timeout: Duration) -> Result<ChainAccess> {
        Ok(match conf.protocol {
            ChainProtocol::Evm => ChainAccess::Evm(conf.build_evm_provider(timeout).await?),
            ChainProtocol::Alephium => {
                ChainAccess::ContractEvents(conf.build_contract_events_provider(timeout)?)
            }
        })
    }

    fn run_watcher(&self, chain: &WatchedChain) -> Instrumented<JoinHandle<Result<()>>> {
        let metrics = WatcherMetrics::new(&chain.name, &self.core.metrics);
        let confirmed = self.confirmed_sender.clone();
        let reobservations = chain.reobservations.clone();
        let conf = chain.conf.clone();
        let span = info_span!("watcher", chain = %chain.name);

        match chain.access.clone() {
            ChainAccess::Evm(provider) => {
                let db = self.core.db.clone();
                let max_wait = self.max_wait_confirmations;
                // messages still pending at shutdown sit at most this deep
                let rewind = self.confirmation_safety.max(conf.min_confirmations + max_wait);
                supervise("evm_watcher", DEFAULT_RESTART_BACKOFF, move || {
                    let db = db.clone();
                    let provider = provider.clone();
                    let conf = conf.clone();
                    let confirmed = confirmed.clone();
                    let metrics = metrics.clone();
                    let reobservations = reobservations.clone();
                    async move {
                        let mut watcher = EvmWatcher::new(
                            conf.chain_id,
                            provider,
                            conf.min_confirmations,
                            max_wait,
                            confirmed,
                            metrics,
                        );
                        // the event index of an EVM transaction is its block height
                        let height =
                            resume_index(&db, conf.chain_id, rewind, conf.start_event_index)?;
                        if height > 0 {
                            watcher = watcher.resume_from(height);
                        }
                        watcher.run(reobservations).await
                    }
                    .instrument(span.clone())
                })
            }
            ChainAccess::ContractEvents(provider) => {
                let db = self.core.db.clone();
                let safety = self.confirmation_safety;
                let batch_size = self.event_batch_size;
                supervise("contract_events_watcher", DEFAULT_RESTART_BACKOFF, move || {
                    let db = db.clone();
                    let provider = provider.clone();
                    let conf = conf.clone();
                    let confirmed = confirmed.clone();
                    let metrics = metrics.clone();
                    let reobservations = reobservations.clone();
                    async move {
                        let next_index =
                            resume_index(&db, conf.chain_id, safety, conf.start_event_index)?;
                        let watcher = ContractEventsWatcher::new(
                            conf.chain_id,
                            provider,
                            next_index,
                            batch_size,
                            conf.min_confirmations,
                            conf.block_time(),
                            confirmed,
                            metrics,
                        );
                        watcher.run(conf.poll_interval(), reobservations).await
                    }
                    .instrument(span.clone())
                })
            }
        }
    }

    fn run_recorder(&self) -> Instrumented<JoinHandle<Result<()>>> {
        let db: ExplorerDB = self.core.db.clone();
        let confirmed = self.confirmed.clone();
        supervise("recorder", DEFAULT_RESTART_BACKOFF, move || {
            run_recorder(db.clone(), confirmed.clone())
        })
    }
}

#[async_trait]
impl BaseAgent for Tracker {
    const AGENT_NAME: &'static str = "tracker";

    type Settings = TrackerSettings;

    async fn from_settings(settings: Self::Settings, metrics: Arc<CoreMetrics>) -> Result<Self>
    where
        Self: Sized,
    {
        let core = ExplorerAgentCore::from_settings(&settings, metrics)?;

        let mut requests: HashMap<u16, Vec<ReobservationRequest>> = HashMap::new();
        for conf in &settings.reobserve {
            requests
                .entry(conf.chain_id)
                .or_default()
                .push(ReobservationRequest {
                    chain_id: conf.chain_id,
                    tx_hash: conf.tx_hash.clone(),
                });
        }

        let mut chains = vec![];
        for (name, conf) in settings.chain_confs() {
            if !settings.chains_to_watch.is_empty() && !settings.chains_to_watch.contains(&name) {
                continue;
            }
            let access = Self::connect(&conf, settings.rpc_timeout())
                .await
                .wrap_err_with(|| format!("Failed to connect to chain `{name}`"))?;

            let pending = requests.remove(&conf.chain_id).unwrap_or_default();
            let (sender, receiver) = mpsc::channel(pending.len().max(1));
            for request in pending {
                info!(chain = %name, tx = %request.tx_hash, "Queued reobservation");
                sender
                    .try_send(request)
                    .wrap_err("Failed to queue reobservation")?;
            }

            chains.push(WatchedChain {
                name,
                conf,
                access,
                reobservations: Arc::new(Mutex::new(receiver)),
            });
        }
        for (chain_id, dropped) in requests {
            warn!(chain_id, requests = dropped.len(), "Reobservations for an unwatched chain");
        }
        if chains.is_empty() {
            warn!("No chains to watch");
        }

        let (confirmed_sender, confirmed) = mpsc::channel(CONFIRMED_CAPACITY);
        Ok(Self {
            core,
            chains,
            confirmed_sender,
            confirmed: Arc::new(Mutex::new(confirmed)),
            max_wait_confirmations: settings.max_wait_confirmations,
            confirmation_safety: settings.confirmation_safety,
            event_batch_size: settings.event_batch_size,
        })
    }

    #[allow(clippy::async_yields_async)]
    async fn run(&self) -> Instrumented<JoinHandle<Result<()>>> {
        let mut tasks = vec![self.run_recorder()];
        for chain in &self.chains {
            tasks.push(self.run_watcher(chain));
        }
        info!(chains = self.chains.len(), "Starting tracker");
        run_all(tasks)
    }
}
