use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use eyre::{Result, WrapErr};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, instrument::Instrumented, warn};

use explorer_base::{
    impl_as_ref_core, run_all, supervise, BaseAgent, CoinGeckoPrices, CoreMetrics, Deduplicator,
    ExplorerAgentCore, NoPrices, SpyClient, DEFAULT_RESTART_BACKOFF,
};
use explorer_core::{GuardianSetSource, PriceSource, Vaa};

use crate::decoder::PayloadDecoder;
use crate::fanout::{drain_spy, run_persister, Ingress, Persistence, VerifiedVaa};
use crate::fetcher::MissingVaaFetcher;
use crate::guardian_sets::GuardianSetTracker;
use crate::settings::IngestorSettings;
use crate::stats::{run_projection, run_statistics, StatsAggregator, StatsProjection};
use crate::verifier::VaaVerifier;

/// Admits gossip into the store, backfills gaps and maintains statistics
#[derive(Debug)]
pub struct Ingestor {
    core: ExplorerAgentCore,
    tracker: Arc<GuardianSetTracker>,
    ingress: Ingress,
    persistence: Persistence,
    queue: Arc<Mutex<mpsc::Receiver<VerifiedVaa>>>,
    decoded: Arc<Mutex<mpsc::Receiver<Vaa>>>,
    decoder: PayloadDecoder,
    fetcher: Option<MissingVaaFetcher>,
    projection: Arc<StatsProjection>,
    spy_grpc_url: Option<String>,
    queue_capacity: usize,
    guardian_set_interval: Duration,
    fetch_interval: Duration,
    stats_interval: Duration,
}

impl_as_ref_core!(Ingestor);

impl Ingestor {
    async fn guardian_set_source(
        settings: &IngestorSettings,
    ) -> Result<Option<Arc<dyn GuardianSetSource>>> {
        let Some(contract) = &settings.guardian_set_contract else {
            return Ok(None);
        };
        let mut conf = settings.chain_conf(&contract.chain)?;
        if let Some(address) = &contract.address {
            conf.contract_address = address.clone();
        }
        let source = conf
            .build_guardian_set_source(settings.rpc_timeout())
            .await
            .wrap_err("Failed to build guardian set source")?;
        Ok(Some(source))
    }

    fn prices(settings: &IngestorSettings) -> Result<Arc<dyn PriceSource>> {
        Ok(match &settings.coin_gecko_url {
            Some(url) => Arc::new(CoinGeckoPrices::new(url, settings.rpc_timeout())?),
            None => Arc::new(NoPrices),
        })
    }

    fn run_spy(&self, url: String) -> Instrumented<JoinHandle<Result<()>>> {
        let ingress = self.ingress.clone();
        let capacity = self.queue_capacity;
        supervise("spy", DEFAULT_RESTART_BACKOFF, move || {
            let ingress = ingress.clone();
            let url = url.clone();
            async move {
                let spy = SpyClient::connect(&url).await?;
                let (vaa_sink, vaas) = mpsc::channel(capacity);
                let (gossip_sink, gossip) = mpsc::channel(capacity);
                let forward = async move {
                    tokio::try_join!(
                        spy.forward_signed_vaas(vaa_sink),
                        spy.forward_gossip(gossip_sink)
                    )
                    .map(|_| ())
                };
                let (forwarded, ()) = tokio::join!(forward, drain_spy(ingress, vaas, gossip));
                forwarded
            }
        })
    }

    fn run_statistics(&self) -> Instrumented<JoinHandle<Result<()>>> {
        let db = self.core.db.clone();
        let invalid_amounts = self.core.metrics.invalid_amounts();
        let decoder = self.decoder.clone();
        let decoded = self.decoded.clone();
        let period = self.stats_interval;
        supervise("statistics", DEFAULT_RESTART_BACKOFF, move || {
            let db = db.clone();
            let invalid_amounts = invalid_amounts.clone();
            let decoder = decoder.clone();
            let decoded = decoded.clone();
            async move {
                let aggregator = StatsAggregator::load(db, Utc::now(), invalid_amounts)?;
                run_statistics(decoder, aggregator, decoded, period).await
            }
        })
    }
}

#[async_trait]
impl BaseAgent for Ingestor {
    const AGENT_NAME: &'static str = "ingestor";

    type Settings = IngestorSettings;

    async fn from_settings(settings: Self::Settings, metrics: Arc<CoreMetrics>) -> Result<Self>
    where
        Self: Sized,
    {
        let mut core = ExplorerAgentCore::from_settings(&settings, metrics.clone())?;
        let emitters = settings
            .emitters
            .iter()
            .map(|conf| Ok((conf.emitter()?, conf)))
            .collect::<Result<Vec<_>>>()?;
        core.db = core.db.clone().with_watermarks(
            emitters
                .iter()
                .map(|(emitter, conf)| (*emitter, conf.watermark))
                .collect(),
        );
        let db = core.db.clone();

        let source = Self::guardian_set_source(&settings).await?;
        if source.is_none() {
            warn!("No guardian set contract configured, guardian sets will not be updated");
        }
        let tracker = Arc::new(
            GuardianSetTracker::load(
                db.clone(),
                settings.network,
                source,
                metrics.guardian_set_index(),
            )
            .await
            .wrap_err("Failed to load guardian sets")?,
        );
        let verifier = VaaVerifier::new(tracker.clone());

        let (queue_sender, queue) = mpsc::channel(settings.queue_capacity.max(1));
        let ingress = Ingress::new(
            verifier.clone(),
            Deduplicator::new(settings.dedup_capacity),
            queue_sender,
            db.clone(),
            metrics.ingress_dropped(),
        );

        let (decoded_sender, decoded) = mpsc::channel(settings.queue_capacity.max(1));
        let persistence = Persistence::new(
            db.clone(),
            settings.notifier().await?,
            decoded_sender,
            metrics.vaas_persisted(),
        );

        let fetcher = match settings.guardian_rpc()? {
            Some(rpc) => Some(MissingVaaFetcher::new(
                db.clone(),
                Arc::new(rpc),
                verifier,
                persistence.clone(),
                emitters.iter().map(|(emitter, _)| *emitter).collect(),
                settings.batch_size(),
                metrics.missing_vaas_fetched(),
            )),
            None => {
                warn!("No guardian rpc configured, missing VAAs will not be fetched");
                None
            }
        };

        let kinds: HashMap<_, _> = emitters
            .iter()
            .map(|(emitter, conf)| ((emitter.chain, emitter.address), conf.kind))
            .collect();
        let decoder = PayloadDecoder::new(
            db.clone(),
            kinds,
            settings.listed_tokens()?,
            Self::prices(&settings)?,
            tracker.clone(),
        );

        let projection = Arc::new(
            StatsProjection::load(
                db,
                Utc::now().date_naive(),
                settings.cache_days,
                settings.enable_cache,
            )
            .wrap_err("Failed to load statistics projection")?,
        );

        Ok(Self {
            core,
            tracker,
            ingress,
            persistence,
            queue: Arc::new(Mutex::new(queue)),
            decoded: Arc::new(Mutex::new(decoded)),
            decoder,
            fetcher,
            projection,
            spy_grpc_url: settings.spy_grpc_url.clone(),
            queue_capacity: settings.queue_capacity.max(1),
            guardian_set_interval: Duration::from_secs(settings.fetch_guardian_set_interval),
            fetch_interval: Duration::from_secs(settings.fetch_missing_vaas_interval),
            stats_interval: Duration::from_secs(settings.stats_flush_interval),
        })
    }

    #[allow(clippy::async_yields_async)]
    async fn run(&self) -> Instrumented<JoinHandle<Result<()>>> {
        let mut tasks = vec![];

        let tracker = self.tracker.clone();
        let period = self.guardian_set_interval;
        tasks.push(supervise(
            "guardian_sets",
            DEFAULT_RESTART_BACKOFF,
            move || tracker.clone().run(period),
        ));

        let queue = self.queue.clone();
        let persistence = self.persistence.clone();
        tasks.push(supervise("persister", DEFAULT_RESTART_BACKOFF, move || {
            run_persister(queue.clone(), persistence.clone())
        }));

        if let Some(fetcher) = &self.fetcher {
            let fetcher = fetcher.clone();
            let period = self.fetch_interval;
            tasks.push(supervise(
                "missing_vaas",
                DEFAULT_RESTART_BACKOFF,
                move || fetcher.clone().run(period),
            ));
        }

        tasks.push(self.run_statistics());

        let projection = self.projection.clone();
        let period = self.stats_interval;
        tasks.push(supervise("projection", DEFAULT_RESTART_BACKOFF, move || {
            run_projection(projection.clone(), period)
        }));

        match &self.spy_grpc_url {
            Some(url) => tasks.push(self.run_spy(url.clone())),
            None => info!("No spy configured, gossip arrives through other transports only"),
        }

        info!(tasks = tasks.len(), "Starting ingestor");
        run_all(tasks)
    }
}
