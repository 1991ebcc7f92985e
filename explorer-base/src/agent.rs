use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Report, Result};
use futures_util::future::select_all;
use tokio::task::JoinHandle;
use tracing::instrument::Instrumented;
use tracing::{error, info, info_span, warn, Instrument};

use crate::{
    cancel_task,
    db::ExplorerDB,
    metrics::CoreMetrics,
    settings::{LoadableFromSettings, Settings},
};

/// Backoff between restarts of a failed background task
pub const DEFAULT_RESTART_BACKOFF: Duration = Duration::from_secs(5);

/// Properties shared across all explorer agents
#[derive(Debug, Clone)]
pub struct ExplorerAgentCore {
    /// The network scoped store
    pub db: ExplorerDB,
    /// Prometheus metrics
    pub metrics: Arc<CoreMetrics>,
}

impl ExplorerAgentCore {
    /// Open the database and scope it to the configured network
    pub fn from_settings(settings: &Settings, metrics: Arc<CoreMetrics>) -> Result<Self> {
        let db = settings.explorer_db(settings.try_db()?);
        Ok(Self { db, metrics })
    }
}

/// A fundamental agent which does not make any assumptions about the tools
/// which are used.
#[async_trait]
pub trait BaseAgent: Send + Sync + Debug {
    /// The agent's name
    const AGENT_NAME: &'static str;

    /// The settings object for this agent
    type Settings: LoadableFromSettings;

    /// Instantiate the agent from the standard settings object
    async fn from_settings(settings: Self::Settings, metrics: Arc<CoreMetrics>) -> Result<Self>
    where
        Self: Sized;

    /// Start running this agent.
    #[allow(clippy::async_yields_async)]
    async fn run(&self) -> Instrumented<JoinHandle<Result<()>>>;
}

/// Call this from `main` to fully initialize and run the agent for its entire
/// lifecycle. This assumes only a single agent is being run. This will
/// initialize tracing and metrics as well.
pub async fn agent_main<A: BaseAgent>() -> Result<()> {
    #[cfg(feature = "color-eyre")]
    color_eyre::install()?;

    let settings = A::Settings::load()?;
    let core_settings: &Settings = settings.as_ref();
    core_settings.tracing.start_tracing()?;
    let metrics = core_settings.metrics(A::AGENT_NAME)?;

    let agent = A::from_settings(settings, metrics).await?;
    let result = agent.run().await.await?;
    info!(agent = A::AGENT_NAME, "Shutting down agent...");
    result
}

/// Utility to run multiple tasks and shutdown if any one task ends.
#[allow(clippy::unit_arg, unused_must_use)]
pub fn run_all(
    tasks: Vec<Instrumented<JoinHandle<Result<(), Report>>>>,
) -> Instrumented<JoinHandle<Result<()>>> {
    debug_assert!(!tasks.is_empty(), "No tasks submitted");
    let span = info_span!("run_all");
    tokio::spawn(async move {
        let (res, _, remaining) = select_all(tasks).await;

        for task in remaining.into_iter() {
            cancel_task!(task);
        }

        res?
    })
    .instrument(span)
}

/// Run the task built by `factory` until it finishes cleanly. An error or a
/// panic is logged and the task is rebuilt after `backoff`.
pub fn supervise<F, Fut>(
    name: &'static str,
    backoff: Duration,
    mut factory: F,
) -> Instrumented<JoinHandle<Result<()>>>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let span = info_span!("supervise", task = name);
    tokio::spawn(async move {
        let mut restarts = 0u64;
        loop {
            match tokio::spawn(factory().in_current_span()).await {
                Ok(Ok(())) => {
                    info!(task = name, "Task finished");
                    return Ok(());
                }
                Ok(Err(err)) => error!(task = name, restarts, error = ?err, "Task failed"),
                Err(err) if err.is_cancelled() => return Ok(()),
                Err(err) => error!(task = name, restarts, error = %err, "Task panicked"),
            }
            restarts += 1;
            warn!(task = name, ?backoff, "Restarting task");
            tokio::time::sleep(backoff).await;
        }
    })
    .instrument(span)
}
