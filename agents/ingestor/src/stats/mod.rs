//! Token transfer statistics: the write side aggregating per day rollups
//! and the cached read side serving summaries over them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use eyre::Result;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use explorer_core::Vaa;

use crate::decoder::PayloadDecoder;

mod aggregator;
mod projection;

pub use aggregator::StatsAggregator;
pub use projection::*;

/// Decode persisted messages and aggregate their transfers, flushing every
/// `period`. Returns once the persistence stages have stopped.
pub async fn run_statistics(
    decoder: PayloadDecoder,
    mut aggregator: StatsAggregator,
    decoded: Arc<Mutex<mpsc::Receiver<Vaa>>>,
    period: Duration,
) -> Result<()> {
    let mut decoded = decoded.lock().await;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            vaa = decoded.recv() => match vaa {
                Some(vaa) => {
                    if let Some(record) = decoder.decode(&vaa).await? {
                        aggregator.push(record);
                    }
                }
                None => {
                    aggregator.tick(Utc::now())?;
                    return Ok(());
                }
            },
            _ = ticker.tick() => aggregator.tick(Utc::now())?,
        }
    }
}

/// Advance the projection's summaries every `period` and report their size
pub async fn run_projection(projection: Arc<StatsProjection>, period: Duration) -> Result<()> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_day = None;
    loop {
        ticker.tick().await;
        let today = Utc::now().date_naive();
        projection.refresh(today)?;
        let tvl = projection.tvl(today)?;
        if last_day != Some(today) {
            info!(%today, tokens = tvl.len(), "Statistics projection advanced");
            last_day = Some(today);
        } else {
            debug!(tokens = tvl.len(), "Statistics projection refreshed");
        }
    }
}
