use std::fmt::{Debug, Formatter};

use async_trait::async_trait;
use eyre::{Context, Result};
use redis::{aio::MultiplexedConnection, AsyncCommands};
use tracing::{debug, instrument};

use explorer_core::{ChainCommunicationError, ChainResult, Vaa, VaaNotifier};

/// Redis key holding the highest sequence seen for an emitter and target
pub fn max_sequence_key(vaa: &Vaa) -> String {
    format!(
        "wormscan:vaa-max-sequence:{}:{}:{}",
        vaa.emitter_chain,
        hex::encode(vaa.emitter_address.as_bytes()),
        vaa.target_chain
    )
}

/// Publishes the latest sequence of every emitter to redis
#[derive(Clone)]
pub struct RedisNotifier {
    connection: MultiplexedConnection,
}

impl Debug for RedisNotifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisNotifier").finish_non_exhaustive()
    }
}

impl RedisNotifier {
    /// Connect to the redis server at `uri`
    pub async fn connect(uri: &str) -> Result<Self> {
        let client = redis::Client::open(uri).wrap_err("Invalid redis uri")?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .wrap_err("Failed to connect to redis")?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl VaaNotifier for RedisNotifier {
    #[instrument(skip_all, fields(id = %vaa.id()), err)]
    async fn notify(&self, vaa: &Vaa) -> ChainResult<()> {
        let key = max_sequence_key(vaa);
        let mut con = self.connection.clone();
        let current: Option<u64> = con
            .get(&key)
            .await
            .map_err(ChainCommunicationError::from_other)?;
        if current.is_some_and(|current| current >= vaa.sequence) {
            return Ok(());
        }
        let _: () = con
            .set(&key, vaa.sequence)
            .await
            .map_err(ChainCommunicationError::from_other)?;
        debug!(key, sequence = vaa.sequence, "Updated max sequence");
        Ok(())
    }
}

/// Used when no notification sink is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl VaaNotifier for NoopNotifier {
    async fn notify(&self, _vaa: &Vaa) -> ChainResult<()> {
        Ok(())
    }
}
