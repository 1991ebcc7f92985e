use std::fmt::Debug;

use async_trait::async_trait;
use auto_impl::auto_impl;

use crate::{ChainResult, Vaa};

/// Notified after a message has been persisted.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait VaaNotifier: Send + Sync + Debug {
    /// Called once per persisted message
    async fn notify(&self, vaa: &Vaa) -> ChainResult<()>;
}

/// Source of USD prices for notional values.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait PriceSource: Send + Sync + Debug {
    /// Current USD price of a listed token
    async fn usd_price(&self, coin_gecko_id: &str) -> ChainResult<Option<f64>>;
}
