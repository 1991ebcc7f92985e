//! This repo contains a simple framework for building explorer agents.
//! It has common utils and tools for configuring the app, talking to the
//! guardian network, and persisting the indexed data.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Settings and configuration for explorer agents
pub mod settings;
pub use settings::*;

mod agent;
pub use agent::*;

/// Bounded caches
pub mod cache;
pub use cache::*;

/// RocksDB storage of the explorer's collections
pub mod db;

/// Clients of the guardian network
pub mod guardian;
pub use guardian::*;

#[doc(hidden)]
#[macro_use]
pub mod macros;

/// Prometheus metrics
pub mod metrics;
pub use metrics::*;

mod notifier;
pub use notifier::*;

mod price;
pub use price::*;
