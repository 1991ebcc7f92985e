//! The ingestor admits signed messages from the guardian network into the
//! explorer's store.
//!
//! Gossip is verified against the tracked guardian sets, deduplicated and
//! persisted by a single writer which also detects sequence gaps. Gaps are
//! backfilled from a peer guardian. Token transfers are decoded and rolled
//! up into per day statistics, served from an in memory projection.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]

use eyre::Result;

use explorer_base::agent_main;

use crate::ingestor::Ingestor;

mod decoder;
mod error;
mod fanout;
mod fetcher;
mod guardian_sets;
mod ingestor;
mod settings;
mod stats;
mod verifier;

#[tokio::main]
async fn main() -> Result<()> {
    agent_main::<Ingestor>().await
}
