//! The tracker follows the bridge contracts of the watched chains and
//! records which source transaction published each message.
//!
//! Every chain has a watcher applying the chain's confirmation policy and
//! dropping events that were reorganised away. Confirmed transactions are
//! written by a single recorder, which also provides the cursor a restarted
//! watcher resumes from.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]

use eyre::Result;

use explorer_base::agent_main;

use crate::tracker::Tracker;

mod error;
mod recorder;
mod settings;
mod tracker;
mod watcher;

#[tokio::main]
async fn main() -> Result<()> {
    agent_main::<Tracker>().await
}
