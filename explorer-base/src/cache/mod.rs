pub use dedup::*;

/// Bounded first-sight filter for gossip
mod dedup;
