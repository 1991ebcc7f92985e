//! Access to the bridge contract on Alephium through the full node REST API

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub use provider::*;

/// Wire types of the full node API
mod api;
mod provider;
