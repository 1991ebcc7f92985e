//! This crate contains core primitives, traits, and types for the bridge
//! explorer: the signed-message wire format, the guardian set model, payload
//! decoding, and the interfaces the agents use to talk to chains and peers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use primitive_types::{H160, H256, U256};

/// Chain identifiers and address formatting
mod chain;
pub use chain::*;

mod error;
pub use error::*;

/// Core explorer traits
pub mod traits;
pub use traits::*;

/// Core explorer types
pub mod types;
pub use types::*;

/// Hashing and signature recovery helpers
pub mod utils;
