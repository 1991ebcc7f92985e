//! Clients of the guardian network

pub use rpc::*;
pub use spy::*;

/// Protobuf messages
pub mod proto;

/// Peer guardian public RPC
mod rpc;

/// Spy gossip subscription
mod spy;
