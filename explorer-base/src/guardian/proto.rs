//! Protobuf messages of the guardian network: the gossip envelope, the
//! public RPC batch calls and the spy subscriptions.

/// Envelope of every message on the gossip network
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GossipMessage {
    /// Payload
    #[prost(oneof = "gossip_message::Message", tags = "2, 3, 4")]
    pub message: ::core::option::Option<gossip_message::Message>,
}

/// Nested message and enum types in `GossipMessage`.
pub mod gossip_message {
    /// Payload of a gossip envelope
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Message {
        /// A single guardian's signature over a message digest
        #[prost(message, tag = "2")]
        SignedObservation(super::SignedObservation),
        /// Liveness report of a guardian
        #[prost(message, tag = "3")]
        SignedHeartbeat(super::SignedHeartbeat),
        /// A message signed by a quorum
        #[prost(message, tag = "4")]
        SignedVaaWithQuorum(super::SignedVaaWithQuorum),
    }
}

/// A guardian's signature over the digest of an observed message
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedObservation {
    /// Guardian address, 20 bytes
    #[prost(bytes = "vec", tag = "1")]
    pub addr: ::prost::alloc::vec::Vec<u8>,
    /// Signing digest of the message body
    #[prost(bytes = "vec", tag = "2")]
    pub hash: ::prost::alloc::vec::Vec<u8>,
    /// 65 byte recoverable signature over `hash`
    #[prost(bytes = "vec", tag = "3")]
    pub signature: ::prost::alloc::vec::Vec<u8>,
    /// Transaction that emitted the message
    #[prost(bytes = "vec", tag = "4")]
    pub tx_hash: ::prost::alloc::vec::Vec<u8>,
    /// `emitterChain/emitterAddress/targetChain/sequence`
    #[prost(string, tag = "5")]
    pub message_id: ::prost::alloc::string::String,
}

/// A serialized [`Heartbeat`] and its signature
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedHeartbeat {
    /// Encoded [`Heartbeat`]
    #[prost(bytes = "vec", tag = "1")]
    pub heartbeat: ::prost::alloc::vec::Vec<u8>,
    /// Signature over `keccak256("heartbeat|" ‖ heartbeat)`
    #[prost(bytes = "vec", tag = "2")]
    pub signature: ::prost::alloc::vec::Vec<u8>,
    /// Guardian address, 20 bytes
    #[prost(bytes = "vec", tag = "3")]
    pub guardian_addr: ::prost::alloc::vec::Vec<u8>,
}

#[allow(missing_docs)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Heartbeat {
    #[prost(string, tag = "1")]
    pub node_name: ::prost::alloc::string::String,
    #[prost(int64, tag = "2")]
    pub counter: i64,
    #[prost(int64, tag = "3")]
    pub timestamp: i64,
    #[prost(message, repeated, tag = "4")]
    pub networks: ::prost::alloc::vec::Vec<heartbeat::Network>,
    #[prost(string, tag = "5")]
    pub version: ::prost::alloc::string::String,
    #[prost(string, tag = "6")]
    pub guardian_addr: ::prost::alloc::string::String,
    #[prost(int64, tag = "7")]
    pub boot_timestamp: i64,
}

/// Nested message and enum types in `Heartbeat`.
pub mod heartbeat {
    #[allow(missing_docs)]
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Network {
        #[prost(uint32, tag = "1")]
        pub id: u32,
        #[prost(int64, tag = "2")]
        pub height: i64,
        #[prost(string, tag = "3")]
        pub contract_address: ::prost::alloc::string::String,
    }
}

/// A message signed by a quorum of guardians
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedVaaWithQuorum {
    /// Wire bytes
    #[prost(bytes = "vec", tag = "1")]
    pub vaa: ::prost::alloc::vec::Vec<u8>,
}

#[allow(missing_docs)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetGovernanceVaaBatchRequest {
    #[prost(uint64, repeated, tag = "1")]
    pub sequences: ::prost::alloc::vec::Vec<u64>,
}

#[allow(missing_docs)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetNonGovernanceVaaBatchRequest {
    #[prost(uint32, tag = "1")]
    pub emitter_chain: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub emitter_address: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint32, tag = "3")]
    pub target_chain: u32,
    #[prost(uint64, repeated, tag = "4")]
    pub sequences: ::prost::alloc::vec::Vec<u64>,
}

#[allow(missing_docs)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VaaResponse {
    #[prost(uint64, tag = "1")]
    pub sequence: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub vaa_bytes: ::prost::alloc::vec::Vec<u8>,
}

/// Sparse batch response: sequences the peer does not have are omitted
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetVaaBatchResponse {
    /// Found messages
    #[prost(message, repeated, tag = "1")]
    pub entries: ::prost::alloc::vec::Vec<VaaResponse>,
}

/// Subscribe to every signed message seen by the spy
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeSignedVaaRequest {}

#[allow(missing_docs)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeSignedVaaResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub vaa_bytes: ::prost::alloc::vec::Vec<u8>,
}

/// Subscribe to the observations and heartbeats relayed by the spy
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeGossipRequest {}

#[allow(missing_docs)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeGossipResponse {
    /// Encoded [`GossipMessage`]
    #[prost(bytes = "vec", tag = "1")]
    pub gossip_message: ::prost::alloc::vec::Vec<u8>,
}
