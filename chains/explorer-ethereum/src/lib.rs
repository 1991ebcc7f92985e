//! Interfaces to the bridge core contract on ethereum-compatible chains

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub use crate::{guardian_set::*, message_log::*, provider::*, trait_builder::*};

/// Core contract guardian set getters
mod guardian_set;

/// `LogMessagePublished` decoding
mod message_log;

/// Block and log access
mod provider;

mod trait_builder;

/// Ethereum connection configuration
#[derive(Debug, serde::Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectionConf {
    /// HTTP connection details
    Http {
        /// Fully qualified string to connect to
        url: String,
    },
    /// Websocket connection details
    Ws {
        /// Fully qualified string to connect to
        url: String,
    },
}

impl ConnectionConf {
    /// Pick the transport from the url scheme
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        if url.starts_with("ws://") || url.starts_with("wss://") {
            Self::Ws { url }
        } else {
            Self::Http { url }
        }
    }
}

impl Default for ConnectionConf {
    fn default() -> Self {
        Self::Http {
            url: Default::default(),
        }
    }
}
