use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Decode, Encode, ExplorerProtocolError, VaaId, H160, H256};

/// Implements `Encode`/`Decode` for a struct by writing its fields in order.
macro_rules! impl_field_codec {
    ($ty:ident { $($field:ident: $fty:ty),* $(,)? }) => {
        impl Encode for $ty {
            fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
            where
                W: std::io::Write,
            {
                let mut written = 0;
                $(written += self.$field.write_to(writer)?;)*
                Ok(written)
            }
        }

        impl Decode for $ty {
            fn read_from<R>(reader: &mut R) -> Result<Self, ExplorerProtocolError>
            where
                R: std::io::Read,
                Self: Sized,
            {
                Ok(Self {
                    $($field: <$fty>::read_from(reader)?,)*
                })
            }
        }
    };
}

/// A stored message with the bookkeeping kept next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVaa {
    /// Raw wire bytes
    pub bytes: Vec<u8>,
    /// Originating transaction, once an observation or a watcher linked it
    pub tx_id: Option<String>,
    /// When the message was first stored
    pub indexed_at: DateTime<Utc>,
}

impl_field_codec!(StoredVaa {
    bytes: Vec<u8>,
    tx_id: Option<String>,
    indexed_at: DateTime<Utc>,
});

/// Marker for a sequence known to exist upstream but not stored yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingVaa {
    /// Id of the missing message
    pub id: VaaId,
    /// When the gap was detected
    pub indexed_at: DateTime<Utc>,
}

impl_field_codec!(MissingVaa {
    id: VaaId,
    indexed_at: DateTime<Utc>,
});

/// A single guardian's signed claim about a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Message observed
    pub message_id: VaaId,
    /// Observing guardian
    pub guardian_address: H160,
    /// Digest signed
    pub hash: H256,
    /// Signature over `hash`
    pub signature: Vec<u8>,
    /// Source chain transaction
    pub tx_hash: String,
    /// When it was indexed
    pub indexed_at: DateTime<Utc>,
}

impl_field_codec!(Observation {
    message_id: VaaId,
    guardian_address: H160,
    hash: H256,
    signature: Vec<u8>,
    tx_hash: String,
    indexed_at: DateTime<Utc>,
});

/// A source chain transaction that published a bridge message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeTransaction {
    /// Id of the message the transaction published
    pub vaa_id: VaaId,
    /// Transaction id in the chain's native form
    pub tx_id: String,
    /// Sender of the transaction in the chain's native form
    pub sender_address: String,
    /// Hash of the containing block
    pub block_hash: String,
    /// Height of the containing block
    pub block_number: u64,
    /// Block timestamp, milliseconds since epoch
    pub block_timestamp: u64,
    /// Chain specific resumption cursor
    pub event_index: u64,
}

impl_field_codec!(BridgeTransaction {
    vaa_id: VaaId,
    tx_id: String,
    sender_address: String,
    block_hash: String,
    block_number: u64,
    block_timestamp: u64,
    event_index: u64,
});

/// Confirmed transactions of one block, published by a watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTransactions {
    /// Source chain
    pub chain: u16,
    /// Block hash
    pub block_hash: String,
    /// Block height
    pub block_number: u64,
    /// Block timestamp, milliseconds since epoch
    pub block_timestamp: u64,
    /// Transactions in log order
    pub transactions: Vec<BridgeTransaction>,
}

/// A decoded token transfer, the input of the statistics aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenTransferRecord {
    /// Emitter chain of the transfer message
    pub emitter_chain: u16,
    /// Emitter of the transfer message
    pub emitter_address: H256,
    /// Destination chain
    pub target_chain: u16,
    /// Native chain of the token
    pub token_chain: u16,
    /// Native address of the token
    pub token_address: H256,
    /// Amount as a decimal string
    pub amount: String,
    /// USD value at the time of indexing
    pub notional_usd: f64,
    /// Message timestamp
    pub timestamp: DateTime<Utc>,
}

impl TokenTransferRecord {
    /// Key of the rollup this transfer counts towards
    pub fn statistic_key(&self) -> StatisticKey {
        StatisticKey {
            date: self.timestamp.date_naive(),
            emitter_chain: self.emitter_chain,
            emitter_address: self.emitter_address,
            target_chain: self.target_chain,
            token_chain: self.token_chain,
            token_address: self.token_address,
        }
    }
}

/// `(date, emitterChain, emitterAddress, targetChain, tokenChain, tokenAddress)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatisticKey {
    /// UTC day
    pub date: NaiveDate,
    /// Emitter chain
    pub emitter_chain: u16,
    /// Emitter address
    pub emitter_address: H256,
    /// Target chain
    pub target_chain: u16,
    /// Token chain
    pub token_chain: u16,
    /// Token address
    pub token_address: H256,
}

impl_field_codec!(StatisticKey {
    date: NaiveDate,
    emitter_chain: u16,
    emitter_address: H256,
    target_chain: u16,
    token_chain: u16,
    token_address: H256,
});

/// A per day rollup of token transfers.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticDoc {
    /// Rollup key
    pub key: StatisticKey,
    /// Number of transfers
    pub total_vaa_count: u32,
    /// Sum of amounts as a decimal string
    pub total_transfer_amount: String,
    /// Sum of USD values
    pub total_notional_usd: f64,
    /// Last write
    pub updated_at: DateTime<Utc>,
}

impl_field_codec!(StatisticDoc {
    key: StatisticKey,
    total_vaa_count: u32,
    total_transfer_amount: String,
    total_notional_usd: f64,
    updated_at: DateTime<Utc>,
});

/// Metadata of a bridged token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    /// Native chain
    pub token_chain: u16,
    /// Native address, 32 bytes
    pub token_address: H256,
    /// Decimals
    pub decimals: u8,
    /// Symbol
    pub symbol: String,
    /// Name
    pub name: String,
    /// Address in the native chain's format
    pub native_address: String,
    /// Price feed id, if the token is listed
    pub coin_gecko_id: Option<String>,
}

impl_field_codec!(TokenMetadata {
    token_chain: u16,
    token_address: H256,
    decimals: u8,
    symbol: String,
    name: String,
    native_address: String,
    coin_gecko_id: Option<String>,
});

/// Chain status reported in a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatNetwork {
    /// Chain id
    pub id: u32,
    /// Latest height seen by the guardian
    pub height: i64,
    /// Contract watched
    pub contract_address: String,
}

impl_field_codec!(HeartbeatNetwork {
    id: u32,
    height: i64,
    contract_address: String,
});

/// Latest liveness report of a guardian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    /// Guardian key
    pub guardian_address: H160,
    /// Node name
    pub node_name: String,
    /// Monotonic counter
    pub counter: i64,
    /// Report time, nanoseconds since epoch
    pub timestamp: i64,
    /// Software version
    pub version: String,
    /// Boot time, nanoseconds since epoch
    pub boot_timestamp: i64,
    /// Per chain status
    pub networks: Vec<HeartbeatNetwork>,
}

impl_field_codec!(Heartbeat {
    guardian_address: H160,
    node_name: String,
    counter: i64,
    timestamp: i64,
    version: String,
    boot_timestamp: i64,
    networks: Vec<HeartbeatNetwork>,
});
