use serde::Deserialize;

use explorer_core::{ChainCommunicationError, ChainResult, MessagePublication, H256};

/// A typed value as the node renders contract fields
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value")]
pub(crate) enum Val {
    Bool(bool),
    I256(String),
    U256(String),
    ByteVec(String),
    Address(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContractEventEntry {
    pub block_hash: String,
    pub tx_id: String,
    pub event_index: i32,
    pub fields: Vec<Val>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContractEvents {
    pub events: Vec<ContractEventEntry>,
    #[allow(dead_code)]
    pub next_start: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContractEventByTxId {
    pub block_hash: String,
    pub contract_address: String,
    pub event_index: i32,
    pub fields: Vec<Val>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ContractEventsByTxId {
    pub events: Vec<ContractEventByTxId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BlockHeaderEntry {
    pub hash: String,
    pub timestamp: u64,
    pub height: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChainInfo {
    pub current_height: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct HashesAtHeight {
    pub headers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RichAssetInput {
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RichUnsignedTx {
    pub inputs: Vec<RichAssetInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RichTransaction {
    pub unsigned: RichUnsignedTx,
}

fn field_error(reason: impl std::fmt::Display) -> ChainCommunicationError {
    ChainCommunicationError::LogFetchFailed(format!("unexpected message event: {reason}"))
}

fn byte_vec(val: &Val) -> ChainResult<Vec<u8>> {
    match val {
        Val::ByteVec(hex_value) => hex::decode(hex_value).map_err(field_error),
        other => Err(field_error(format!("expected ByteVec, got {other:?}"))),
    }
}

fn number<T: std::str::FromStr>(val: &Val) -> ChainResult<T> {
    match val {
        Val::U256(value) => value
            .parse()
            .map_err(|_| field_error(format!("{value} out of range"))),
        other => Err(field_error(format!("expected U256, got {other:?}"))),
    }
}

/// Decode the fields of a `WormholeMessage(sender, targetChainId, sequence,
/// nonce, payload, consistencyLevel)` event.
pub(crate) fn decode_message_fields(fields: &[Val]) -> ChainResult<MessagePublication> {
    let [sender, target_chain, sequence, nonce, payload, consistency_level] = fields else {
        return Err(field_error(format!("{} fields", fields.len())));
    };
    let sender = byte_vec(sender)?;
    if sender.len() != 32 {
        return Err(field_error("sender is not a contract id"));
    }
    let nonce: [u8; 4] = byte_vec(nonce)?
        .try_into()
        .map_err(|_| field_error("nonce is not 4 bytes"))?;
    Ok(MessagePublication {
        emitter: H256::from_slice(&sender),
        sequence: number(sequence)?,
        nonce: u32::from_be_bytes(nonce),
        target_chain: number(target_chain)?,
        payload: byte_vec(payload)?,
        consistency_level: number(consistency_level)?,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn fields(sequence: &str) -> Vec<Val> {
        serde_json::from_value(serde_json::json!([
            {"type": "ByteVec", "value": "11".repeat(32)},
            {"type": "U256", "value": "2"},
            {"type": "U256", "value": sequence},
            {"type": "ByteVec", "value": "00000007"},
            {"type": "ByteVec", "value": "010203"},
            {"type": "U256", "value": "105"},
        ]))
        .unwrap()
    }

    #[test]
    fn decodes_message_event() {
        let message = decode_message_fields(&fields("18446744073709551615")).unwrap();
        assert_eq!(message.emitter, H256::repeat_byte(0x11));
        assert_eq!(message.target_chain, 2);
        assert_eq!(message.sequence, u64::MAX);
        assert_eq!(message.nonce, 7);
        assert_eq!(message.payload, vec![1, 2, 3]);
        assert_eq!(message.consistency_level, 105);
    }

    #[test]
    fn rejects_out_of_range_sequence() {
        assert!(decode_message_fields(&fields("18446744073709551616")).is_err());
        assert!(decode_message_fields(&fields("1")[..5]).is_err());
    }
}
