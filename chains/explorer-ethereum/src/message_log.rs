use ethers::abi::{self, ParamType, Token};
use ethers::types::Log;

use explorer_core::utils::keccak256;
use explorer_core::{ChainCommunicationError, ChainResult, LoggedMessage, MessagePublication, H256};

/// Signature of the core contract's publication event
pub const LOG_MESSAGE_PUBLISHED: &str =
    "LogMessagePublished(address,uint64,uint32,uint16,bytes,uint8)";

/// topic0 of `LogMessagePublished`
pub fn log_message_published_topic() -> H256 {
    keccak256(LOG_MESSAGE_PUBLISHED)
}

fn data_layout() -> [ParamType; 5] {
    [
        ParamType::Uint(64),
        ParamType::Uint(32),
        ParamType::Uint(16),
        ParamType::Bytes,
        ParamType::Uint(8),
    ]
}

fn malformed(reason: &str) -> ChainCommunicationError {
    ChainCommunicationError::LogFetchFailed(format!("malformed LogMessagePublished: {reason}"))
}

fn uint(token: Token, bits: u32) -> ChainResult<u64> {
    let value = token.into_uint().ok_or_else(|| malformed("expected uint"))?;
    if value.bits() > bits as usize {
        return Err(malformed("uint out of range"));
    }
    Ok(value.low_u64())
}

/// Decode a mined `LogMessagePublished` log. The emitter is the indexed
/// `sender` topic, already left padded to 32 bytes.
pub fn decode_message_log(log: &Log) -> ChainResult<LoggedMessage> {
    if log.topics.first() != Some(&log_message_published_topic()) {
        return Err(malformed("unexpected topic"));
    }
    let emitter = *log.topics.get(1).ok_or_else(|| malformed("missing sender topic"))?;

    let mut tokens = abi::decode(&data_layout(), &log.data)
        .map_err(ChainCommunicationError::from_other)?
        .into_iter();
    let mut next = || tokens.next().ok_or_else(|| malformed("missing field"));
    let sequence = uint(next()?, 64)?;
    let nonce = uint(next()?, 32)? as u32;
    let target_chain = uint(next()?, 16)? as u16;
    let payload = next()?
        .into_bytes()
        .ok_or_else(|| malformed("expected bytes"))?;
    let consistency_level = uint(next()?, 8)? as u8;

    Ok(LoggedMessage {
        message: MessagePublication {
            emitter,
            sequence,
            nonce,
            target_chain,
            payload,
            consistency_level,
        },
        tx_hash: log
            .transaction_hash
            .ok_or_else(|| malformed("pending log without transaction hash"))?,
        block_hash: log
            .block_hash
            .ok_or_else(|| malformed("pending log without block hash"))?,
        block_number: log
            .block_number
            .ok_or_else(|| malformed("pending log without block number"))?
            .as_u64(),
        log_index: log.log_index.unwrap_or_default().low_u64(),
    })
}

#[cfg(test)]
pub(crate) mod test {
    use ethers::types::{Bytes, U256, U64};

    use explorer_core::H160;

    use super::*;

    pub(crate) fn message_log(sender: H160, sequence: u64, block_hash: H256, log_index: u64) -> Log {
        let data = abi::encode(&[
            Token::Uint(sequence.into()),
            Token::Uint(7.into()),
            Token::Uint(255.into()),
            Token::Bytes(vec![1, 2, 3]),
            Token::Uint(15.into()),
        ]);
        Log {
            topics: vec![log_message_published_topic(), H256::from(sender)],
            data: Bytes::from(data),
            block_hash: Some(block_hash),
            block_number: Some(U64::from(42)),
            transaction_hash: Some(H256::repeat_byte(0xaa)),
            log_index: Some(U256::from(log_index)),
            ..Default::default()
        }
    }

    #[test]
    fn decodes_publication_fields() {
        let sender = H160::repeat_byte(0x11);
        let log = message_log(sender, u64::MAX, H256::repeat_byte(2), 3);
        let decoded = decode_message_log(&log).unwrap();

        assert_eq!(decoded.message.emitter, H256::from(sender));
        assert_eq!(decoded.message.sequence, u64::MAX);
        assert_eq!(decoded.message.nonce, 7);
        assert_eq!(decoded.message.target_chain, 255);
        assert_eq!(decoded.message.payload, vec![1, 2, 3]);
        assert_eq!(decoded.message.consistency_level, 15);
        assert_eq!(decoded.block_number, 42);
        assert_eq!(decoded.log_index, 3);
    }

    #[test]
    fn rejects_foreign_events() {
        let mut log = message_log(H160::zero(), 0, H256::zero(), 0);
        log.topics[0] = H256::repeat_byte(9);
        assert!(decode_message_log(&log).is_err());
    }
}
