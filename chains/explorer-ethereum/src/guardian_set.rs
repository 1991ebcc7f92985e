use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::prelude::Middleware;
use ethers::types::{transaction::eip2718::TypedTransaction, Bytes, TransactionRequest};
use tracing::instrument;

use explorer_core::utils::keccak256;
use explorer_core::{ChainCommunicationError, ChainResult, GuardianSet, GuardianSetSource, H160};

const GET_CURRENT_INDEX: &str = "getCurrentGuardianSetIndex()";
const GET_GUARDIAN_SET: &str = "getGuardianSet(uint32)";

fn selector(signature: &str) -> [u8; 4] {
    let mut out = [0; 4];
    out.copy_from_slice(&keccak256(signature).as_bytes()[..4]);
    out
}

fn malformed(call: &str) -> ChainCommunicationError {
    ChainCommunicationError::CustomError(format!("Unexpected return data from {call}"))
}

/// Reads guardian sets from the core contract's getters.
pub struct EthereumGuardianSetSource<M>
where
    M: Middleware,
{
    provider: Arc<M>,
    contract: H160,
}

impl<M> Debug for EthereumGuardianSetSource<M>
where
    M: Middleware,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthereumGuardianSetSource")
            .field("contract", &self.contract)
            .finish()
    }
}

impl<M> EthereumGuardianSetSource<M>
where
    M: Middleware + 'static,
{
    /// Create a source reading the core contract at `contract`
    pub fn new(provider: Arc<M>, contract: H160) -> Self {
        Self { provider, contract }
    }

    async fn call(&self, data: Vec<u8>) -> ChainResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new()
            .to(self.contract)
            .data(data)
            .into();
        self.provider
            .call(&tx, None)
            .await
            .map_err(ChainCommunicationError::from_other)
    }
}

/// Decode the `(address[] keys, uint32 expirationTime)` struct returned by
/// `getGuardianSet`
pub fn decode_guardian_set(index: u32, data: &[u8]) -> ChainResult<Option<GuardianSet>> {
    let layout = ParamType::Tuple(vec![
        ParamType::Array(Box::new(ParamType::Address)),
        ParamType::Uint(32),
    ]);
    let token = abi::decode(&[layout], data)
        .map_err(ChainCommunicationError::from_other)?
        .pop()
        .ok_or_else(|| malformed(GET_GUARDIAN_SET))?;
    let keys = token
        .into_tuple()
        .and_then(|fields| fields.into_iter().next())
        .and_then(Token::into_array)
        .ok_or_else(|| malformed(GET_GUARDIAN_SET))?
        .into_iter()
        .map(|key| key.into_address().ok_or_else(|| malformed(GET_GUARDIAN_SET)))
        .collect::<ChainResult<Vec<H160>>>()?;
    if keys.is_empty() {
        return Ok(None);
    }
    Ok(Some(GuardianSet::new(index, keys)))
}

#[async_trait]
impl<M> GuardianSetSource for EthereumGuardianSetSource<M>
where
    M: Middleware + 'static,
{
    #[instrument(err, skip(self))]
    async fn current_guardian_set_index(&self) -> ChainResult<u32> {
        let data = self.call(selector(GET_CURRENT_INDEX).to_vec()).await?;
        let index = abi::decode(&[ParamType::Uint(32)], &data)
            .map_err(ChainCommunicationError::from_other)?
            .pop()
            .and_then(Token::into_uint)
            .ok_or_else(|| malformed(GET_CURRENT_INDEX))?;
        Ok(index.low_u32())
    }

    #[instrument(err, skip(self))]
    async fn guardian_set(&self, index: u32) -> ChainResult<Option<GuardianSet>> {
        let mut calldata = selector(GET_GUARDIAN_SET).to_vec();
        calldata.extend(abi::encode(&[Token::Uint(index.into())]));
        let data = self.call(calldata).await?;
        decode_guardian_set(index, &data)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_guardian_set_struct() {
        let keys = vec![H160::repeat_byte(1), H160::repeat_byte(2)];
        let data = abi::encode(&[Token::Tuple(vec![
            Token::Array(keys.iter().copied().map(Token::Address).collect()),
            Token::Uint(0.into()),
        ])]);
        let set = decode_guardian_set(3, &data).unwrap().unwrap();
        assert_eq!(set.index, 3);
        assert_eq!(set.keys, keys);
    }

    #[test]
    fn empty_guardian_set_does_not_exist() {
        let data = abi::encode(&[Token::Tuple(vec![
            Token::Array(vec![]),
            Token::Uint(0.into()),
        ])]);
        assert_eq!(decode_guardian_set(9, &data).unwrap(), None);
    }
}
