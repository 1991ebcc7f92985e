use std::fmt::{Debug, Formatter};
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result};
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;
use tracing::{instrument, warn};

use explorer_core::{ChainCommunicationError, ChainResult, Emitter, GuardianRpc, VaaBatchEntry};

use super::proto::{
    GetGovernanceVaaBatchRequest, GetNonGovernanceVaaBatchRequest, GetVaaBatchResponse,
};

const GOVERNANCE_BATCH_PATH: &str = "/publicrpc.v1.PublicRPCService/GetGovernanceVAABatch";
const NON_GOVERNANCE_BATCH_PATH: &str = "/publicrpc.v1.PublicRPCService/GetNonGovernanceVAABatch";

/// Client of a peer guardian's public RPC
#[derive(Clone)]
pub struct GuardianRpcClient {
    grpc: Grpc<Channel>,
    endpoint: String,
}

impl Debug for GuardianRpcClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardianRpcClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl GuardianRpcClient {
    /// Create a client that connects on first use
    pub fn connect_lazy(url: &str, timeout: Duration) -> Result<Self> {
        let channel = Endpoint::from_shared(url.to_owned())
            .wrap_err_with(|| format!("Invalid guardian rpc url {url}"))?
            .timeout(timeout)
            .connect_timeout(timeout)
            .connect_lazy();
        Ok(Self {
            grpc: Grpc::new(channel),
            endpoint: url.to_owned(),
        })
    }

    async fn batch<M>(&self, path: &'static str, request: M) -> ChainResult<GetVaaBatchResponse>
    where
        M: prost::Message + Send + Sync + 'static,
    {
        let mut grpc = self.grpc.clone();
        grpc.ready()
            .await
            .map_err(ChainCommunicationError::from_other)?;
        let response = grpc
            .unary(
                Request::new(request),
                PathAndQuery::from_static(path),
                ProstCodec::default(),
            )
            .await
            .map_err(ChainCommunicationError::from_other)?;
        Ok(response.into_inner())
    }
}

/// Keep the entries that answer the request; peers may pad or repeat.
fn requested_entries(response: GetVaaBatchResponse, sequences: &[u64]) -> Vec<VaaBatchEntry> {
    let mut entries: Vec<VaaBatchEntry> = response
        .entries
        .into_iter()
        .filter(|entry| {
            let requested = sequences.contains(&entry.sequence);
            if !requested {
                warn!(sequence = entry.sequence, "Peer returned an unrequested sequence");
            }
            requested && !entry.vaa_bytes.is_empty()
        })
        .map(|entry| VaaBatchEntry {
            sequence: entry.sequence,
            vaa_bytes: entry.vaa_bytes,
        })
        .collect();
    entries.sort_by_key(|entry| entry.sequence);
    entries.dedup_by_key(|entry| entry.sequence);
    entries
}

#[async_trait]
impl GuardianRpc for GuardianRpcClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint), err)]
    async fn governance_vaa_batch(&self, sequences: &[u64]) -> ChainResult<Vec<VaaBatchEntry>> {
        let request = GetGovernanceVaaBatchRequest {
            sequences: sequences.to_vec(),
        };
        let response = self.batch(GOVERNANCE_BATCH_PATH, request).await?;
        Ok(requested_entries(response, sequences))
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint, %emitter), err)]
    async fn non_governance_vaa_batch(
        &self,
        emitter: &Emitter,
        sequences: &[u64],
    ) -> ChainResult<Vec<VaaBatchEntry>> {
        let request = GetNonGovernanceVaaBatchRequest {
            emitter_chain: emitter.chain.into(),
            emitter_address: emitter.address.as_bytes().to_vec(),
            target_chain: emitter.target_chain.into(),
            sequences: sequences.to_vec(),
        };
        let response = self.batch(NON_GOVERNANCE_BATCH_PATH, request).await?;
        Ok(requested_entries(response, sequences))
    }
}

#[cfg(test)]
mod test {
    use super::super::proto::VaaResponse;
    use super::*;

    fn entry(sequence: u64, bytes: &[u8]) -> VaaResponse {
        VaaResponse {
            sequence,
            vaa_bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn drops_unrequested_and_empty_entries() {
        let response = GetVaaBatchResponse {
            entries: vec![entry(9, b"x"), entry(3, b"c"), entry(2, b""), entry(3, b"c")],
        };
        let entries = requested_entries(response, &[1, 2, 3]);
        assert_eq!(
            entries,
            vec![VaaBatchEntry {
                sequence: 3,
                vaa_bytes: b"c".to_vec()
            }]
        );
    }

    #[tokio::test]
    async fn rejects_invalid_urls() {
        assert!(GuardianRpcClient::connect_lazy("not a url", Duration::from_secs(1)).is_err());
    }
}
