use std::fmt::{Debug, Formatter};

use eyre::{Context, Result};
use tokio::sync::mpsc;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request};
use tracing::{debug, info, instrument, warn};

use super::proto::{
    SubscribeGossipRequest, SubscribeGossipResponse, SubscribeSignedVaaRequest,
    SubscribeSignedVaaResponse,
};

const SUBSCRIBE_SIGNED_VAA_PATH: &str = "/spy.v1.SpyRPCService/SubscribeSignedVAA";
const SUBSCRIBE_GOSSIP_PATH: &str = "/spy.v1.SpyRPCService/SubscribeGossip";

/// Client of a spy node relaying the signed messages of the gossip network
#[derive(Clone)]
pub struct SpyClient {
    grpc: Grpc<Channel>,
    endpoint: String,
}

impl Debug for SpyClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpyClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl SpyClient {
    /// Connect to the spy at `url`
    pub async fn connect(url: &str) -> Result<Self> {
        let channel = Endpoint::from_shared(url.to_owned())
            .wrap_err_with(|| format!("Invalid spy url {url}"))?
            .connect()
            .await
            .wrap_err_with(|| format!("Failed to connect to spy {url}"))?;
        Ok(Self {
            grpc: Grpc::new(channel),
            endpoint: url.to_owned(),
        })
    }

    /// Forward the wire bytes of every signed message to `sink` until the
    /// stream ends or the receiver is dropped. An ended stream is an error so
    /// the caller's supervisor reconnects.
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    pub async fn forward_signed_vaas(&self, sink: mpsc::Sender<Vec<u8>>) -> Result<()> {
        let mut grpc = self.grpc.clone();
        grpc.ready().await.wrap_err("Spy not ready")?;
        let mut stream = grpc
            .server_streaming::<_, SubscribeSignedVaaResponse, _>(
                Request::new(SubscribeSignedVaaRequest {}),
                PathAndQuery::from_static(SUBSCRIBE_SIGNED_VAA_PATH),
                ProstCodec::default(),
            )
            .await
            .wrap_err("Failed to subscribe to signed VAAs")?
            .into_inner();
        info!("Subscribed to signed VAAs");

        while let Some(message) = stream.message().await.wrap_err("Spy stream failed")? {
            debug!(len = message.vaa_bytes.len(), "Received signed VAA");
            if sink.send(message.vaa_bytes).await.is_err() {
                info!("Receiver dropped, closing spy subscription");
                return Ok(());
            }
        }
        Err(eyre::eyre!("Spy stream ended"))
    }

    /// Forward every encoded gossip envelope (observations and heartbeats)
    /// to `sink`, like [`Self::forward_signed_vaas`]. Returns `Ok` at once
    /// when the spy does not relay gossip.
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    pub async fn forward_gossip(&self, sink: mpsc::Sender<Vec<u8>>) -> Result<()> {
        let mut grpc = self.grpc.clone();
        grpc.ready().await.wrap_err("Spy not ready")?;
        let subscribed = grpc
            .server_streaming::<_, SubscribeGossipResponse, _>(
                Request::new(SubscribeGossipRequest {}),
                PathAndQuery::from_static(SUBSCRIBE_GOSSIP_PATH),
                ProstCodec::default(),
            )
            .await;
        let mut stream = match subscribed {
            Ok(response) => response.into_inner(),
            Err(status) if status.code() == Code::Unimplemented => {
                warn!("Spy does not relay observations or heartbeats");
                return Ok(());
            }
            Err(status) => return Err(status).wrap_err("Failed to subscribe to gossip"),
        };
        info!("Subscribed to gossip");

        while let Some(message) = stream.message().await.wrap_err("Spy stream failed")? {
            if sink.send(message.gossip_message).await.is_err() {
                info!("Receiver dropped, closing gossip subscription");
                return Ok(());
            }
        }
        Err(eyre::eyre!("Spy gossip stream ended"))
    }
}
