use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use eyre::Result;
use prometheus::IntCounterVec;
use prost::Message;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, instrument, trace, warn};

use explorer_base::db::{DbError, ExplorerDB};
use explorer_base::guardian::proto::{
    gossip_message, GossipMessage, Heartbeat as HeartbeatProto, SignedHeartbeat,
    SignedObservation,
};
use explorer_base::Deduplicator;
use explorer_core::{
    AddressFormat, Heartbeat, HeartbeatNetwork, KnownChain, Observation, Vaa, VaaId, VaaNotifier,
    H160, H256,
};

use crate::error::IngressError;
use crate::verifier::VaaVerifier;

/// A message that passed verification, with its wire bytes
#[derive(Debug, Clone)]
pub struct VerifiedVaa {
    /// Parsed message
    pub vaa: Vaa,
    /// Wire bytes as received
    pub bytes: Vec<u8>,
}

/// First stage of the gossip pipeline: verify, deduplicate and enqueue.
/// Never blocks; a full queue drops the message.
#[derive(Debug, Clone)]
pub struct Ingress {
    verifier: VaaVerifier,
    dedup: Deduplicator<VaaId>,
    queue: mpsc::Sender<VerifiedVaa>,
    db: ExplorerDB,
    dropped: IntCounterVec,
}

impl Ingress {
    /// Create the ingress in front of `queue`
    pub fn new(
        verifier: VaaVerifier,
        dedup: Deduplicator<VaaId>,
        queue: mpsc::Sender<VerifiedVaa>,
        db: ExplorerDB,
        dropped: IntCounterVec,
    ) -> Self {
        Self {
            verifier,
            dedup,
            queue,
            db,
            dropped,
        }
    }

    /// Handle one gossip envelope. Dropped messages are logged and counted.
    pub fn handle_gossip(&self, envelope: &[u8]) -> Result<(), IngressError> {
        let result = GossipMessage::decode(envelope)
            .map_err(IngressError::from)
            .and_then(|message| match message.message {
                Some(gossip_message::Message::SignedVaaWithQuorum(signed)) => {
                    self.ingest_vaa(signed.vaa).map(|_| ())
                }
                Some(gossip_message::Message::SignedObservation(observation)) => {
                    self.ingest_observation(observation)
                }
                Some(gossip_message::Message::SignedHeartbeat(heartbeat)) => {
                    self.ingest_heartbeat(heartbeat)
                }
                None => Ok(()),
            });
        if let Err(err) = &result {
            self.record_drop(err);
        }
        result
    }

    /// Handle raw message bytes, e.g. from a spy. Dropped messages are
    /// logged and counted.
    pub fn handle_vaa(&self, bytes: Vec<u8>) -> Result<bool, IngressError> {
        let result = self.ingest_vaa(bytes);
        if let Err(err) = &result {
            self.record_drop(err);
        }
        result
    }

    fn record_drop(&self, err: &IngressError) {
        let reason = err.reason();
        match err {
            IngressError::QueueFull | IngressError::QueueClosed | IngressError::Db(_) => {
                warn!(reason, error = %err, "Dropped gossip message")
            }
            _ => debug!(reason, error = %err, "Dropped gossip message"),
        }
        self.dropped.with_label_values(&[reason]).inc();
    }

    /// Verify and enqueue a signed message. Returns `false` for a message
    /// already admitted.
    #[instrument(skip_all, level = "trace")]
    pub fn ingest_vaa(&self, bytes: Vec<u8>) -> Result<bool, IngressError> {
        let vaa = Vaa::parse(&bytes)?;
        let id = vaa.id();
        self.verifier.verify(&vaa).map_err(|err| {
            debug!(%id, error = %err, "Rejected VAA");
            err
        })?;
        if !self.dedup.first_sight(id) {
            trace!(%id, "Duplicate VAA");
            return Ok(false);
        }
        match self.queue.try_send(VerifiedVaa { vaa, bytes }) {
            Ok(()) => Ok(true),
            Err(err) => {
                // let a later copy through
                self.dedup.forget(&id);
                Err(match err {
                    mpsc::error::TrySendError::Full(_) => IngressError::QueueFull,
                    mpsc::error::TrySendError::Closed(_) => IngressError::QueueClosed,
                })
            }
        }
    }

    /// Verify and index a single guardian's observation
    pub fn ingest_observation(&self, signed: SignedObservation) -> Result<(), IngressError> {
        let message_id = VaaId::from_str(&signed.message_id)?;
        let hash = fixed::<32>(&signed.hash, "hash").map(H256::from)?;
        let guardian = fixed::<20>(&signed.addr, "guardian address").map(H160::from)?;
        self.verifier
            .verify_guardian_signature(&hash, &signed.signature, &guardian)
            .map_err(IngressError::BadEnvelope)?;

        let observation = Observation {
            message_id,
            guardian_address: guardian,
            hash,
            signature: signed.signature,
            tx_hash: format_tx_hash(message_id.emitter_chain, &signed.tx_hash),
            indexed_at: Utc::now(),
        };
        self.db.store_observation(&observation)?;
        trace!(%message_id, ?guardian, "Indexed observation");
        Ok(())
    }

    /// Verify and store a guardian's heartbeat
    pub fn ingest_heartbeat(&self, signed: SignedHeartbeat) -> Result<(), IngressError> {
        let guardian = fixed::<20>(&signed.guardian_addr, "guardian address").map(H160::from)?;
        let digest = VaaVerifier::heartbeat_digest(&signed.heartbeat);
        self.verifier
            .verify_guardian_signature(&digest, &signed.signature, &guardian)
            .map_err(IngressError::BadEnvelope)?;

        let heartbeat = HeartbeatProto::decode(signed.heartbeat.as_slice())?;
        self.db.store_heartbeat(&Heartbeat {
            guardian_address: guardian,
            node_name: heartbeat.node_name,
            counter: heartbeat.counter,
            timestamp: heartbeat.timestamp,
            version: heartbeat.version,
            boot_timestamp: heartbeat.boot_timestamp,
            networks: heartbeat
                .networks
                .into_iter()
                .map(|network| HeartbeatNetwork {
                    id: network.id,
                    height: network.height,
                    contract_address: network.contract_address,
                })
                .collect(),
        })?;
        Ok(())
    }
}

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N], IngressError> {
    bytes
        .try_into()
        .map_err(|_| IngressError::BadEnvelope(format!("{what} is {} bytes", bytes.len())))
}

/// Transaction ids are `0x` prefixed on EVM chains and bare hex elsewhere
fn format_tx_hash(chain: u16, tx_hash: &[u8]) -> String {
    match KnownChain::from_repr(chain).map(KnownChain::address_format) {
        Some(AddressFormat::Evm) => format!("0x{}", hex::encode(tx_hash)),
        _ => hex::encode(tx_hash),
    }
}

/// Persists messages and fans them out to the notifier and the decoder.
/// Shared by the gossip pipeline and the missing message fetcher.
#[derive(Debug, Clone)]
pub struct Persistence {
    db: ExplorerDB,
    notifier: Arc<dyn VaaNotifier>,
    decoded: mpsc::Sender<Vaa>,
    persisted: IntCounterVec,
}

impl Persistence {
    /// Persist into `db`, forwarding new messages to `decoded`
    pub fn new(
        db: ExplorerDB,
        notifier: Arc<dyn VaaNotifier>,
        decoded: mpsc::Sender<Vaa>,
        persisted: IntCounterVec,
    ) -> Self {
        Self {
            db,
            notifier,
            decoded,
            persisted,
        }
    }

    /// Upsert a verified message. Returns `true` if it was new; only new
    /// messages are notified and decoded.
    pub async fn persist(&self, vaa: &Vaa, bytes: &[u8]) -> Result<bool, DbError> {
        if !self.db.upsert_vaa(vaa, bytes)? {
            return Ok(false);
        }
        self.persisted
            .with_label_values(&[&vaa.emitter_chain.to_string()])
            .inc();
        if let Err(err) = self.notifier.notify(vaa).await {
            warn!(id = %vaa.id(), error = %err, "Failed to notify persisted VAA");
        }
        if self.decoded.send(vaa.clone()).await.is_err() {
            warn!(id = %vaa.id(), "Decoder stopped, VAA not decoded");
        }
        Ok(true)
    }
}

/// Feed what a spy relays into `ingress` until both streams end. Drops are
/// logged and counted by the ingress.
pub async fn drain_spy(
    ingress: Ingress,
    mut vaas: mpsc::Receiver<Vec<u8>>,
    mut gossip: mpsc::Receiver<Vec<u8>>,
) {
    let (mut vaas_open, mut gossip_open) = (true, true);
    while vaas_open || gossip_open {
        tokio::select! {
            bytes = vaas.recv(), if vaas_open => match bytes {
                Some(bytes) => {
                    let _ = ingress.handle_vaa(bytes);
                }
                None => vaas_open = false,
            },
            envelope = gossip.recv(), if gossip_open => match envelope {
                Some(envelope) => {
                    let _ = ingress.handle_gossip(&envelope);
                }
                None => gossip_open = false,
            },
        }
    }
}

/// Second stage of the gossip pipeline: the single writer. The queue is
/// shared so a restarted writer resumes where the failed one stopped.
pub async fn run_persister(
    queue: Arc<Mutex<mpsc::Receiver<VerifiedVaa>>>,
    persistence: Persistence,
) -> Result<()> {
    let mut queue = queue.lock().await;
    while let Some(VerifiedVaa { vaa, bytes }) = queue.recv().await {
        persistence.persist(&vaa, &bytes).await?;
    }
    Ok(())
}
