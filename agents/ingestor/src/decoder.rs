use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use eyre::{eyre, Result};
use tracing::{debug, info, instrument, warn};

use explorer_base::db::ExplorerDB;
use explorer_core::{
    decode_payload, normalize_address, AssetMeta, EmitterKind, GovernanceInstruction, Payload,
    PayloadError, PriceSource, TokenMetadata, TokenTransfer, TokenTransferRecord, Vaa, H256, U256,
};

use crate::guardian_sets::GuardianSetTracker;

/// Token bridge amounts carry at most this many decimals
const MAX_AMOUNT_DECIMALS: u8 = 8;

/// Decodes persisted messages, indexing token metadata, signalling guardian
/// set upgrades and turning transfers into statistics input.
#[derive(Debug, Clone)]
pub struct PayloadDecoder {
    db: ExplorerDB,
    kinds: HashMap<(u16, H256), EmitterKind>,
    listed: HashMap<(u16, H256), String>,
    prices: Arc<dyn PriceSource>,
    tracker: Arc<GuardianSetTracker>,
}

impl PayloadDecoder {
    /// Create a decoder for emitters of the given kinds
    pub fn new(
        db: ExplorerDB,
        kinds: HashMap<(u16, H256), EmitterKind>,
        listed: HashMap<(u16, H256), String>,
        prices: Arc<dyn PriceSource>,
        tracker: Arc<GuardianSetTracker>,
    ) -> Self {
        Self {
            db,
            kinds,
            listed,
            prices,
            tracker,
        }
    }

    fn kind_of(&self, vaa: &Vaa) -> Option<EmitterKind> {
        if self.db.is_governance(vaa.emitter_chain, &vaa.emitter_address) {
            Some(EmitterKind::Governance)
        } else {
            self.kinds
                .get(&(vaa.emitter_chain, vaa.emitter_address))
                .copied()
        }
    }

    /// Decode a persisted message. Returns the transfer it carries, if any.
    /// Undecodable payloads are logged; the message stays stored as is.
    #[instrument(skip_all, fields(id = %vaa.id()))]
    pub async fn decode(&self, vaa: &Vaa) -> Result<Option<TokenTransferRecord>> {
        let Some(kind) = self.kind_of(vaa) else {
            return Ok(None);
        };
        let payload = match decode_payload(kind, &vaa.payload) {
            Ok(payload) => payload,
            Err(PayloadError::UnsupportedPayload(id)) => {
                debug!(payload_id = id, "Unsupported payload");
                return Ok(None);
            }
            Err(err) => {
                warn!(error = %err, "Undecodable payload");
                return Ok(None);
            }
        };

        match payload {
            Payload::TokenTransfer(transfer) => {
                self.transfer_record(vaa, &transfer).await.map(Some)
            }
            Payload::AssetMeta(meta) => {
                self.store_metadata(&meta)?;
                Ok(None)
            }
            Payload::Governance(action) => {
                if let GovernanceInstruction::GuardianSetUpgrade { new_index, .. } =
                    action.instruction
                {
                    info!(new_index, "Guardian set upgrade persisted, polling guardian sets");
                    self.tracker.request_poll();
                }
                Ok(None)
            }
            Payload::NftTransfer(_) => Ok(None),
        }
    }

    fn store_metadata(&self, meta: &AssetMeta) -> Result<()> {
        let metadata = TokenMetadata {
            token_chain: meta.token_chain,
            token_address: meta.token_address,
            decimals: meta.decimals,
            symbol: meta.symbol.clone(),
            name: meta.name.clone(),
            native_address: normalize_address(meta.token_chain, &meta.token_address),
            coin_gecko_id: self
                .listed
                .get(&(meta.token_chain, meta.token_address))
                .cloned(),
        };
        self.db.store_token_metadata(&metadata)?;
        debug!(
            symbol = %metadata.symbol,
            token = %metadata.native_address,
            "Stored token metadata"
        );
        Ok(())
    }

    async fn transfer_record(
        &self,
        vaa: &Vaa,
        transfer: &TokenTransfer,
    ) -> Result<TokenTransferRecord> {
        let timestamp: DateTime<Utc> = Utc
            .timestamp_opt(i64::from(vaa.timestamp), 0)
            .single()
            .ok_or_else(|| eyre!("Invalid timestamp {}", vaa.timestamp))?;
        Ok(TokenTransferRecord {
            emitter_chain: vaa.emitter_chain,
            emitter_address: vaa.emitter_address,
            target_chain: vaa.target_chain,
            token_chain: transfer.origin_chain,
            token_address: transfer.origin_address,
            amount: transfer.amount.to_string(),
            notional_usd: self.notional_usd(transfer).await?,
            timestamp,
        })
    }

    /// USD value of a transfer, zero when the token has no known metadata
    /// or price.
    async fn notional_usd(&self, transfer: &TokenTransfer) -> Result<f64> {
        let key = (transfer.origin_chain, transfer.origin_address);
        let metadata = self
            .db
            .retrieve_token_metadata(transfer.origin_chain, &transfer.origin_address)?;
        let (decimals, feed) = match metadata {
            Some(metadata) => (
                metadata.decimals,
                metadata.coin_gecko_id.or_else(|| self.listed.get(&key).cloned()),
            ),
            None => return Ok(0.0),
        };
        let Some(feed) = feed else {
            return Ok(0.0);
        };
        match self.prices.usd_price(&feed).await {
            Ok(Some(price)) => Ok(notional(&transfer.amount, decimals, price)),
            Ok(None) => Ok(0.0),
            Err(err) => {
                warn!(feed, error = %err, "Failed to fetch token price");
                Ok(0.0)
            }
        }
    }
}

fn notional(amount: &U256, decimals: u8, price: f64) -> f64 {
    let units = amount.to_string().parse::<f64>().unwrap_or_default();
    let decimals = decimals.min(MAX_AMOUNT_DECIMALS);
    units / 10f64.powi(i32::from(decimals)) * price
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    use explorer_base::{CoreMetrics, NoPrices};
    use explorer_core::{Encode, Network, H160};
    use explorer_test::fixtures::{guardian_keys, guardian_set, VaaBuilder};
    use explorer_test::mocks::{MockGuardianSetSource, MockPriceSource};
    use explorer_test::test_utils::run_test_db;
    use maplit::hashmap;
    use prometheus::Registry;

    use super::*;

    const BRIDGE: u16 = 2;

    fn bridge_address() -> H256 {
        H256::repeat_byte(0xb1)
    }

    fn token() -> H256 {
        H256::from_low_u64_be(0xc0ffee)
    }

    fn transfer_payload(amount: u64, token_chain: u16, token: H256) -> Vec<u8> {
        let mut payload = vec![1];
        payload.extend(U256::from(amount).to_vec());
        payload.extend(token.to_vec());
        payload.extend(token_chain.to_vec());
        payload.extend(32u16.to_vec());
        payload.extend([0x42; 32]);
        payload
    }

    fn asset_meta_payload(token_chain: u16, token: H256, decimals: u8) -> Vec<u8> {
        let mut payload = vec![2];
        payload.extend(token.to_vec());
        payload.extend(token_chain.to_vec());
        payload.push(decimals);
        let mut symbol = [0u8; 32];
        symbol[..4].copy_from_slice(b"USDC");
        payload.extend(symbol);
        let mut name = [0u8; 32];
        name[..8].copy_from_slice(b"USD Coin");
        payload.extend(name);
        payload
    }

    async fn tracker(db: &ExplorerDB, source: MockGuardianSetSource) -> Arc<GuardianSetTracker> {
        let metrics = CoreMetrics::new("test", Registry::new()).unwrap();
        Arc::new(
            GuardianSetTracker::load(
                db.clone(),
                Network::Mainnet,
                Some(Arc::new(source)),
                metrics.guardian_set_index(),
            )
            .await
            .unwrap(),
        )
    }

    fn static_source() -> MockGuardianSetSource {
        let set = guardian_set(0, &guardian_keys(1));
        let mut source = MockGuardianSetSource::new();
        source
            .expect__current_guardian_set_index()
            .returning(|| Ok(0));
        source
            .expect__guardian_set()
            .returning(move |_| Ok(Some(set.clone())));
        source
    }

    fn bridge_vaa(sequence: u64, payload: Vec<u8>) -> Vaa {
        VaaBuilder::new(BRIDGE, bridge_address(), 4, sequence)
            .payload(payload)
            .signed_by(&guardian_keys(1))
    }

    #[tokio::test]
    async fn transfers_of_listed_tokens_are_valued() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Mainnet, db);
            let mut prices = MockPriceSource::new();
            prices
                .expect__usd_price()
                .withf(|feed| feed == "usd-coin")
                .returning(|_| Ok(Some(2.0)));
            let decoder = PayloadDecoder::new(
                db.clone(),
                hashmap! { (BRIDGE, bridge_address()) => EmitterKind::TokenBridge },
                hashmap! { (BRIDGE, token()) => "usd-coin".to_owned() },
                Arc::new(prices),
                tracker(&db, static_source()).await,
            );

            let meta = bridge_vaa(0, asset_meta_payload(BRIDGE, token(), 6));
            assert_eq!(decoder.decode(&meta).await.unwrap(), None);
            let stored = db.retrieve_token_metadata(BRIDGE, &token()).unwrap().unwrap();
            assert_eq!(stored.symbol, "USDC");
            assert_eq!(stored.name, "USD Coin");
            assert_eq!(stored.native_address, "0x0000000000000000000000000000000000c0ffee");
            assert_eq!(stored.coin_gecko_id.as_deref(), Some("usd-coin"));

            let transfer = bridge_vaa(1, transfer_payload(1_500_000, BRIDGE, token()));
            let record = decoder.decode(&transfer).await.unwrap().unwrap();
            assert_eq!(record.amount, "1500000");
            assert_eq!(record.token_chain, BRIDGE);
            assert_eq!(record.target_chain, 4);
            assert_eq!(record.timestamp.timestamp(), 1_700_000_000);
            assert!((record.notional_usd - 3.0).abs() < 1e-9);
        })
        .await
    }

    #[tokio::test]
    async fn unknown_tokens_and_emitters_are_not_valued() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Mainnet, db);
            let decoder = PayloadDecoder::new(
                db.clone(),
                hashmap! { (BRIDGE, bridge_address()) => EmitterKind::TokenBridge },
                HashMap::new(),
                Arc::new(NoPrices),
                tracker(&db, static_source()).await,
            );

            let transfer = bridge_vaa(0, transfer_payload(u64::MAX, 6, token()));
            let record = decoder.decode(&transfer).await.unwrap().unwrap();
            assert_eq!(record.amount, u64::MAX.to_string());
            assert_eq!(record.notional_usd, 0.0);

            let unregistered = VaaBuilder::new(BRIDGE, H256::repeat_byte(9), 4, 0)
                .payload(transfer_payload(1, 6, token()))
                .signed_by(&guardian_keys(1));
            assert_eq!(decoder.decode(&unregistered).await.unwrap(), None);

            // just the payload id
            assert_eq!(decoder.decode(&bridge_vaa(1, vec![1])).await.unwrap(), None);
        })
        .await
    }

    #[tokio::test]
    async fn guardian_set_upgrades_trigger_a_poll() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Mainnet, db);
            let keys = guardian_keys(2);
            let latest = Arc::new(AtomicU32::new(0));
            let polls = Arc::new(AtomicUsize::new(0));

            let mut source = MockGuardianSetSource::new();
            let (index, count) = (latest.clone(), polls.clone());
            source
                .expect__current_guardian_set_index()
                .returning(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(index.load(Ordering::SeqCst))
                });
            let set_keys = keys.clone();
            source.expect__guardian_set().returning(move |index| {
                Ok(Some(guardian_set(index, &set_keys[..=index as usize])))
            });
            let tracker = tracker(&db, source).await;
            let mut appended = tracker.subscribe();
            tokio::spawn(tracker.clone().run(Duration::from_secs(3600)));

            // the first tick polls immediately
            while polls.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            latest.store(1, Ordering::SeqCst);

            let (chain, address) = Network::Mainnet.governance_emitter();
            let mut payload = [0u8; 32].to_vec();
            payload[28..].copy_from_slice(b"Core");
            payload.push(2);
            payload.extend(0u16.to_vec());
            payload.extend(1u32.to_vec());
            payload.push(1);
            payload.extend(H160::repeat_byte(5).to_vec());
            let upgrade = VaaBuilder::new(chain, address, 0, 0)
                .payload(payload)
                .signed_by(&keys[..1]);

            let decoder = PayloadDecoder::new(
                db.clone(),
                HashMap::new(),
                HashMap::new(),
                Arc::new(NoPrices),
                tracker.clone(),
            );
            assert_eq!(decoder.decode(&upgrade).await.unwrap(), None);

            let set = tokio::time::timeout(Duration::from_secs(5), appended.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(set.index, 1);
            assert_eq!(tracker.current().index, 1);
        })
        .await
    }
}
