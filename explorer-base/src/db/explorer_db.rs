use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::WriteBatch;
use tracing::{debug, instrument, trace};

use explorer_core::{
    Decode, Emitter, Encode, GuardianSet, Heartbeat, MissingVaa, Network, Observation, StoredVaa,
    TokenMetadata, Vaa, VaaId, H160, H256,
};

use super::{DbError, TypedDB, DB};

// these keys MUST not be given multiple uses, and none may be a prefix of
// another, since collections are scanned by prefix.

const STORED_VAA: &str = "stored_vaa_";
const MAX_SEQUENCE: &str = "max_sequence_for_emitter_";
const VAA_COUNT: &str = "vaa_count_for_chain_";
const VAA_IDS_BY_TX: &str = "vaa_ids_by_tx_";
const MISSING_BY_TIME: &str = "missing_vaa_by_time_";
const MISSING_BY_SEQUENCE: &str = "missing_vaa_by_sequence_";
const OBSERVATION: &str = "observation_";
const GUARDIAN_SET: &str = "guardian_set_";
const HEARTBEAT: &str = "heartbeat_";
const TOKEN_METADATA: &str = "token_metadata_";

/// Tombstones written per batch when recording a gap
const MISSING_BATCH_SIZE: u64 = 10_000;

pub(super) type Result<T> = std::result::Result<T, DbError>;

/// DB handle for the explorer's collections on one network.
///
/// Writes to messages, gaps and observations are serialized through one
/// lock which also guards the cache of the next expected sequence of each
/// emitter.
#[derive(Debug, Clone)]
pub struct ExplorerDB {
    db: TypedDB,
    governance_emitter: (u16, H256),
    next_expected: Arc<Mutex<HashMap<Emitter, u64>>>,
    watermarks: Arc<HashMap<Emitter, u64>>,
}

impl std::ops::Deref for ExplorerDB {
    type Target = TypedDB;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

impl AsRef<DB> for ExplorerDB {
    fn as_ref(&self) -> &DB {
        self.db.as_ref()
    }
}

impl ExplorerDB {
    /// Instantiate a new `ExplorerDB` scoped to `network`
    pub fn new(network: Network, db: DB) -> Self {
        Self {
            db: TypedDB::new(network.to_string(), db),
            governance_emitter: network.governance_emitter(),
            next_expected: Default::default(),
            watermarks: Default::default(),
        }
    }

    /// Lowest sequence tracked for emitters with no stored messages
    pub fn with_watermarks(mut self, watermarks: HashMap<Emitter, u64>) -> Self {
        self.watermarks = Arc::new(
            watermarks
                .into_iter()
                .map(|(emitter, seq)| (self.canonical_emitter(emitter), seq))
                .collect(),
        );
        self
    }

    /// Whether `(chain, address)` is the governance emitter
    pub fn is_governance(&self, chain: u16, address: &H256) -> bool {
        (chain, *address) == self.governance_emitter
    }

    /// The governance emitter counts sequences regardless of target chain.
    pub fn canonical_emitter(&self, emitter: Emitter) -> Emitter {
        if self.is_governance(emitter.chain, &emitter.address) {
            Emitter {
                target_chain: 0,
                ..emitter
            }
        } else {
            emitter
        }
    }

    fn canonical_key(&self, id: &VaaId) -> Vec<u8> {
        self.canonical_emitter(id.emitter())
            .vaa_id(id.sequence)
            .to_vec()
    }

    fn watermark(&self, emitter: &Emitter) -> u64 {
        self.watermarks.get(emitter).copied().unwrap_or_default()
    }

    /// Persist a verified message. Idempotent; returns `true` when the
    /// message was not stored before.
    ///
    /// Sequences skipped between the highest stored one and this one are
    /// recorded as missing, and the tombstone of this sequence is removed.
    #[instrument(skip(self, vaa, bytes), fields(id = %vaa.id()), err)]
    pub fn upsert_vaa(&self, vaa: &Vaa, bytes: &[u8]) -> Result<bool> {
        let id = vaa.id();
        let emitter = self.canonical_emitter(id.emitter());
        let sequence = id.sequence;
        let key = emitter.vaa_id(sequence).to_vec();

        let mut next_expected = self.next_expected.lock();
        let max_sequence = self.retrieve_max_sequence(&emitter)?;
        let next = match next_expected.get(&emitter) {
            Some(next) => *next,
            None => max_sequence
                .map(|max| max.saturating_add(1))
                .unwrap_or_else(|| self.watermark(&emitter)),
        };

        if sequence >= next {
            self.store_missing_range(&emitter, next..sequence, Utc::now())?;
            next_expected.insert(emitter, sequence.saturating_add(1));
        } else {
            next_expected.insert(emitter, next);
        }

        self.remove_missing_sequence(&emitter, sequence)?;
        if max_sequence.map_or(true, |max| sequence > max) {
            self.store_keyed_encodable(MAX_SEQUENCE, &emitter, &sequence)?;
        }

        match self.retrieve_decodable::<StoredVaa>(STORED_VAA, &key)? {
            Some(mut stored) => {
                if stored.bytes != bytes && Self::is_better_copy(&stored.bytes, vaa) {
                    debug!(%id, "Replacing stored signatures with a larger set");
                    stored.bytes = bytes.to_vec();
                    self.store_encodable(STORED_VAA, &key, &stored)?;
                }
                Ok(false)
            }
            None => {
                let tx_id = self.observed_tx_id(&id)?;
                let stored = StoredVaa {
                    bytes: bytes.to_vec(),
                    tx_id: tx_id.clone(),
                    indexed_at: Utc::now(),
                };
                self.store_encodable(STORED_VAA, &key, &stored)?;
                if let Some(tx_id) = tx_id {
                    self.index_vaa_tx(&tx_id, &id)?;
                }
                self.increment_vaa_count(id.emitter_chain)?;
                debug!(%id, "Stored new VAA");
                Ok(true)
            }
        }
    }

    /// Same digest, more signatures.
    fn is_better_copy(stored: &[u8], candidate: &Vaa) -> bool {
        match Vaa::parse(stored) {
            Ok(existing) => {
                existing.digest() == candidate.digest()
                    && candidate.signatures.len() > existing.signatures.len()
            }
            Err(_) => true,
        }
    }

    /// Retrieve a stored message by id
    pub fn retrieve_vaa(&self, id: &VaaId) -> Result<Option<StoredVaa>> {
        self.retrieve_decodable(STORED_VAA, self.canonical_key(id))
    }

    /// Whether a message is stored
    pub fn contains_vaa(&self, id: &VaaId) -> Result<bool> {
        Ok(self.retrieve_vaa(id)?.is_some())
    }

    /// Sequences stored for an emitter, ascending
    pub fn stored_sequences(&self, emitter: &Emitter) -> Result<Vec<u64>> {
        let emitter = self.canonical_emitter(*emitter);
        self.prefix_entries::<StoredVaa>(STORED_VAA, emitter.to_vec())?
            .into_iter()
            .map(|(suffix, _)| Ok(u64::read_from(&mut suffix.as_slice())?))
            .collect()
    }

    /// Highest stored sequence of an emitter
    pub fn retrieve_max_sequence(&self, emitter: &Emitter) -> Result<Option<u64>> {
        self.retrieve_keyed_decodable(MAX_SEQUENCE, &self.canonical_emitter(*emitter))
    }

    /// Number of messages stored for an emitter chain
    pub fn vaa_count(&self, chain: u16) -> Result<u64> {
        Ok(self
            .retrieve_keyed_decodable(VAA_COUNT, &chain)?
            .unwrap_or_default())
    }

    fn increment_vaa_count(&self, chain: u16) -> Result<()> {
        let count = self.vaa_count(chain)?;
        self.store_keyed_encodable(VAA_COUNT, &chain, &(count + 1))
    }

    fn index_vaa_tx(&self, tx_id: &str, id: &VaaId) -> Result<()> {
        let mut key = tx_id.to_owned().to_vec();
        key.extend(self.canonical_key(id));
        self.store_encodable(VAA_IDS_BY_TX, key, id)
    }

    /// Ids of the messages published by a transaction
    pub fn vaa_ids_by_tx(&self, tx_id: &str) -> Result<Vec<VaaId>> {
        Ok(self
            .prefix_entries::<VaaId>(VAA_IDS_BY_TX, tx_id.to_owned().to_vec())?
            .into_iter()
            .map(|(_, id)| id)
            .collect())
    }

    /// Record every sequence of `range` as missing, in bounded batches.
    /// Sequences that already have a tombstone keep it.
    fn store_missing_range(
        &self,
        emitter: &Emitter,
        range: Range<u64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if range.end - range.start > MISSING_BATCH_SIZE {
            debug!(%emitter, from = range.start, to = range.end, "Recording a wide gap");
        }
        let mut start = range.start;
        while start < range.end {
            let end = range.end.min(start.saturating_add(MISSING_BATCH_SIZE));
            let mut batch = WriteBatch::default();
            for sequence in start..end {
                let seq_key = emitter.vaa_id(sequence).to_vec();
                if self
                    .retrieve_decodable::<MissingVaa>(MISSING_BY_SEQUENCE, &seq_key)?
                    .is_some()
                {
                    continue;
                }
                trace!(%emitter, sequence, "Marking sequence missing");
                let missing = MissingVaa {
                    id: emitter.vaa_id(sequence),
                    indexed_at: now,
                };
                self.batch_encodable(
                    &mut batch,
                    MISSING_BY_TIME,
                    Self::missing_time_key(&missing),
                    &missing,
                );
                self.batch_encodable(&mut batch, MISSING_BY_SEQUENCE, &seq_key, &missing);
            }
            self.write(batch)?;
            start = end;
        }
        Ok(())
    }

    fn missing_time_key(missing: &MissingVaa) -> Vec<u8> {
        let mut key = missing.id.emitter().to_vec();
        key.extend((missing.indexed_at.timestamp_millis().max(0) as u64).to_vec());
        key.extend(missing.id.sequence.to_vec());
        key
    }

    fn remove_missing_sequence(&self, emitter: &Emitter, sequence: u64) -> Result<()> {
        let seq_key = emitter.vaa_id(sequence).to_vec();
        if let Some(missing) = self.retrieve_decodable::<MissingVaa>(MISSING_BY_SEQUENCE, &seq_key)?
        {
            self.delete(MISSING_BY_TIME, Self::missing_time_key(&missing))?;
            self.delete(MISSING_BY_SEQUENCE, &seq_key)?;
        }
        Ok(())
    }

    /// Up to `limit` missing sequences of an emitter, oldest detection first
    pub fn find_oldest_missing(&self, emitter: &Emitter, limit: usize) -> Result<Vec<u64>> {
        let emitter = self.canonical_emitter(*emitter);
        Ok(self
            .range_entries::<MissingVaa>(MISSING_BY_TIME, emitter.to_vec(), b"", limit)?
            .into_iter()
            .map(|(_, missing)| missing.id.sequence)
            .collect())
    }

    /// Remove sequences from the missing set. Idempotent.
    #[instrument(skip(self), err)]
    pub fn remove_missing(&self, emitter: &Emitter, sequences: &[u64]) -> Result<()> {
        let emitter = self.canonical_emitter(*emitter);
        let _guard = self.next_expected.lock();
        for sequence in sequences {
            self.remove_missing_sequence(&emitter, *sequence)?;
        }
        Ok(())
    }

    /// Index a guardian's observation, linking its transaction to the
    /// message if that is already stored.
    pub fn store_observation(&self, observation: &Observation) -> Result<()> {
        let id = observation.message_id;
        let mut key = id.to_vec();
        key.extend(observation.guardian_address.to_vec());

        let _guard = self.next_expected.lock();
        self.store_encodable(OBSERVATION, key, observation)?;

        let vaa_key = self.canonical_key(&id);
        if let Some(mut stored) = self.retrieve_decodable::<StoredVaa>(STORED_VAA, &vaa_key)? {
            if stored.tx_id.is_none() && !observation.tx_hash.is_empty() {
                stored.tx_id = Some(observation.tx_hash.clone());
                self.store_encodable(STORED_VAA, &vaa_key, &stored)?;
                self.index_vaa_tx(&observation.tx_hash, &id)?;
            }
        }
        Ok(())
    }

    /// Observations of a message
    pub fn observations(&self, id: &VaaId) -> Result<Vec<Observation>> {
        Ok(self
            .prefix_entries(OBSERVATION, id.to_vec())?
            .into_iter()
            .map(|(_, observation)| observation)
            .collect())
    }

    fn observed_tx_id(&self, id: &VaaId) -> Result<Option<String>> {
        Ok(self
            .observations(id)?
            .into_iter()
            .map(|observation| observation.tx_hash)
            .find(|tx| !tx.is_empty()))
    }

    /// Persist a guardian set
    pub fn store_guardian_set(&self, set: &GuardianSet) -> Result<()> {
        self.store_keyed_encodable(GUARDIAN_SET, &set.index, set)
    }

    /// All persisted guardian sets ordered by index
    pub fn guardian_sets(&self) -> Result<Vec<GuardianSet>> {
        Ok(self
            .prefix_entries(GUARDIAN_SET, b"")?
            .into_iter()
            .map(|(_, set)| set)
            .collect())
    }

    /// Keep the latest heartbeat of a guardian
    pub fn store_heartbeat(&self, heartbeat: &Heartbeat) -> Result<()> {
        if let Some(existing) = self.retrieve_heartbeat(&heartbeat.guardian_address)? {
            if existing.boot_timestamp == heartbeat.boot_timestamp
                && existing.counter >= heartbeat.counter
            {
                return Ok(());
            }
        }
        self.store_keyed_encodable(HEARTBEAT, &heartbeat.guardian_address, heartbeat)
    }

    /// Latest heartbeat of a guardian
    pub fn retrieve_heartbeat(&self, guardian: &H160) -> Result<Option<Heartbeat>> {
        self.retrieve_keyed_decodable(HEARTBEAT, guardian)
    }

    /// Upsert token metadata, keeping a known price feed id
    pub fn store_token_metadata(&self, metadata: &TokenMetadata) -> Result<()> {
        let mut key = metadata.token_chain.to_vec();
        key.extend(metadata.token_address.to_vec());
        let mut metadata = metadata.clone();
        if metadata.coin_gecko_id.is_none() {
            metadata.coin_gecko_id = self
                .retrieve_token_metadata(metadata.token_chain, &metadata.token_address)?
                .and_then(|existing| existing.coin_gecko_id);
        }
        self.store_encodable(TOKEN_METADATA, key, &metadata)
    }

    /// Metadata of a token
    pub fn retrieve_token_metadata(
        &self,
        token_chain: u16,
        token_address: &H256,
    ) -> Result<Option<TokenMetadata>> {
        let mut key = token_chain.to_vec();
        key.extend(token_address.to_vec());
        self.retrieve_decodable(TOKEN_METADATA, key)
    }
}

#[cfg(test)]
mod test {
    use explorer_core::{GuardianSignature, VaaBody};

    use super::*;
    use crate::db::test_utils::run_test_db;

    fn emitter() -> Emitter {
        Emitter {
            chain: 2,
            address: H256::repeat_byte(7),
            target_chain: 255,
        }
    }

    fn vaa_for(emitter: &Emitter, sequence: u64, signatures: usize) -> Vaa {
        Vaa {
            version: 1,
            guardian_set_index: 0,
            signatures: (0..signatures as u8)
                .map(|index| GuardianSignature {
                    index,
                    signature: [index; 65],
                })
                .collect(),
            body: VaaBody {
                timestamp: 1,
                nonce: 0,
                emitter_chain: emitter.chain,
                target_chain: emitter.target_chain,
                emitter_address: emitter.address,
                sequence,
                consistency_level: 1,
                payload: vec![],
            },
        }
    }

    fn upsert(db: &ExplorerDB, emitter: &Emitter, sequence: u64) -> bool {
        let vaa = vaa_for(emitter, sequence, 1);
        db.upsert_vaa(&vaa, &vaa.to_vec()).unwrap()
    }

    fn missing(db: &ExplorerDB, emitter: &Emitter) -> Vec<u64> {
        let mut missing = db.find_oldest_missing(emitter, usize::MAX).unwrap();
        missing.sort();
        missing
    }

    #[tokio::test]
    async fn gaps_are_created_and_filled() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Devnet, db);
            let e = emitter();
            for seq in [0, 1, 4] {
                upsert(&db, &e, seq);
            }
            assert_eq!(missing(&db, &e), vec![2, 3]);

            upsert(&db, &e, 2);
            assert_eq!(missing(&db, &e), vec![3]);

            upsert(&db, &e, 3);
            assert!(missing(&db, &e).is_empty());
            assert_eq!(db.stored_sequences(&e).unwrap(), vec![0, 1, 2, 3, 4]);
        })
        .await;
    }

    #[tokio::test]
    async fn every_sequence_is_stored_or_missing_but_not_both() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Devnet, db);
            let e = emitter();
            for seq in [3, 9, 1, 6, 12, 0] {
                upsert(&db, &e, seq);
            }
            let stored = db.stored_sequences(&e).unwrap();
            let missing = missing(&db, &e);
            for seq in 0..=12u64 {
                assert!(
                    stored.contains(&seq) ^ missing.contains(&seq),
                    "sequence {seq} stored={stored:?} missing={missing:?}"
                );
            }
        })
        .await;
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Devnet, db);
            let e = emitter();
            assert!(upsert(&db, &e, 0));
            assert!(!upsert(&db, &e, 0));
            assert_eq!(db.stored_sequences(&e).unwrap(), vec![0]);
            assert_eq!(db.vaa_count(e.chain).unwrap(), 1);
        })
        .await;
    }

    #[tokio::test]
    async fn gap_detection_survives_cache_loss() {
        run_test_db(|db| async move {
            let e = emitter();
            {
                let first = ExplorerDB::new(Network::Devnet, db.clone());
                upsert(&first, &e, 0);
                upsert(&first, &e, 1);
            }
            let restarted = ExplorerDB::new(Network::Devnet, db);
            upsert(&restarted, &e, 3);
            assert_eq!(missing(&restarted, &e), vec![2]);
        })
        .await;
    }

    #[tokio::test]
    async fn governance_ignores_target_chain() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Devnet, db);
            let (chain, address) = Network::Devnet.governance_emitter();
            let to_eth = Emitter {
                chain,
                address,
                target_chain: 2,
            };
            let to_all = Emitter {
                target_chain: 0,
                ..to_eth
            };
            upsert(&db, &to_eth, 0);
            assert!(!upsert(&db, &to_all, 0));
            upsert(&db, &to_all, 2);
            assert_eq!(missing(&db, &to_eth), vec![1]);
            assert_eq!(db.stored_sequences(&to_eth).unwrap(), vec![0, 2]);
        })
        .await;
    }

    #[tokio::test]
    async fn oldest_missing_respects_limit_and_removal() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Devnet, db);
            let e = emitter();
            upsert(&db, &e, 0);
            upsert(&db, &e, 5);
            assert_eq!(db.find_oldest_missing(&e, 2).unwrap().len(), 2);

            db.remove_missing(&e, &[1, 2]).unwrap();
            db.remove_missing(&e, &[1, 2]).unwrap();
            assert_eq!(missing(&db, &e), vec![3, 4]);
        })
        .await;
    }

    #[tokio::test]
    async fn wide_gaps_are_recorded_in_full() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Devnet, db);
            let e = emitter();
            let far = 2 * MISSING_BATCH_SIZE + 3;
            upsert(&db, &e, 0);
            upsert(&db, &e, far);

            assert_eq!(db.find_oldest_missing(&e, 3).unwrap(), vec![1, 2, 3]);
            let missing = missing(&db, &e);
            assert_eq!(missing.len() as u64, far - 1);
            assert_eq!(missing.last(), Some(&(far - 1)));
            assert!(missing.contains(&MISSING_BATCH_SIZE));

            upsert(&db, &e, MISSING_BATCH_SIZE);
            assert_eq!(missing(&db, &e).len() as u64, far - 2);
        })
        .await;
    }

    #[tokio::test]
    async fn max_sequence_is_handled() {
        run_test_db(|db| async move {
            let e = emitter();
            let db = ExplorerDB::new(Network::Devnet, db)
                .with_watermarks(HashMap::from([(e, u64::MAX - 2)]));
            upsert(&db, &e, u64::MAX);
            assert_eq!(missing(&db, &e), vec![u64::MAX - 2, u64::MAX - 1]);
            assert!(!upsert(&db, &e, u64::MAX));
            assert_eq!(db.retrieve_max_sequence(&e).unwrap(), Some(u64::MAX));
        })
        .await;
    }

    #[tokio::test]
    async fn larger_signature_sets_replace_smaller_ones() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Devnet, db);
            let e = emitter();
            let small = vaa_for(&e, 0, 1);
            let large = vaa_for(&e, 0, 3);
            db.upsert_vaa(&small, &small.to_vec()).unwrap();
            db.upsert_vaa(&large, &large.to_vec()).unwrap();
            db.upsert_vaa(&small, &small.to_vec()).unwrap();

            let stored = db.retrieve_vaa(&e.vaa_id(0)).unwrap().unwrap();
            assert_eq!(Vaa::parse(&stored.bytes).unwrap().signatures.len(), 3);
        })
        .await;
    }

    #[tokio::test]
    async fn observations_link_transactions_in_either_order() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Devnet, db);
            let e = emitter();
            let observation = |sequence: u64, tx: &str| Observation {
                message_id: e.vaa_id(sequence),
                guardian_address: H160::repeat_byte(1),
                hash: H256::zero(),
                signature: vec![0; 65],
                tx_hash: tx.to_owned(),
                indexed_at: Utc::now(),
            };

            db.store_observation(&observation(0, "0xaa")).unwrap();
            upsert(&db, &e, 0);
            upsert(&db, &e, 1);
            db.store_observation(&observation(1, "0xbb")).unwrap();

            let first = db.retrieve_vaa(&e.vaa_id(0)).unwrap().unwrap();
            let second = db.retrieve_vaa(&e.vaa_id(1)).unwrap().unwrap();
            assert_eq!(first.tx_id.as_deref(), Some("0xaa"));
            assert_eq!(second.tx_id.as_deref(), Some("0xbb"));
            assert_eq!(db.vaa_ids_by_tx("0xbb").unwrap(), vec![e.vaa_id(1)]);
        })
        .await;
    }

    #[tokio::test]
    async fn guardian_sets_come_back_in_index_order() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Devnet, db);
            for index in [2, 0, 1] {
                let keys = vec![H160::repeat_byte(index as u8)];
                db.store_guardian_set(&GuardianSet::new(index, keys)).unwrap();
            }
            let indices: Vec<u32> = db.guardian_sets().unwrap().iter().map(|s| s.index).collect();
            assert_eq!(indices, vec![0, 1, 2]);
        })
        .await;
    }
}
