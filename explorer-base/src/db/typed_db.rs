use derive_new::new;
use rocksdb::WriteBatch;

use explorer_core::{Decode, Encode};

use crate::db::{DbError, DB};

type Result<T> = std::result::Result<T, DbError>;

/// DB handle for storing data tied to a specific network.
///
/// Key structure: ```<network>_<collection_prefix><key>```
#[derive(Debug, Clone, new)]
pub struct TypedDB {
    entity: String,
    db: DB,
}

impl AsRef<DB> for TypedDB {
    fn as_ref(&self) -> &DB {
        &self.db
    }
}

impl TypedDB {
    /// `<entity>_<prefix>`
    pub fn full_prefix(&self, prefix: impl AsRef<[u8]>) -> Vec<u8> {
        let mut full_prefix = vec![];
        full_prefix.extend(self.entity.as_bytes());
        full_prefix.extend("_".as_bytes());
        full_prefix.extend(prefix.as_ref());
        full_prefix
    }

    /// `<entity>_<prefix><key>`
    pub fn full_key(&self, prefix: impl AsRef<[u8]>, key: impl AsRef<[u8]>) -> Vec<u8> {
        let mut full_key = self.full_prefix(prefix);
        full_key.extend(key.as_ref());
        full_key
    }

    /// Store encodable value
    pub fn store_encodable<V: Encode>(
        &self,
        prefix: impl AsRef<[u8]>,
        key: impl AsRef<[u8]>,
        value: &V,
    ) -> Result<()> {
        self.db.store_encodable(self.full_prefix(prefix), key, value)
    }

    /// Retrieve decodable value
    pub fn retrieve_decodable<V: Decode>(
        &self,
        prefix: impl AsRef<[u8]>,
        key: impl AsRef<[u8]>,
    ) -> Result<Option<V>> {
        self.db.retrieve_decodable(self.full_prefix(prefix), key)
    }

    /// Store encodable kv pair
    pub fn store_keyed_encodable<K: Encode, V: Encode>(
        &self,
        prefix: impl AsRef<[u8]>,
        key: &K,
        value: &V,
    ) -> Result<()> {
        self.store_encodable(prefix, key.to_vec(), value)
    }

    /// Retrieve decodable value given encodable key
    pub fn retrieve_keyed_decodable<K: Encode, V: Decode>(
        &self,
        prefix: impl AsRef<[u8]>,
        key: &K,
    ) -> Result<Option<V>> {
        self.retrieve_decodable(prefix, key.to_vec())
    }

    /// Delete a key
    pub fn delete(&self, prefix: impl AsRef<[u8]>, key: impl AsRef<[u8]>) -> Result<()> {
        self.db.delete(&self.full_key(prefix, key))
    }

    /// Decode every value stored under `prefix ‖ sub_prefix`, returning the
    /// remainder of each key with it
    pub fn prefix_entries<V: Decode>(
        &self,
        prefix: impl AsRef<[u8]>,
        sub_prefix: impl AsRef<[u8]>,
    ) -> Result<Vec<(Vec<u8>, V)>> {
        self.db.prefix_entries(&self.full_key(prefix, sub_prefix))
    }

    /// Up to `limit` values under `prefix ‖ sub_prefix` whose key suffix is
    /// at least `from`
    pub fn range_entries<V: Decode>(
        &self,
        prefix: impl AsRef<[u8]>,
        sub_prefix: impl AsRef<[u8]>,
        from: impl AsRef<[u8]>,
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, V)>> {
        let scope = self.full_key(prefix, sub_prefix);
        let mut start = scope.clone();
        start.extend(from.as_ref());
        self.db.range_entries(&scope, &start, limit)
    }

    /// Add an encodable value to a write batch
    pub fn batch_encodable<V: Encode>(
        &self,
        batch: &mut WriteBatch,
        prefix: impl AsRef<[u8]>,
        key: impl AsRef<[u8]>,
        value: &V,
    ) {
        batch.put(self.full_key(prefix, key), value.to_vec());
    }

    /// Apply a write batch
    pub fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db.write(batch)
    }
}
