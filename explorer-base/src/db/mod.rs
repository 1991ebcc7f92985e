use std::path::PathBuf;
use std::{io, path::Path, sync::Arc};

use explorer_core::{Decode, Encode, ExplorerProtocolError};
use rocksdb::{Direction, ErrorKind, IteratorMode, Options, WriteBatch, DB as Rocks};
use tracing::info;

pub use explorer_db::*;
pub use typed_db::*;

/// Messages, gaps, observations and the guardian network
mod explorer_db;
/// Per day transfer rollups
mod statistics;
/// Watcher output
mod transactions;
/// Type-specific db operations
mod typed_db;

/// Database test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[derive(Debug, Clone)]
/// A KV Store
pub struct DB(Arc<Rocks>);

impl From<Rocks> for DB {
    fn from(rocks: Rocks) -> Self {
        Self(Arc::new(rocks))
    }
}

/// DB Error type
#[derive(thiserror::Error, Debug)]
pub enum DbError {
    /// Rocks DB Error
    #[error("{0}")]
    RockError(rocksdb::Error),
    /// The storage backend became unavailable
    #[error("Database connection lost: {0}")]
    ConnectionLost(rocksdb::Error),
    #[error("Failed to open {path}, canonicalized as {canonicalized}: {source}")]
    /// Error opening the database
    OpeningError {
        /// Rocksdb error during opening
        #[source]
        source: rocksdb::Error,
        /// Raw database path provided
        path: PathBuf,
        /// Parsed path used
        canonicalized: PathBuf,
    },
    /// Could not parse the provided database path string
    #[error("Invalid database path supplied {1:?}; {0}")]
    InvalidDbPath(#[source] io::Error, String),
    /// A stored value did not decode
    #[error("{0}")]
    ProtocolError(#[from] ExplorerProtocolError),
}

impl From<rocksdb::Error> for DbError {
    fn from(err: rocksdb::Error) -> Self {
        match err.kind() {
            ErrorKind::IOError | ErrorKind::ShutdownInProgress => DbError::ConnectionLost(err),
            _ => DbError::RockError(err),
        }
    }
}

type Result<T> = std::result::Result<T, DbError>;

impl DB {
    /// Opens db at `db_path` and creates if missing
    #[tracing::instrument(err)]
    pub fn from_path(db_path: &Path) -> Result<DB> {
        let path = {
            let mut path = db_path
                .parent()
                .unwrap_or(Path::new("."))
                .canonicalize()
                .map_err(|e| DbError::InvalidDbPath(e, db_path.to_string_lossy().into()))?;
            if let Some(file_name) = db_path.file_name() {
                path.push(file_name);
            }
            path
        };

        if path.is_dir() {
            info!(path=%path.to_string_lossy(), "Opening existing db")
        } else {
            info!(path=%path.to_string_lossy(), "Creating db")
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);

        Rocks::open(&opts, &path)
            .map_err(|e| DbError::OpeningError {
                source: e,
                path: db_path.into(),
                canonicalized: path,
            })
            .map(Into::into)
    }

    /// Store a value in the DB
    pub fn store(&self, key: &[u8], value: &[u8]) -> Result<()> {
        Ok(self.0.put(key, value)?)
    }

    /// Retrieve a value from the DB
    pub fn retrieve(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.0.get(key)?)
    }

    /// Delete a key; deleting a missing key is not an error
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        Ok(self.0.delete(key)?)
    }

    /// Atomically apply a batch of writes
    pub fn write(&self, batch: WriteBatch) -> Result<()> {
        Ok(self.0.write(batch)?)
    }

    /// Store an encodable value under `prefix ‖ key`
    pub fn store_encodable<V: Encode>(
        &self,
        prefix: impl AsRef<[u8]>,
        key: impl AsRef<[u8]>,
        value: &V,
    ) -> Result<()> {
        self.store(&prefixed(prefix, key), &value.to_vec())
    }

    /// Retrieve a decodable value stored under `prefix ‖ key`
    pub fn retrieve_decodable<V: Decode>(
        &self,
        prefix: impl AsRef<[u8]>,
        key: impl AsRef<[u8]>,
    ) -> Result<Option<V>> {
        self.retrieve(&prefixed(prefix, key))?
            .map(|bytes| V::read_from(&mut bytes.as_slice()))
            .transpose()
            .map_err(Into::into)
    }

    /// Decode every `(key suffix, value)` under `prefix`, in key order
    pub fn prefix_entries<V: Decode>(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, V)>> {
        self.range_entries(prefix, prefix, usize::MAX)
    }

    /// Decode up to `limit` entries under `prefix` starting at key `from`
    /// (which must itself start with `prefix`), in key order
    pub fn range_entries<V: Decode>(
        &self,
        prefix: &[u8],
        from: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, V)>> {
        let mut entries = vec![];
        for item in self.0.iterator(IteratorMode::From(from, Direction::Forward)) {
            if entries.len() >= limit {
                break;
            }
            let (key, value) = item?;
            let Some(suffix) = key.strip_prefix(prefix) else {
                break;
            };
            entries.push((suffix.to_vec(), V::read_from(&mut &value[..])?));
        }
        Ok(entries)
    }
}

/// Concatenate a prefix and a key
pub(crate) fn prefixed(prefix: impl AsRef<[u8]>, key: impl AsRef<[u8]>) -> Vec<u8> {
    let mut full = prefix.as_ref().to_vec();
    full.extend_from_slice(key.as_ref());
    full
}
