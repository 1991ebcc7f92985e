use chrono::NaiveDate;
use rocksdb::WriteBatch;
use tracing::instrument;

use explorer_core::{Encode, StatisticDoc, StatisticKey};

use super::{ExplorerDB, Result};

const STATISTIC: &str = "statistic_";

impl ExplorerDB {
    /// Write a set of rollups in one batch, replacing existing documents
    #[instrument(skip_all, fields(docs = docs.len()), err)]
    pub fn upsert_statistics(&self, docs: &[StatisticDoc]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        for doc in docs {
            self.batch_encodable(&mut batch, STATISTIC, doc.key.to_vec(), doc);
        }
        self.write(batch)
    }

    /// A single rollup
    pub fn retrieve_statistic(&self, key: &StatisticKey) -> Result<Option<StatisticDoc>> {
        self.retrieve_keyed_decodable(STATISTIC, key)
    }

    /// Rollups of the days in `[from, to)`, ordered by key
    pub fn statistics_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<StatisticDoc>> {
        if from >= to {
            return Ok(vec![]);
        }
        Ok(self
            .range_entries::<StatisticDoc>(STATISTIC, b"", from.to_vec(), usize::MAX)?
            .into_iter()
            .map(|(_, doc)| doc)
            .take_while(|doc| doc.key.date < to)
            .collect())
    }
}
