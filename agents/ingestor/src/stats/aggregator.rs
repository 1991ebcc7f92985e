use std::collections::{HashMap, HashSet};
use std::mem;
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, Utc};
use num_bigint::BigUint;
use prometheus::IntCounterVec;
use tracing::{debug, info, warn};

use explorer_base::db::ExplorerDB;
use explorer_core::{StatisticDoc, StatisticKey, TokenTransferRecord};

use crate::error::AggregatorError;

/// Rolls token transfers up into per day statistics. Owned by a single
/// task, so writes for a day are never concurrent.
#[derive(Debug)]
pub struct StatsAggregator {
    db: ExplorerDB,
    day: NaiveDate,
    stats: HashMap<StatisticKey, StatisticDoc>,
    dirty: HashSet<StatisticKey>,
    buffer: Vec<TokenTransferRecord>,
    invalid_amounts: IntCounterVec,
}

impl StatsAggregator {
    /// Start aggregating the day of `now`, resuming from its stored rows
    pub fn load(
        db: ExplorerDB,
        now: DateTime<Utc>,
        invalid_amounts: IntCounterVec,
    ) -> Result<Self, AggregatorError> {
        let mut aggregator = Self {
            db,
            day: now.date_naive(),
            stats: HashMap::new(),
            dirty: HashSet::new(),
            buffer: vec![],
            invalid_amounts,
        };
        aggregator.reload_day()?;
        Ok(aggregator)
    }

    /// The day currently aggregated in memory
    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Buffer a transfer until the next tick
    pub fn push(&mut self, record: TokenTransferRecord) {
        self.buffer.push(record);
    }

    fn reload_day(&mut self) -> Result<(), AggregatorError> {
        let next = self.day + Days::new(1);
        self.stats = self
            .db
            .statistics_between(self.day, next)?
            .into_iter()
            .map(|doc| (doc.key, doc))
            .collect();
        self.dirty.clear();
        Ok(())
    }

    /// Flush buffered transfers as of `now`, rolling over to a new day first
    /// if `now` has crossed midnight UTC.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<(), AggregatorError> {
        let today = now.date_naive();
        if today != self.day {
            self.flush()?;
            info!(completed = %self.day, day = %today, "Statistics day rollover");
            self.day = today;
            self.reload_day()?;
        }

        let (current, historic): (Vec<_>, Vec<_>) = mem::take(&mut self.buffer)
            .into_iter()
            .partition(|record| record.timestamp.date_naive() == self.day);

        for record in &current {
            let key = record.statistic_key();
            let mut doc = self
                .stats
                .get(&key)
                .cloned()
                .unwrap_or_else(|| empty_doc(key, now));
            if self.skip_invalid(accumulate(&mut doc, record, now)) {
                continue;
            }
            self.stats.insert(key, doc);
            self.dirty.insert(key);
        }
        self.flush_at(now)?;

        let mut historic = historic.into_iter();
        while let Some(record) = historic.next() {
            if let Err(err) = self.apply_historic(&record, now) {
                // retried on the next tick
                self.buffer.push(record);
                self.buffer.extend(historic);
                return Err(err);
            }
        }
        Ok(())
    }

    fn skip_invalid(&self, result: Result<(), AggregatorError>) -> bool {
        match result {
            Ok(()) => false,
            Err(err) => {
                warn!(error = %err, "Skipping transfer");
                self.invalid_amounts.with_label_values(&[]).inc();
                true
            }
        }
    }

    fn apply_historic(
        &self,
        record: &TokenTransferRecord,
        now: DateTime<Utc>,
    ) -> Result<(), AggregatorError> {
        let key = record.statistic_key();
        let mut doc = self
            .db
            .retrieve_statistic(&key)?
            .unwrap_or_else(|| empty_doc(key, now));
        if self.skip_invalid(accumulate(&mut doc, record, now)) {
            return Ok(());
        }
        debug!(date = %key.date, "Updated historic statistic");
        self.db.upsert_statistics(&[doc])?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), AggregatorError> {
        self.flush_at(Utc::now())
    }

    fn flush_at(&mut self, now: DateTime<Utc>) -> Result<(), AggregatorError> {
        if self.dirty.is_empty() {
            return Ok(());
        }
        let docs: Vec<StatisticDoc> = self
            .dirty
            .iter()
            .filter_map(|key| self.stats.get(key))
            .cloned()
            .map(|mut doc| {
                doc.updated_at = now;
                doc
            })
            .collect();
        self.db.upsert_statistics(&docs)?;
        debug!(docs = docs.len(), day = %self.day, "Flushed statistics");
        self.dirty.clear();
        Ok(())
    }
}

fn empty_doc(key: StatisticKey, now: DateTime<Utc>) -> StatisticDoc {
    StatisticDoc {
        key,
        total_vaa_count: 0,
        total_transfer_amount: "0".to_owned(),
        total_notional_usd: 0.0,
        updated_at: now,
    }
}

fn accumulate(
    doc: &mut StatisticDoc,
    record: &TokenTransferRecord,
    now: DateTime<Utc>,
) -> Result<(), AggregatorError> {
    let amount = BigUint::from_str(&record.amount)
        .map_err(|_| AggregatorError::InvalidAmount(record.amount.clone()))?;
    let total = BigUint::from_str(&doc.total_transfer_amount)
        .map_err(|_| AggregatorError::InvalidAmount(doc.total_transfer_amount.clone()))?;
    doc.total_transfer_amount = (total + amount).to_string();
    doc.total_vaa_count += 1;
    doc.total_notional_usd += record.notional_usd;
    doc.updated_at = now;
    Ok(())
}
