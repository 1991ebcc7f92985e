use std::collections::HashMap;
use std::hash::Hash;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use num_bigint::BigInt;
use parking_lot::Mutex;
use tracing::{debug, warn};

use explorer_base::db::{DbError, ExplorerDB};
use explorer_core::{StatisticDoc, H256};

/// `(day, emitter chain, emitter address)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessagesKey {
    /// UTC day
    pub date: NaiveDate,
    /// Emitter chain
    pub emitter_chain: u16,
    /// Emitter address
    pub emitter_address: H256,
}

/// `(emitter chain, target chain, token chain, token address)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotionalKey {
    /// Source chain
    pub emitter_chain: u16,
    /// Destination chain
    pub target_chain: u16,
    /// Native chain of the token
    pub token_chain: u16,
    /// Native address of the token
    pub token_address: H256,
}

/// `(day, target chain, token chain, token address)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotionalToKey {
    /// UTC day
    pub date: NaiveDate,
    /// Destination chain
    pub target_chain: u16,
    /// Native chain of the token
    pub token_chain: u16,
    /// Native address of the token
    pub token_address: H256,
}

/// `(token chain, token address)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenKey {
    /// Native chain of the token
    pub token_chain: u16,
    /// Native address of the token
    pub token_address: H256,
}

type Fold<K, V> = fn(&mut HashMap<K, V>, &StatisticDoc);

/// A summary of every rollup before `date`.
#[derive(Debug)]
struct Summary<K, V> {
    date: NaiveDate,
    values: HashMap<K, V>,
    fold: Fold<K, V>,
}

impl<K, V> Summary<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    fn new(date: NaiveDate, fold: Fold<K, V>) -> Self {
        Self {
            date,
            values: HashMap::new(),
            fold,
        }
    }

    fn fold_all(&self, values: &mut HashMap<K, V>, docs: &[StatisticDoc]) {
        for doc in docs {
            (self.fold)(values, doc);
        }
    }

    /// Advance the summary to the start of `today`
    fn refresh(&mut self, db: &ExplorerDB, today: NaiveDate) -> Result<(), DbError> {
        if today <= self.date {
            return Ok(());
        }
        let docs = db.statistics_between(self.date, today)?;
        let mut values = std::mem::take(&mut self.values);
        self.fold_all(&mut values, &docs);
        self.values = values;
        self.date = today;
        Ok(())
    }

    /// The summary with `today`'s live rows on top
    fn snapshot(&self, today_rows: &[StatisticDoc]) -> HashMap<K, V> {
        let mut values = self.values.clone();
        self.fold_all(&mut values, today_rows);
        values
    }
}

/// Read side of the statistics: four summaries over the last `cache_days`
/// days, each behind its own lock and advanced lazily on read.
#[derive(Debug)]
pub struct StatsProjection {
    db: ExplorerDB,
    cached: bool,
    since: NaiveDate,
    total_messages: Mutex<Summary<MessagesKey, u64>>,
    total_notional_transferred: Mutex<Summary<NotionalKey, f64>>,
    total_notional_transferred_to: Mutex<Summary<NotionalToKey, f64>>,
    tvl: Mutex<Summary<TokenKey, BigInt>>,
}

impl StatsProjection {
    /// Build the projection as of `today`. With `cached` unset every read is
    /// computed from the store.
    pub fn load(
        db: ExplorerDB,
        today: NaiveDate,
        cache_days: u64,
        cached: bool,
    ) -> Result<Self, DbError> {
        let since = today - Days::new(cache_days);
        let projection = Self {
            db,
            cached,
            since,
            total_messages: Mutex::new(Summary::new(since, fold_messages)),
            total_notional_transferred: Mutex::new(Summary::new(since, fold_notional)),
            total_notional_transferred_to: Mutex::new(Summary::new(since, fold_notional_to)),
            tvl: Mutex::new(Summary::new(since, fold_tvl)),
        };
        if cached {
            projection.refresh(today)?;
        }
        Ok(projection)
    }

    /// Advance every summary to the start of `today`
    pub fn refresh(&self, today: NaiveDate) -> Result<(), DbError> {
        if !self.cached {
            return Ok(());
        }
        self.total_messages.lock().refresh(&self.db, today)?;
        self.total_notional_transferred
            .lock()
            .refresh(&self.db, today)?;
        self.total_notional_transferred_to
            .lock()
            .refresh(&self.db, today)?;
        self.tvl.lock().refresh(&self.db, today)?;
        debug!(%today, "Refreshed statistics projection");
        Ok(())
    }

    fn read<K, V>(
        &self,
        summary: &Mutex<Summary<K, V>>,
        today: NaiveDate,
    ) -> Result<HashMap<K, V>, DbError>
    where
        K: Clone + Eq + Hash,
        V: Clone,
    {
        let tomorrow = today + Days::new(1);
        if !self.cached {
            let summary = summary.lock();
            let mut values = HashMap::new();
            let docs = self.db.statistics_between(self.since, tomorrow)?;
            summary.fold_all(&mut values, &docs);
            return Ok(values);
        }
        let today_rows = self.db.statistics_between(today, tomorrow)?;
        let mut summary = summary.lock();
        summary.refresh(&self.db, today)?;
        Ok(summary.snapshot(&today_rows))
    }

    /// Transfers per emitter and day, for days in `[from, to]`
    pub fn total_messages(
        &self,
        today: NaiveDate,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<HashMap<MessagesKey, u64>, DbError> {
        let mut values = self.read(&self.total_messages, today)?;
        values.retain(|key, _| key.date >= from && key.date <= to);
        Ok(values)
    }

    /// USD transferred per route and token over the cached window
    pub fn total_notional_transferred(
        &self,
        today: NaiveDate,
    ) -> Result<HashMap<NotionalKey, f64>, DbError> {
        self.read(&self.total_notional_transferred, today)
    }

    /// USD received per destination, token and day, for days in `[from, to]`
    pub fn total_notional_transferred_to(
        &self,
        today: NaiveDate,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<HashMap<NotionalToKey, f64>, DbError> {
        let mut values = self.read(&self.total_notional_transferred_to, today)?;
        values.retain(|key, _| key.date >= from && key.date <= to);
        Ok(values)
    }

    /// Net amount of each token locked outside its native chain
    pub fn tvl(&self, today: NaiveDate) -> Result<HashMap<TokenKey, BigInt>, DbError> {
        self.read(&self.tvl, today)
    }
}

fn fold_messages(values: &mut HashMap<MessagesKey, u64>, doc: &StatisticDoc) {
    let key = MessagesKey {
        date: doc.key.date,
        emitter_chain: doc.key.emitter_chain,
        emitter_address: doc.key.emitter_address,
    };
    *values.entry(key).or_default() += u64::from(doc.total_vaa_count);
}

fn fold_notional(values: &mut HashMap<NotionalKey, f64>, doc: &StatisticDoc) {
    let key = NotionalKey {
        emitter_chain: doc.key.emitter_chain,
        target_chain: doc.key.target_chain,
        token_chain: doc.key.token_chain,
        token_address: doc.key.token_address,
    };
    *values.entry(key).or_default() += doc.total_notional_usd;
}

fn fold_notional_to(values: &mut HashMap<NotionalToKey, f64>, doc: &StatisticDoc) {
    let key = NotionalToKey {
        date: doc.key.date,
        target_chain: doc.key.target_chain,
        token_chain: doc.key.token_chain,
        token_address: doc.key.token_address,
    };
    *values.entry(key).or_default() += doc.total_notional_usd;
}

fn fold_tvl(values: &mut HashMap<TokenKey, BigInt>, doc: &StatisticDoc) {
    let Ok(amount) = BigInt::from_str(&doc.total_transfer_amount) else {
        warn!(
            amount = %doc.total_transfer_amount,
            date = %doc.key.date,
            "Skipping unparseable rollup"
        );
        return;
    };
    let key = TokenKey {
        token_chain: doc.key.token_chain,
        token_address: doc.key.token_address,
    };
    let locked = values.entry(key).or_default();
    if doc.key.emitter_chain == doc.key.token_chain {
        *locked += &amount;
    }
    if doc.key.target_chain == doc.key.token_chain {
        *locked -= &amount;
    }
}

#[cfg(test)]
mod test {
    use chrono::{TimeZone, Utc};
    use explorer_base::CoreMetrics;
    use explorer_core::{Network, StatisticKey, TokenTransferRecord};
    use explorer_test::test_utils::run_test_db;
    use num_traits::Zero;
    use prometheus::Registry;

    use super::*;
    use crate::stats::StatsAggregator;

    const X: u16 = 2;
    const Y: u16 = 4;

    fn token() -> H256 {
        H256::repeat_byte(0xaa)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn doc(
        date: NaiveDate,
        emitter_chain: u16,
        target_chain: u16,
        amount: &str,
        usd: f64,
    ) -> StatisticDoc {
        StatisticDoc {
            key: StatisticKey {
                date,
                emitter_chain,
                emitter_address: H256::repeat_byte(emitter_chain as u8),
                target_chain,
                token_chain: X,
                token_address: token(),
            },
            total_vaa_count: 1,
            total_transfer_amount: amount.to_owned(),
            total_notional_usd: usd,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn tvl_nets_out_a_round_trip() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Mainnet, db);
            let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
            let metrics = CoreMetrics::new("test", Registry::new()).unwrap();
            let mut aggregator =
                StatsAggregator::load(db.clone(), now, metrics.invalid_amounts()).unwrap();
            for (emitter_chain, target_chain) in [(X, Y), (Y, X)] {
                aggregator.push(TokenTransferRecord {
                    emitter_chain,
                    emitter_address: H256::repeat_byte(1),
                    target_chain,
                    token_chain: X,
                    token_address: token(),
                    amount: "100".to_owned(),
                    notional_usd: 100.0,
                    timestamp: now,
                });
            }
            aggregator.tick(now).unwrap();

            let projection = StatsProjection::load(db, day(10), 1000, true).unwrap();
            let tvl = projection.tvl(day(10)).unwrap();
            let key = TokenKey {
                token_chain: X,
                token_address: token(),
            };
            assert!(tvl[&key].is_zero());
        })
        .await
    }

    #[tokio::test]
    async fn summaries_advance_and_overlay_today() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Mainnet, db);
            db.upsert_statistics(&[doc(day(1), X, Y, "70", 7.0), doc(day(2), Y, X, "30", 3.0)])
                .unwrap();
            let projection = StatsProjection::load(db.clone(), day(3), 1000, true).unwrap();

            // today's rows are live, earlier days are served from the summary
            db.upsert_statistics(&[doc(day(3), X, Y, "5", 0.5)]).unwrap();
            let key = TokenKey {
                token_chain: X,
                token_address: token(),
            };
            assert_eq!(projection.tvl(day(3)).unwrap()[&key], BigInt::from(45));

            let notional = projection.total_notional_transferred(day(3)).unwrap();
            let route = NotionalKey {
                emitter_chain: X,
                target_chain: Y,
                token_chain: X,
                token_address: token(),
            };
            assert!((notional[&route] - 7.5).abs() < 1e-9);

            // the next day folds yesterday into the summary exactly once
            db.upsert_statistics(&[doc(day(4), X, Y, "1", 0.1)]).unwrap();
            assert_eq!(projection.tvl(day(4)).unwrap()[&key], BigInt::from(46));
            assert_eq!(projection.tvl(day(4)).unwrap()[&key], BigInt::from(46));

            let messages = projection.total_messages(day(4), day(2), day(3)).unwrap();
            assert_eq!(messages.len(), 2);
            assert!(messages.keys().all(|k| k.date == day(2) || k.date == day(3)));

            let received = projection
                .total_notional_transferred_to(day(4), day(1), day(4))
                .unwrap();
            let to_x = NotionalToKey {
                date: day(2),
                target_chain: X,
                token_chain: X,
                token_address: token(),
            };
            assert!((received[&to_x] - 3.0).abs() < 1e-9);
        })
        .await
    }

    #[tokio::test]
    async fn uncached_reads_match_cached_reads() {
        run_test_db(|db| async move {
            let db = ExplorerDB::new(Network::Mainnet, db);
            db.upsert_statistics(&[
                doc(day(1), X, Y, "70", 7.0),
                doc(day(2), Y, X, "30", 3.0),
                doc(day(2), X, Y, "not a number", 1.0),
            ])
            .unwrap();
            let cached = StatsProjection::load(db.clone(), day(3), 1000, true).unwrap();
            let uncached = StatsProjection::load(db.clone(), day(3), 1000, false).unwrap();
            assert_eq!(cached.tvl(day(3)).unwrap(), uncached.tvl(day(3)).unwrap());
            assert_eq!(
                cached.total_messages(day(3), day(1), day(3)).unwrap(),
                uncached.total_messages(day(3), day(1), day(3)).unwrap()
            );
        })
        .await
    }
}
