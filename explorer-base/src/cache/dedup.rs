use std::fmt::{Debug, Formatter};
use std::hash::Hash;

use moka::sync::Cache;

/// Default number of ids remembered
pub const DEFAULT_DEDUP_CAPACITY: u64 = 10_000;

/// Remembers recently admitted ids so repeated gossip is processed once.
///
/// The cache is bounded and evicts with an approximate LFU policy, so an id
/// evicted under pressure may be admitted again. Consumers must tolerate
/// that; the store upserts idempotently.
#[derive(Clone)]
pub struct Deduplicator<K>
where
    K: Hash + Eq + Send + Sync + 'static,
{
    seen: Cache<K, ()>,
}

impl<K> Debug for Deduplicator<K>
where
    K: Hash + Eq + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deduplicator")
            .field("entries", &self.seen.entry_count())
            .finish()
    }
}

impl<K> Deduplicator<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// Remember up to `capacity` ids
    pub fn new(capacity: u64) -> Self {
        Self {
            seen: Cache::builder().max_capacity(capacity).build(),
        }
    }

    /// Record `id`, returning `true` the first time it is seen.
    pub fn first_sight(&self, id: K) -> bool {
        self.seen.entry(id).or_insert(()).is_fresh()
    }

    /// Invoke `body` only on first sight of `id`; later calls return `None`
    /// without invoking it.
    pub fn apply<T>(&self, id: K, body: impl FnOnce() -> T) -> Option<T> {
        self.first_sight(id).then(body)
    }

    /// Forget `id` so a later copy is admitted again
    pub fn forget(&self, id: &K) {
        self.seen.invalidate(id);
    }
}

impl<K> Default for Deduplicator<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

#[cfg(test)]
mod test {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn body_runs_once_per_id() {
        let dedup = Deduplicator::<String>::default();
        let calls = Cell::new(0);
        for _ in 0..3 {
            dedup.apply("2/00/1/7".to_owned(), || calls.set(calls.get() + 1));
        }
        dedup.apply("2/00/1/8".to_owned(), || calls.set(calls.get() + 1));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn forgotten_ids_are_admitted_again() {
        let dedup = Deduplicator::new(16);
        assert!(dedup.first_sight(7u64));
        assert!(!dedup.first_sight(7u64));
        dedup.forget(&7);
        assert!(dedup.first_sight(7u64));
    }
}
