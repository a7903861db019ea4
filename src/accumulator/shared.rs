use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;

use crate::accumulator::{Accumulate, AccumulatingMap};

/// Accumulating map that many workers can merge into concurrently
///
/// Each merge holds the write lock of the key's shard for its whole
/// read-modify-write, so concurrent merges never lose updates. Clones share
/// the same underlying map.
#[derive(Debug)]
pub struct SharedAccumulator<K, V>
where
    K: Eq + Hash,
{
    inner: Arc<DashMap<K, V>>,
}

impl<K, V> Clone for SharedAccumulator<K, V>
where
    K: Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> SharedAccumulator<K, V>
where
    K: Eq + Hash,
    V: Accumulate,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    pub fn merge_into(&self, key: K, delta: V) {
        self.inner
            .entry(key)
            .or_insert_with(V::identity)
            .merge_assign(delta);
    }

    pub fn merge_map(&self, partial: AccumulatingMap<K, V>) {
        for (key, delta) in partial {
            self.merge_into(key, delta);
        }
    }

    pub fn get<Q>(&self, key: &Q) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.inner
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(V::identity)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> AccumulatingMap<K, V>
    where
        K: Clone,
        V: Clone,
    {
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Final contents; copies only if other handles are still alive
    pub fn into_map(self) -> AccumulatingMap<K, V>
    where
        K: Clone,
        V: Clone,
    {
        match Arc::try_unwrap(self.inner) {
            Ok(map) => map.into_iter().collect(),
            Err(shared) => SharedAccumulator { inner: shared }.snapshot(),
        }
    }
}

impl<K, V> Default for SharedAccumulator<K, V>
where
    K: Eq + Hash,
    V: Accumulate,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_concurrent_merges_lose_no_updates() {
        let acc: SharedAccumulator<u8, u64> = SharedAccumulator::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let acc = acc.clone();
                thread::spawn(move || {
                    for i in 0..1_000u64 {
                        acc.merge_into((i % 4) as u8, 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let map = acc.into_map();
        assert_eq!(map.len(), 4);
        for key in 0..4u8 {
            assert_eq!(map.get(&key), 2_000);
        }
    }

    #[test]
    fn test_merge_map_and_snapshot() {
        let acc: SharedAccumulator<&str, Vec<f64>> = SharedAccumulator::new();
        acc.merge_map([("a", vec![1.0]), ("b", vec![2.0])].into_iter().collect());
        acc.merge_map([("a", vec![1.0, 1.0])].into_iter().collect());

        let snapshot = acc.snapshot();
        assert_eq!(snapshot.get("a"), vec![2.0, 1.0]);
        assert_eq!(acc.get("b"), vec![2.0]);
        assert_eq!(acc.get("missing"), Vec::<f64>::new());
    }

    #[test]
    fn test_into_map_with_live_clone_copies() {
        let acc: SharedAccumulator<u32, i64> = SharedAccumulator::new();
        let other = acc.clone();
        other.merge_into(1, 5);

        let map = acc.into_map();
        assert_eq!(map.get(&1), 5);
        assert_eq!(other.get(&1), 5);
    }
}
