use std::borrow::Borrow;
use std::collections::hash_map::{self, HashMap};
use std::hash::Hash;
use std::ops::{Add, AddAssign};

use crate::accumulator::Accumulate;

/// Mapping from result key to a mergeable value
///
/// Reading a missing key returns the identity element rather than failing, and
/// merging two maps merges overlapping keys with [`Accumulate::merge`]. There
/// is no removal: a map lives for one orchestrated run.
///
/// ```rust
/// use dispatch_core::accumulator::AccumulatingMap;
///
/// let mut acc: AccumulatingMap<&str, Vec<f64>> = AccumulatingMap::new();
/// acc.merge_into("grp-0", vec![1.0, 2.0]);
/// acc.merge_into("grp-0", vec![0.5, 0.5]);
///
/// assert_eq!(acc.get("grp-0"), vec![1.5, 2.5]);
/// assert_eq!(acc.get("grp-1"), Vec::<f64>::new());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatingMap<K, V>
where
    K: Eq + Hash,
{
    inner: HashMap<K, V>,
}

impl<K, V> AccumulatingMap<K, V>
where
    K: Eq + Hash,
    V: Accumulate,
{
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: HashMap::with_capacity(capacity),
        }
    }

    /// Value stored under `key`, or the identity element
    pub fn get<Q>(&self, key: &Q) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.inner.get(key).cloned().unwrap_or_else(V::identity)
    }

    /// Stored value without falling back to the identity element
    pub fn get_ref<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.get(key)
    }

    /// Mutable access, inserting the identity element first if absent
    pub fn get_mut(&mut self, key: K) -> &mut V {
        self.inner.entry(key).or_insert_with(V::identity)
    }

    /// `value[key] = existing_or_identity + delta`
    pub fn merge_into(&mut self, key: K, delta: V) {
        match self.inner.entry(key) {
            hash_map::Entry::Occupied(mut entry) => entry.get_mut().merge_assign(delta),
            hash_map::Entry::Vacant(entry) => {
                entry.insert(V::identity().merge(delta));
            }
        }
    }

    /// Merge every entry of `other` into this map
    pub fn merge_map(&mut self, other: AccumulatingMap<K, V>) {
        for (key, delta) in other.inner {
            self.merge_into(key, delta);
        }
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn keys(&self) -> hash_map::Keys<'_, K, V> {
        self.inner.keys()
    }

    pub fn values(&self) -> hash_map::Values<'_, K, V> {
        self.inner.values()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, K, V> {
        self.inner.iter()
    }

    pub fn into_inner(self) -> HashMap<K, V> {
        self.inner
    }
}

impl<K, V> Default for AccumulatingMap<K, V>
where
    K: Eq + Hash,
    V: Accumulate,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Nested maps merge key by key
impl<K, V> Accumulate for AccumulatingMap<K, V>
where
    K: Eq + Hash,
    V: Accumulate,
{
    fn identity() -> Self {
        Self::new()
    }

    fn merge_assign(&mut self, other: Self) {
        self.merge_map(other);
    }
}

impl<K, V> AddAssign for AccumulatingMap<K, V>
where
    K: Eq + Hash,
    V: Accumulate,
{
    fn add_assign(&mut self, other: Self) {
        self.merge_map(other);
    }
}

impl<K, V> Add for AccumulatingMap<K, V>
where
    K: Eq + Hash,
    V: Accumulate,
{
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self.merge_map(other);
        self
    }
}

impl<K, V> From<HashMap<K, V>> for AccumulatingMap<K, V>
where
    K: Eq + Hash,
{
    fn from(inner: HashMap<K, V>) -> Self {
        Self { inner }
    }
}

/// Duplicate keys are merged, not overwritten
impl<K, V> FromIterator<(K, V)> for AccumulatingMap<K, V>
where
    K: Eq + Hash,
    V: Accumulate,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K, V> Extend<(K, V)> for AccumulatingMap<K, V>
where
    K: Eq + Hash,
    V: Accumulate,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, delta) in iter {
            self.merge_into(key, delta);
        }
    }
}

impl<K, V> IntoIterator for AccumulatingMap<K, V>
where
    K: Eq + Hash,
{
    type Item = (K, V);
    type IntoIter = hash_map::IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl<'a, K, V> IntoIterator for &'a AccumulatingMap<K, V>
where
    K: Eq + Hash,
{
    type Item = (&'a K, &'a V);
    type IntoIter = hash_map::Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_reads_identity() {
        let acc: AccumulatingMap<u32, f64> = AccumulatingMap::new();
        assert_eq!(acc.get(&7), 0.0);
        assert!(acc.get_ref(&7).is_none());
        assert!(acc.is_empty());
    }

    #[test]
    fn test_merge_into_sums_overlapping_keys() {
        let mut acc = AccumulatingMap::new();
        acc.merge_into("before", 10u64);
        acc.merge_into("after", 4u64);
        acc.merge_into("before", 5u64);

        assert_eq!(acc.get("before"), 15);
        assert_eq!(acc.get("after"), 4);
        assert_eq!(acc.len(), 2);
    }

    #[test]
    fn test_get_mut_inserts_identity() {
        let mut acc: AccumulatingMap<&str, [f32; 4]> = AccumulatingMap::new();
        acc.get_mut("src-1")[0] += 3.0;
        acc.get_mut("src-1")[3] += 1.0;
        assert_eq!(acc.get("src-1"), [3.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_add_operators_merge_maps() {
        let a: AccumulatingMap<char, i64> = [('x', 1), ('y', 2)].into_iter().collect();
        let b: AccumulatingMap<char, i64> = [('y', 3), ('z', 4)].into_iter().collect();

        let mut c = a.clone() + b.clone();
        assert_eq!(c.get(&'x'), 1);
        assert_eq!(c.get(&'y'), 5);
        assert_eq!(c.get(&'z'), 4);

        c += a;
        assert_eq!(c.get(&'x'), 2);
        assert_eq!(c.get(&'y'), 7);
    }

    #[test]
    fn test_from_iter_merges_duplicates() {
        let acc: AccumulatingMap<&str, Vec<u32>> =
            vec![("k", vec![1, 1]), ("k", vec![1, 1, 1])].into_iter().collect();
        assert_eq!(acc.get("k"), vec![2, 2, 1]);
    }

    #[test]
    fn test_nested_maps_merge_recursively() {
        let mut outer: AccumulatingMap<&str, AccumulatingMap<u8, f64>> = AccumulatingMap::new();
        outer.merge_into("_c", [(0u8, 1.0)].into_iter().collect());
        outer.merge_into("_c", [(0u8, 2.0), (1u8, 1.0)].into_iter().collect());

        let inner = outer.get("_c");
        assert_eq!(inner.get(&0), 3.0);
        assert_eq!(inner.get(&1), 1.0);
    }
}
