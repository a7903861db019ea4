//! # Weighted Block Splitter
//!
//! Greedy, streaming partition of an item sequence into weight-bounded blocks.
//! Only a running total is kept, reset at every group boundary, so the input
//! never has to be materialized or summed up front.

use std::iter::Fuse;

use crate::constants::ZERO_WEIGHT_FALLBACK;
use crate::error::{DispatchError, DispatchResult};
use crate::partition::WorkItem;

/// A contiguous, weight-bounded, single-group batch of items
///
/// `weight() <= max_weight` holds for every block except a block holding one
/// item whose own weight exceeds the bound.
#[derive(Debug, Clone, PartialEq)]
pub struct Block<T, K> {
    index: usize,
    group_key: K,
    weight: f64,
    items: Vec<T>,
}

impl<T, K> Block<T, K> {
    fn start(index: usize, group_key: K, item: T, weight: f64) -> Self {
        Self {
            index,
            group_key,
            weight,
            items: vec![item],
        }
    }

    fn push(&mut self, item: T, weight: f64) {
        self.weight += weight;
        self.items.push(item);
    }

    /// Zero-based position of this block in the splitter output
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn group_key(&self) -> &K {
        &self.group_key
    }

    /// Sum of the item weights
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false for blocks produced by the splitter
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<'a, T, K> IntoIterator for &'a Block<T, K> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Lazy, finite, non-restartable sequence of blocks
pub struct BlockSplitter<I, T, K, W, G>
where
    I: Iterator<Item = T>,
{
    items: Fuse<I>,
    max_weight: f64,
    weight_fn: W,
    key_fn: G,
    current: Option<Block<T, K>>,
    next_index: usize,
}

impl<I, T, K, W, G> BlockSplitter<I, T, K, W, G>
where
    I: Iterator<Item = T>,
    K: PartialEq,
    W: FnMut(&T) -> f64,
    G: FnMut(&T) -> K,
{
    pub fn max_weight(&self) -> f64 {
        self.max_weight
    }

    /// Number of blocks emitted or currently being filled
    pub fn blocks_started(&self) -> usize {
        self.next_index
    }

    fn start_block(&mut self, group_key: K, item: T, weight: f64) -> Block<T, K> {
        let block = Block::start(self.next_index, group_key, item, weight);
        self.next_index += 1;
        block
    }
}

impl<I, T, K, W, G> Iterator for BlockSplitter<I, T, K, W, G>
where
    I: Iterator<Item = T>,
    K: PartialEq,
    W: FnMut(&T) -> f64,
    G: FnMut(&T) -> K,
{
    type Item = Block<T, K>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(item) = self.items.next() {
            let weight = (self.weight_fn)(&item);
            let group_key = (self.key_fn)(&item);

            match self.current.take() {
                Some(mut block)
                    if block.group_key == group_key && block.weight + weight <= self.max_weight =>
                {
                    block.push(item, weight);
                    self.current = Some(block);
                }
                Some(full) => {
                    self.current = Some(self.start_block(group_key, item, weight));
                    return Some(full);
                }
                None => {
                    self.current = Some(self.start_block(group_key, item, weight));
                }
            }
        }

        self.current.take()
    }
}

/// Split `items` into blocks of at most `max_weight`, never crossing a change
/// of `key_fn`
///
/// Fails with `InvalidConfiguration` when `max_weight` is not a positive number.
pub fn block_splitter<I, T, K, W, G>(
    items: I,
    max_weight: f64,
    weight_fn: W,
    key_fn: G,
) -> DispatchResult<BlockSplitter<I::IntoIter, T, K, W, G>>
where
    I: IntoIterator<Item = T>,
    K: PartialEq,
    W: FnMut(&T) -> f64,
    G: FnMut(&T) -> K,
{
    if !(max_weight > 0.0) {
        return Err(DispatchError::invalid_configuration(
            "max_weight",
            format!("must be a positive number, got {max_weight}"),
        ));
    }

    Ok(BlockSplitter {
        items: items.into_iter().fuse(),
        max_weight,
        weight_fn,
        key_fn,
        current: None,
        next_index: 0,
    })
}

fn no_group<T>(_: &T) {}

/// Split `items` by weight alone; every item belongs to the same group
pub fn block_splitter_ungrouped<I, T, W>(
    items: I,
    max_weight: f64,
    weight_fn: W,
) -> DispatchResult<BlockSplitter<I::IntoIter, T, (), W, fn(&T)>>
where
    I: IntoIterator<Item = T>,
    W: FnMut(&T) -> f64,
{
    block_splitter(items, max_weight, weight_fn, no_group::<T> as fn(&T))
}

/// Splitter over [`WorkItem`]s using their own weight and group key
pub type WorkItemSplitter<I, K, P> =
    BlockSplitter<I, WorkItem<K, P>, K, fn(&WorkItem<K, P>) -> f64, fn(&WorkItem<K, P>) -> K>;

fn work_item_weight<K, P>(item: &WorkItem<K, P>) -> f64 {
    item.weight()
}

fn work_item_group<K: Clone, P>(item: &WorkItem<K, P>) -> K {
    item.group_key().clone()
}

pub fn split_work_items<I, K, P>(
    items: I,
    max_weight: f64,
) -> DispatchResult<WorkItemSplitter<I::IntoIter, K, P>>
where
    I: IntoIterator<Item = WorkItem<K, P>>,
    K: PartialEq + Clone,
{
    block_splitter(
        items,
        max_weight,
        work_item_weight::<K, P> as fn(&WorkItem<K, P>) -> f64,
        work_item_group::<K, P> as fn(&WorkItem<K, P>) -> K,
    )
}

/// Derive a block weight bound from the total workload weight
///
/// `ceil(total_weight / concurrent_tasks)`, capped by `weight_cap` so a single
/// task never becomes too large. A zero total falls back to `1.0`.
pub fn max_block_weight(
    total_weight: f64,
    concurrent_tasks: usize,
    weight_cap: Option<f64>,
) -> DispatchResult<f64> {
    if concurrent_tasks == 0 {
        return Err(DispatchError::invalid_configuration(
            "concurrent_tasks",
            "must be greater than 0",
        ));
    }
    if !total_weight.is_finite() || total_weight < 0.0 {
        return Err(DispatchError::invalid_configuration(
            "total_weight",
            format!("must be a finite non-negative number, got {total_weight}"),
        ));
    }

    let mut weight = (total_weight / concurrent_tasks as f64).ceil();
    if weight <= 0.0 {
        weight = ZERO_WEIGHT_FALLBACK;
    }

    match weight_cap {
        Some(cap) if !(cap > 0.0) => Err(DispatchError::invalid_configuration(
            "weight_cap",
            format!("must be a positive number, got {cap}"),
        )),
        Some(cap) => Ok(weight.min(cap)),
        None => Ok(weight),
    }
}
