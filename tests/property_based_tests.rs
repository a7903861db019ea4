mod common;

use common::strategies::*;
use dispatch_core::accumulator::{Accumulate, AccumulatingMap};
use dispatch_core::partition::{split_work_items, WorkItem};
use proptest::prelude::*;

proptest! {
    /// Property: concatenating every block reproduces the input in order
    #[test]
    fn splitting_is_lossless(items in work_items_strategy(), max_weight in max_weight_strategy()) {
        let expected: Vec<usize> = items.iter().map(|item| *item.payload()).collect();

        let flattened: Vec<usize> = split_work_items(items, max_weight)
            .unwrap()
            .flat_map(|block| block.into_items())
            .map(WorkItem::into_payload)
            .collect();

        prop_assert_eq!(flattened, expected);
    }

    /// Property: blocks respect the bound unless a lone item exceeds it
    #[test]
    fn blocks_respect_weight_bound(items in work_items_strategy(), max_weight in max_weight_strategy()) {
        for block in split_work_items(items, max_weight).unwrap() {
            let oversized_single = block.len() == 1 && block.items()[0].weight() > max_weight;
            prop_assert!(
                block.weight() <= max_weight || oversized_single,
                "block #{} weighs {} with {} items (max {})",
                block.index(), block.weight(), block.len(), max_weight
            );
        }
    }

    /// Property: no block mixes group keys and none is empty
    #[test]
    fn blocks_never_mix_groups(items in work_items_strategy(), max_weight in max_weight_strategy()) {
        for block in split_work_items(items, max_weight).unwrap() {
            prop_assert!(!block.is_empty());
            let key = *block.group_key();
            prop_assert!(block.iter().all(|item| *item.group_key() == key));
        }
    }

    /// Property: block indices count up from zero
    #[test]
    fn block_indices_are_sequential(items in work_items_strategy(), max_weight in max_weight_strategy()) {
        for (expected, block) in split_work_items(items, max_weight).unwrap().enumerate() {
            prop_assert_eq!(block.index(), expected);
        }
    }

    /// Property: merge order does not change the accumulated mapping
    #[test]
    fn accumulation_is_order_independent((partials, order) in shuffled_partials_strategy()) {
        let mut in_order = AccumulatingMap::new();
        for partial in partials.iter().cloned() {
            in_order.merge_map(partial);
        }

        let mut shuffled = AccumulatingMap::new();
        for index in order {
            shuffled.merge_map(partials[index].clone());
        }

        prop_assert_eq!(in_order, shuffled);
    }

    /// Property: (a + b) + c == a + (b + c)
    #[test]
    fn accumulation_is_associative(
        a in partial_result_strategy(),
        b in partial_result_strategy(),
        c in partial_result_strategy(),
    ) {
        let left = a.clone().merge(b.clone()).merge(c.clone());
        let right = a.merge(b.merge(c));
        prop_assert_eq!(left, right);
    }

    /// Property: the empty map is the identity of merge
    #[test]
    fn empty_map_is_identity(a in partial_result_strategy()) {
        prop_assert_eq!(AccumulatingMap::identity().merge(a.clone()), a.clone());
        prop_assert_eq!(a.clone().merge(AccumulatingMap::identity()), a);
    }

    /// Property: missing keys read as zero
    #[test]
    fn missing_keys_read_as_identity(a in partial_result_strategy(), key in 6u8..20) {
        prop_assert_eq!(a.get(&key), 0);
    }
}
