use proptest::prelude::*;

use dispatch_core::accumulator::AccumulatingMap;
use dispatch_core::partition::WorkItem;

/// Group keys drawn from a small alphabet so runs of equal keys are common
pub fn group_key_strategy() -> impl Strategy<Value = char> {
    prop::sample::select(vec!['A', 'B', 'C'])
}

/// Ordered work items; the payload is the input position
pub fn work_items_strategy() -> impl Strategy<Value = Vec<WorkItem<char, usize>>> {
    prop::collection::vec((0.0f64..10.0, group_key_strategy()), 0..80).prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(position, (weight, key))| {
                WorkItem::new(weight, key, position).expect("weights are finite and non-negative")
            })
            .collect()
    })
}

pub fn max_weight_strategy() -> impl Strategy<Value = f64> {
    0.5f64..15.0
}

/// One partial result with a handful of overlapping keys
pub fn partial_result_strategy() -> impl Strategy<Value = AccumulatingMap<u8, i64>> {
    prop::collection::vec((0u8..6, -1_000i64..1_000), 0..8)
        .prop_map(|pairs| pairs.into_iter().collect())
}

/// Partial results plus a permutation of their indices
pub fn shuffled_partials_strategy(
) -> impl Strategy<Value = (Vec<AccumulatingMap<u8, i64>>, Vec<usize>)> {
    prop::collection::vec(partial_result_strategy(), 1..10).prop_flat_map(|partials| {
        let order: Vec<usize> = (0..partials.len()).collect();
        (Just(partials), Just(order).prop_shuffle())
    })
}
