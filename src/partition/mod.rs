//! # Work Partitioning
//!
//! Turns an ordered stream of weighted, keyed work items into contiguous
//! blocks bounded by a maximum total weight. A block never mixes two group
//! keys, and an item heavier than the bound travels alone instead of being
//! dropped or split.
//!
//! ```rust
//! use dispatch_core::partition::{split_work_items, WorkItem};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let items = (0..10)
//!     .map(|i| WorkItem::new(1.0, "grp-0", i))
//!     .collect::<Result<Vec<_>, _>>()?;
//!
//! let sizes: Vec<usize> = split_work_items(items, 3.0)?.map(|b| b.len()).collect();
//! assert_eq!(sizes, vec![3, 3, 3, 1]);
//! # Ok(())
//! # }
//! ```

pub mod block_splitter;
pub mod work_item;

pub use block_splitter::{
    block_splitter, block_splitter_ungrouped, max_block_weight, split_work_items, Block,
    BlockSplitter, WorkItemSplitter,
};
pub use work_item::WorkItem;
