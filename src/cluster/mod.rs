//! Cluster-side entity cache: blocks, entries, and the network clock.

pub mod block;
pub mod cache;
pub mod clock;
pub mod entry;

pub use block::Block;
pub use cache::{Cluster, ClusterEvent, SharedEntry};
pub use clock::ClusterClock;
pub use entry::{
    compute_minimum_bid, compute_price, Entry, EntryState, LevelMetadata, SharedBlock,
};
