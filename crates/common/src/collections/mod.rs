//! Generic containers: an insertion-ordered set, an index-tracking heap and a
//! priority queue built on it.

pub mod heap;
pub mod priority_queue;
pub mod set;

pub use heap::{Heap, HeapItem};
pub use priority_queue::PriorityQueue;
pub use set::OrderedSet;
