//! Max-priority queue on top of [`Heap`].

use super::heap::{Heap, HeapItem};

#[derive(Debug, Clone)]
struct Entry<T> {
    key: u64,
    value: T,
    priority: i64,
    index: usize,
}

impl<T> HeapItem for Entry<T> {
    // Inverted so the min-heap yields the highest priority first.
    fn rank(&self) -> i64 {
        self.priority.saturating_neg()
    }

    fn index(&self) -> usize {
        self.index
    }

    fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}

/// A queue that pops the value with the highest priority first.
///
/// [`PriorityQueue::push`] returns a key that can later be used to change the
/// priority of, or remove, that value.
#[derive(Debug, Clone)]
pub struct PriorityQueue<T> {
    heap: Heap<Entry<T>>,
    next_key: u64,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self {
            heap: Heap::new(),
            next_key: 0,
        }
    }
}

impl<T> PriorityQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Enqueue a value and return its key.
    pub fn push(&mut self, value: T, priority: i64) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        self.heap.push(Entry {
            key,
            value,
            priority,
            index: 0,
        });
        key
    }

    /// Dequeue the highest priority value.
    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|e| e.value)
    }

    /// Highest priority value and its priority.
    #[must_use]
    pub fn peek(&self) -> Option<(&T, i64)> {
        self.heap.peek().map(|e| (&e.value, e.priority))
    }

    /// Change the priority of a queued value. Returns false for unknown keys.
    pub fn update(&mut self, key: u64, priority: i64) -> bool {
        let Some(slot) = self.slot_of(key) else {
            return false;
        };
        if let Some(entry) = self.heap.get_mut(slot) {
            entry.priority = priority;
        }
        self.heap.fix(slot);
        true
    }

    /// Remove a queued value by key.
    pub fn remove(&mut self, key: u64) -> Option<T> {
        let slot = self.slot_of(key)?;
        self.heap.remove(slot).map(|e| e.value)
    }

    fn slot_of(&self, key: u64) -> Option<usize> {
        self.heap.iter().find(|e| e.key == key).map(HeapItem::index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_highest_priority_first() {
        let mut pq = PriorityQueue::new();
        pq.push("low", 1);
        pq.push("high", 10);
        pq.push("mid", 5);

        assert_eq!(pq.peek().map(|(v, p)| (*v, p)), Some(("high", 10)));
        assert_eq!(pq.pop(), Some("high"));
        assert_eq!(pq.pop(), Some("mid"));
        assert_eq!(pq.pop(), Some("low"));
        assert_eq!(pq.pop(), None);
    }

    #[test]
    fn test_update_and_remove() {
        let mut pq = PriorityQueue::new();
        let a = pq.push("a", 1);
        let b = pq.push("b", 2);
        pq.push("c", 3);

        assert!(pq.update(a, 100));
        assert_eq!(pq.remove(b), Some("b"));
        assert!(!pq.update(b, 5));
        assert_eq!(pq.pop(), Some("a"));
        assert_eq!(pq.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_drains_descending(priorities in proptest::collection::vec(-1_000_000i64..1_000_000, 0..100)) {
            let mut pq = PriorityQueue::new();
            for p in &priorities {
                pq.push(*p, *p);
            }
            let drained: Vec<i64> = std::iter::from_fn(|| pq.pop()).collect();
            let mut expected = priorities.clone();
            expected.sort_unstable_by(|a, b| b.cmp(a));
            prop_assert_eq!(drained, expected);
        }
    }
}
