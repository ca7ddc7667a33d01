//! Index-tracking binary min-heap.
//!
//! Elements report their own rank and remember their slot, so callers can
//! `remove` or `fix` an element in O(log n) after changing its rank.

/// An element that can live in a [`Heap`].
pub trait HeapItem {
    /// Ordering key; the smallest rank is popped first.
    fn rank(&self) -> i64;
    /// Current slot in the heap.
    fn index(&self) -> usize;
    /// Called by the heap whenever the element moves.
    fn set_index(&mut self, index: usize);
}

/// A binary min-heap over [`HeapItem`]s.
#[derive(Debug, Clone)]
pub struct Heap<T: HeapItem> {
    items: Vec<T>,
}

impl<T: HeapItem> Default for Heap<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: HeapItem> Heap<T> {
    /// Create an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a heap from arbitrary items.
    #[must_use]
    pub fn from_vec(items: Vec<T>) -> Self {
        let mut heap = Self { items };
        for (i, item) in heap.items.iter_mut().enumerate() {
            item.set_index(i);
        }
        let n = heap.items.len();
        for i in (0..n / 2).rev() {
            heap.down(i, n);
        }
        heap
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the heap is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Smallest element, if any.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    /// Element at slot `i`.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<&T> {
        self.items.get(i)
    }

    /// Mutable element at slot `i`. Call [`Heap::fix`] after changing its rank.
    pub fn get_mut(&mut self, i: usize) -> Option<&mut T> {
        self.items.get_mut(i)
    }

    /// Iterate in slot order (not rank order).
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Insert an element.
    pub fn push(&mut self, mut item: T) {
        let i = self.items.len();
        item.set_index(i);
        self.items.push(item);
        self.up(i);
    }

    /// Remove and return the smallest element.
    pub fn pop(&mut self) -> Option<T> {
        let n = self.items.len().checked_sub(1)?;
        self.swap(0, n);
        self.down(0, n);
        self.items.pop()
    }

    /// Remove and return the element at slot `i`.
    pub fn remove(&mut self, i: usize) -> Option<T> {
        let n = self.items.len().checked_sub(1)?;
        if i > n {
            return None;
        }
        if n != i {
            self.swap(i, n);
            if !self.down(i, n) {
                self.up(i);
            }
        }
        self.items.pop()
    }

    /// Re-establish ordering after the element at slot `i` changed rank.
    pub fn fix(&mut self, i: usize) {
        if i >= self.items.len() {
            return;
        }
        if !self.down(i, self.items.len()) {
            self.up(i);
        }
    }

    /// Remove every element.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    fn less(&self, i: usize, j: usize) -> bool {
        self.items[i].rank() < self.items[j].rank()
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.items.swap(i, j);
        self.items[i].set_index(i);
        self.items[j].set_index(j);
    }

    fn up(&mut self, mut j: usize) {
        while j > 0 {
            let parent = (j - 1) / 2;
            if !self.less(j, parent) {
                break;
            }
            self.swap(parent, j);
            j = parent;
        }
    }

    fn down(&mut self, i0: usize, n: usize) -> bool {
        let mut i = i0;
        loop {
            let left = 2 * i + 1;
            if left >= n {
                break;
            }
            let mut j = left;
            let right = left + 1;
            if right < n && self.less(right, left) {
                j = right;
            }
            if !self.less(j, i) {
                break;
            }
            self.swap(i, j);
            i = j;
        }
        i > i0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    struct Item {
        rank: i64,
        index: usize,
    }

    impl Item {
        fn new(rank: i64) -> Self {
            Self { rank, index: 0 }
        }
    }

    impl HeapItem for Item {
        fn rank(&self) -> i64 {
            self.rank
        }

        fn index(&self) -> usize {
            self.index
        }

        fn set_index(&mut self, index: usize) {
            self.index = index;
        }
    }

    fn assert_indices(heap: &Heap<Item>) {
        for (slot, item) in heap.iter().enumerate() {
            assert_eq!(item.index(), slot);
        }
    }

    #[test]
    fn test_pop_in_rank_order() {
        let mut heap = Heap::new();
        for r in [5, 1, 4, 2, 3] {
            heap.push(Item::new(r));
        }
        let ranks: Vec<i64> = std::iter::from_fn(|| heap.pop().map(|i| i.rank)).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_fix_after_rank_change() {
        let mut heap = Heap::from_vec(vec![Item::new(1), Item::new(2), Item::new(3)]);
        let slot = heap.iter().position(|i| i.rank == 3).unwrap_or_default();
        if let Some(item) = heap.get_mut(slot) {
            item.rank = 0;
        }
        heap.fix(slot);
        assert_indices(&heap);
        assert_eq!(heap.peek().map(|i| i.rank), Some(0));
    }

    #[test]
    fn test_remove_middle() {
        let mut heap = Heap::from_vec((0..10).map(Item::new).collect());
        let removed = heap.remove(4).map(|i| i.rank);
        assert!(removed.is_some());
        assert_eq!(heap.len(), 9);
        assert_indices(&heap);
        assert!(heap.remove(42).is_none());
    }

    proptest! {
        #[test]
        fn prop_pop_returns_minimum(ops in proptest::collection::vec(proptest::option::of(-1000i64..1000), 1..200)) {
            let mut heap = Heap::new();
            let mut model: Vec<i64> = Vec::new();

            for op in ops {
                match op {
                    Some(rank) => {
                        heap.push(Item::new(rank));
                        model.push(rank);
                    }
                    None => {
                        model.sort_unstable();
                        let expected = if model.is_empty() { None } else { Some(model.remove(0)) };
                        prop_assert_eq!(heap.pop().map(|i| i.rank), expected);
                    }
                }
                prop_assert_eq!(heap.len(), model.len());
                for (slot, item) in heap.iter().enumerate() {
                    prop_assert_eq!(item.index(), slot);
                }
            }
        }
    }
}
