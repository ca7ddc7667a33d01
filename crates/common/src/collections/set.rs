//! Insertion-ordered set.

use std::collections::HashSet;
use std::hash::Hash;

/// A set that remembers insertion order.
///
/// Used wherever ids are merged from several sources and the first-seen order
/// must be kept, e.g. role ids unioned with entitlement references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedSet<T: Eq + Hash + Clone> {
    seen: HashSet<T>,
    order: Vec<T>,
}

impl<T: Eq + Hash + Clone> Default for OrderedSet<T> {
    fn default() -> Self {
        Self {
            seen: HashSet::new(),
            order: Vec::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> OrderedSet<T> {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning whether it was new.
    pub fn insert(&mut self, value: T) -> bool {
        if self.seen.insert(value.clone()) {
            self.order.push(value);
            true
        } else {
            false
        }
    }

    /// Whether the value is present.
    pub fn contains(&self, value: &T) -> bool {
        self.seen.contains(value)
    }

    /// Remove a value, returning whether it was present.
    pub fn remove(&mut self, value: &T) -> bool {
        if self.seen.remove(value) {
            self.order.retain(|v| v != value);
            true
        } else {
            false
        }
    }

    /// Position of a value in insertion order.
    pub fn position(&self, value: &T) -> Option<usize> {
        if !self.seen.contains(value) {
            return None;
        }
        self.order.iter().position(|v| v == value)
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.order.iter()
    }

    /// Values in insertion order.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.order
    }

    /// Values in insertion order, borrowed.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.order
    }
}

impl<T: Eq + Hash + Clone> FromIterator<T> for OrderedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<T: Eq + Hash + Clone> Extend<T> for OrderedSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for v in iter {
            self.insert(v);
        }
    }
}

impl<T: Eq + Hash + Clone> IntoIterator for OrderedSet<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_first_seen_order() {
        let set: OrderedSet<&str> = ["b", "a", "b", "c", "a"].into_iter().collect();
        assert_eq!(set.as_slice(), &["b", "a", "c"]);
        assert_eq!(set.position(&"c"), Some(2));
    }

    #[test]
    fn test_remove() {
        let mut set: OrderedSet<i32> = [1, 2, 3].into_iter().collect();
        assert!(set.remove(&2));
        assert!(!set.remove(&2));
        assert!(!set.contains(&2));
        assert_eq!(set.into_vec(), vec![1, 3]);
    }
}
