//! Binary search primitives over sorted slices.
//!
//! [`SortedSearch`] extends `[T]` with exact-match, predecessor and
//! insertion-bound searches. Every method runs in O(log n) and relies only on
//! the ordering supplied by the caller; none of them knows anything about
//! media time.
//!
//! The `_by` variants take a comparator that returns how an element orders
//! relative to the target, the same convention as [`slice::binary_search_by`].
//!
//! # Example
//!
//! ```
//! use stillframe::SortedSearch;
//!
//! let values = [1, 3, 3, 3, 7];
//! assert_eq!(values.first_index_equal(&3), Some(1));
//! assert_eq!(values.last_index_less_than_or_equal(&3), Some(3));
//! assert_eq!(values.left_insertion_index(&3), 1);
//! assert_eq!(values.right_insertion_index(&3), 4);
//! assert_eq!(values.last_index_less_than_or_equal(&0), None);
//! ```

use std::cmp::Ordering;

/// Search operations on a slice sorted ascending.
///
/// Results are unspecified (but memory-safe) if the slice is not sorted
/// consistently with the comparator.
pub trait SortedSearch<T> {
    /// Leftmost index whose element compares equal to the target.
    fn first_index_equal_by<F>(&self, compare: F) -> Option<usize>
    where
        F: FnMut(&T) -> Ordering;

    /// Largest index whose element compares less than or equal to the target.
    ///
    /// With duplicates equal to the target this is the rightmost of them.
    /// Returns `None` when every element is greater.
    fn last_index_less_than_or_equal_by<F>(&self, compare: F) -> Option<usize>
    where
        F: FnMut(&T) -> Ordering;

    /// Lower bound: first index whose element is not less than the target.
    fn left_insertion_index_by<F>(&self, compare: F) -> usize
    where
        F: FnMut(&T) -> Ordering;

    /// Upper bound: first index whose element is greater than the target.
    fn right_insertion_index_by<F>(&self, compare: F) -> usize
    where
        F: FnMut(&T) -> Ordering;

    /// [`first_index_equal_by`](SortedSearch::first_index_equal_by) using [`Ord`].
    fn first_index_equal(&self, target: &T) -> Option<usize>
    where
        T: Ord,
    {
        self.first_index_equal_by(|element| element.cmp(target))
    }

    /// [`last_index_less_than_or_equal_by`](SortedSearch::last_index_less_than_or_equal_by)
    /// using [`Ord`].
    fn last_index_less_than_or_equal(&self, target: &T) -> Option<usize>
    where
        T: Ord,
    {
        self.last_index_less_than_or_equal_by(|element| element.cmp(target))
    }

    /// [`left_insertion_index_by`](SortedSearch::left_insertion_index_by) using [`Ord`].
    fn left_insertion_index(&self, target: &T) -> usize
    where
        T: Ord,
    {
        self.left_insertion_index_by(|element| element.cmp(target))
    }

    /// [`right_insertion_index_by`](SortedSearch::right_insertion_index_by) using [`Ord`].
    fn right_insertion_index(&self, target: &T) -> usize
    where
        T: Ord,
    {
        self.right_insertion_index_by(|element| element.cmp(target))
    }
}

impl<T> SortedSearch<T> for [T] {
    fn first_index_equal_by<F>(&self, mut compare: F) -> Option<usize>
    where
        F: FnMut(&T) -> Ordering,
    {
        let index = self.partition_point(|element| compare(element) == Ordering::Less);
        match self.get(index) {
            Some(element) if compare(element) == Ordering::Equal => Some(index),
            _ => None,
        }
    }

    fn last_index_less_than_or_equal_by<F>(&self, compare: F) -> Option<usize>
    where
        F: FnMut(&T) -> Ordering,
    {
        self.right_insertion_index_by(compare).checked_sub(1)
    }

    fn left_insertion_index_by<F>(&self, mut compare: F) -> usize
    where
        F: FnMut(&T) -> Ordering,
    {
        self.partition_point(|element| compare(element) == Ordering::Less)
    }

    fn right_insertion_index_by<F>(&self, mut compare: F) -> usize
    where
        F: FnMut(&T) -> Ordering,
    {
        self.partition_point(|element| compare(element) != Ordering::Greater)
    }
}
