//! Lazy, order-preserving merge of two sorted result sequences.

use sensetier_types::SortOrder;

/// Merges two already-sorted data-point sequences into one, preserving
/// each source's internal order.
///
/// The two sources must be sorted by timestamp in the same direction. By
/// construction the volatile tier holds only very recent (or not yet
/// promoted) data, so its newest row is never older than the persistent
/// tier's oldest row: descending output exhausts the volatile source
/// first, ascending output exhausts the persistent source first. No
/// re-sorting happens and neither source is materialized beyond what the
/// caller consumes; the output is capped by `limit`.
#[derive(Debug)]
pub struct MergeCursor<A, B> {
    first: A,
    second: B,
    remaining: usize,
}

impl<T, A, B> MergeCursor<A, B>
where
    A: Iterator<Item = T>,
    B: Iterator<Item = T>,
{
    /// Merge the volatile and persistent result sequences for the given
    /// sort order, yielding at most `limit` items.
    pub fn new(volatile: A, persistent: B, order: SortOrder, limit: usize) -> MergeSources<A, B> {
        if order.is_descending() {
            MergeSources::VolatileFirst(MergeCursor {
                first: volatile,
                second: persistent,
                remaining: limit,
            })
        } else {
            MergeSources::PersistentFirst(MergeCursor {
                first: persistent,
                second: volatile,
                remaining: limit,
            })
        }
    }
}

impl<T, A, B> Iterator for MergeCursor<A, B>
where
    A: Iterator<Item = T>,
    B: Iterator<Item = T>,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.first.next().or_else(|| self.second.next())?;
        self.remaining -= 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

/// A [`MergeCursor`] with its source order already decided.
///
/// The two variants only differ in which tier's sequence is drained
/// first; both yield a single ordered sequence.
#[derive(Debug)]
pub enum MergeSources<A, B> {
    /// Descending order: volatile rows first.
    VolatileFirst(MergeCursor<A, B>),
    /// Ascending order: persistent rows first.
    PersistentFirst(MergeCursor<B, A>),
}

impl<T, A, B> Iterator for MergeSources<A, B>
where
    A: Iterator<Item = T>,
    B: Iterator<Item = T>,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self {
            MergeSources::VolatileFirst(cursor) => cursor.next(),
            MergeSources::PersistentFirst(cursor) => cursor.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            MergeSources::VolatileFirst(cursor) => cursor.size_hint(),
            MergeSources::PersistentFirst(cursor) => cursor.size_hint(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merge(
        volatile: Vec<i64>,
        persistent: Vec<i64>,
        order: SortOrder,
        limit: usize,
    ) -> Vec<i64> {
        MergeCursor::new(volatile.into_iter(), persistent.into_iter(), order, limit).collect()
    }

    #[test]
    fn test_descending_exhausts_volatile_first() {
        let out = merge(vec![50, 40], vec![30, 20, 10], SortOrder::Descending, 100);
        assert_eq!(out, vec![50, 40, 30, 20, 10]);
    }

    #[test]
    fn test_ascending_exhausts_persistent_first() {
        let out = merge(vec![40, 50], vec![10, 20, 30], SortOrder::Ascending, 100);
        assert_eq!(out, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_empty_sides_pass_through() {
        assert_eq!(
            merge(vec![], vec![3, 2, 1], SortOrder::Descending, 100),
            vec![3, 2, 1]
        );
        assert_eq!(
            merge(vec![3, 2, 1], vec![], SortOrder::Descending, 100),
            vec![3, 2, 1]
        );
        assert!(merge(vec![], vec![], SortOrder::Descending, 100).is_empty());
    }

    #[test]
    fn test_limit_caps_output() {
        let out = merge(vec![5, 4], vec![3, 2, 1], SortOrder::Descending, 3);
        assert_eq!(out, vec![5, 4, 3]);
    }

    #[test]
    fn test_output_length_is_sum_of_sources() {
        let out = merge(vec![9, 8, 7], vec![6, 5], SortOrder::Descending, 100);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_zero_limit_yields_nothing() {
        assert!(merge(vec![1], vec![2], SortOrder::Descending, 0).is_empty());
    }

    #[test]
    fn test_laziness() {
        // an infinite second source is fine as long as the limit is finite
        let cursor = MergeCursor::new(
            vec![100i64].into_iter(),
            std::iter::repeat(50i64),
            SortOrder::Descending,
            3,
        );
        let out: Vec<i64> = cursor.collect();
        assert_eq!(out, vec![100, 50, 50]);
    }
}
