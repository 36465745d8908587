//! Parallel execution utilities.

use rayon::prelude::*;

/// Minimum number of items before parallelization is beneficial.
/// Below this threshold, sequential execution is faster due to reduced overhead.
pub const MIN_PARALLEL_SIZE: usize = 1024;

/// Execute a map operation, choosing parallel or sequential based on size.
/// Uses parallel execution only when the number of items exceeds MIN_PARALLEL_SIZE.
#[inline]
pub fn maybe_parallel_map<T, U, F>(items: &[T], f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync + Send,
{
    maybe_parallel_map_threshold(items, MIN_PARALLEL_SIZE, f)
}

/// Execute a map operation with a custom threshold.
#[inline]
pub fn maybe_parallel_map_threshold<T, U, F>(items: &[T], threshold: usize, f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync + Send,
{
    if items.len() >= threshold {
        items.par_iter().map(&f).collect()
    } else {
        items.iter().map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maybe_parallel_map_preserves_order() {
        let items: Vec<i32> = (0..5000).collect();
        let results = maybe_parallel_map(&items, |x| x * 2);

        assert_eq!(results.len(), 5000);
        for (i, &r) in results.iter().enumerate() {
            assert_eq!(r, (i as i32) * 2);
        }
    }

    #[test]
    fn test_threshold_sequential_path() {
        let items = [1, 2, 3];
        let results = maybe_parallel_map_threshold(&items, usize::MAX, |x| x + 1);
        assert_eq!(results, vec![2, 3, 4]);
    }
}
