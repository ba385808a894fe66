//! Concurrency helper: limit the number of submissions expanded in parallel.

use rayon::prelude::*;

/// Apply `f` to every item with at most `limit` items in flight.
/// `limit <= 1` runs sequentially on the calling thread, in order.
pub fn for_each_limited<T, F>(items: &[T], limit: usize, f: F)
where
    T: Sync,
    F: Sync + Fn(&T),
{
    if limit <= 1 {
        for item in items {
            f(item);
        }
        return;
    }
    for chunk in items.chunks(limit) {
        chunk.par_iter().for_each(|item| f(item));
    }
}
