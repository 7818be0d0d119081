//! Work distribution for the per-record stages
//!
//! Feature preparation and classification are pure per record, so they can
//! fan out across threads. Every pool returns results in input order.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::defaults::DEFAULT_PARALLEL_THRESHOLD;

/// Ordered map over a batch of independent items.
pub trait TaskPool: Send + Sync {
    /// Apply `f` to every item; output position `i` holds `f(&items[i])`.
    fn map_ordered<T, U, F>(&self, items: &[T], f: F) -> Vec<U>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> U + Send + Sync;
}

/// Runs on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialPool;

impl TaskPool for SequentialPool {
    fn map_ordered<T, U, F>(&self, items: &[T], f: F) -> Vec<U>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> U + Send + Sync,
    {
        items.iter().map(f).collect()
    }
}

/// Fans out over a dedicated rayon thread pool.
#[derive(Debug)]
pub struct RayonPool {
    /// `None` when the dedicated pool could not be built; rayon's global
    /// pool is used instead
    pool: Option<rayon::ThreadPool>,
}

impl RayonPool {
    /// Build a pool with `threads` workers (0 = one per core).
    pub fn new(threads: usize) -> Self {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("sentinel-worker-{i}"))
            .build()
        {
            Ok(pool) => {
                debug!(threads = pool.current_num_threads(), "Rayon pool ready");
                Some(pool)
            }
            Err(e) => {
                warn!(error = %e, "Failed to build rayon pool, using the global pool");
                None
            }
        };
        Self { pool }
    }
}

impl Default for RayonPool {
    fn default() -> Self {
        Self::new(0)
    }
}

impl TaskPool for RayonPool {
    fn map_ordered<T, U, F>(&self, items: &[T], f: F) -> Vec<U>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> U + Send + Sync,
    {
        match self.pool {
            Some(ref pool) => pool.install(|| items.par_iter().map(&f).collect()),
            None => items.par_iter().map(&f).collect(),
        }
    }
}

/// Sequential for small batches, rayon at or above `threshold` items.
#[derive(Debug)]
pub struct AdaptivePool {
    threshold: usize,
    parallel: RayonPool,
}

impl AdaptivePool {
    pub fn new(threshold: usize, threads: usize) -> Self {
        Self {
            threshold,
            parallel: RayonPool::new(threads),
        }
    }

    pub const fn threshold(&self) -> usize {
        self.threshold
    }
}

impl Default for AdaptivePool {
    fn default() -> Self {
        Self::new(DEFAULT_PARALLEL_THRESHOLD, 0)
    }
}

impl TaskPool for AdaptivePool {
    fn map_ordered<T, U, F>(&self, items: &[T], f: F) -> Vec<U>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> U + Send + Sync,
    {
        if items.len() >= self.threshold {
            self.parallel.map_ordered(items, f)
        } else {
            SequentialPool.map_ordered(items, f)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_preserves_order() {
        let out = SequentialPool.map_ordered(&[1, 2, 3], |x| x * 10);
        assert_eq!(out, vec![10, 20, 30]);
    }

    #[test]
    fn test_rayon_preserves_order() {
        let items: Vec<u64> = (0..10_000).collect();
        let out = RayonPool::new(4).map_ordered(&items, |x| x * 2);
        assert_eq!(out, items.iter().map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_adaptive_matches_sequential_on_both_sides_of_threshold() {
        let pool = AdaptivePool::new(100, 2);
        for n in [10usize, 100, 1_000] {
            let items: Vec<usize> = (0..n).collect();
            assert_eq!(
                pool.map_ordered(&items, |x| x + 1),
                SequentialPool.map_ordered(&items, |x| x + 1)
            );
        }
    }

    #[test]
    fn test_empty_batch() {
        let out: Vec<u8> = AdaptivePool::default().map_ordered(&[] as &[u8], |x| *x);
        assert!(out.is_empty());
    }
}
