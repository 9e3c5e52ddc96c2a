//! Concurrency helper: run per-subreddit jobs with at most `limit` in flight.

use rayon::prelude::*;

/// Map `f` over `items` with at most `limit` jobs running at once, keeping
/// input order in the output. Jobs share nothing; callers merge afterwards.
///
/// Runs on a local pool of `limit` threads so the global pool keeps its own
/// sizing. If the local pool cannot be created, jobs run in chunks of
/// `limit` on the global pool instead.
pub fn map_limited<T, R, F>(items: &[T], limit: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Sync + Fn(&T) -> R,
{
    if limit <= 1 || items.len() <= 1 {
        return items.iter().map(&f).collect();
    }
    match rayon::ThreadPoolBuilder::new().num_threads(limit).build() {
        Ok(pool) => pool.install(|| items.par_iter().map(&f).collect()),
        Err(e) => {
            tracing::debug!(error = %e, "local pool unavailable; using global pool");
            let mut out = Vec::with_capacity(items.len());
            for chunk in items.chunks(limit) {
                let part: Vec<R> = chunk.par_iter().map(&f).collect();
                out.extend(part);
            }
            out
        }
    }
}
