//! Bounded fan-out for per-file blocking work (hashing, parsing, counting).
//!
//! Work items run on tokio's blocking pool, at most `limit` at a time, and
//! results come back in input order. A panicking item yields `None` for that
//! slot instead of sinking the batch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const MAX_BATCH_CONCURRENCY: usize = 32;

static BATCH_IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn parse_concurrency(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, MAX_BATCH_CONCURRENCY)
}

/// Concurrency limit from `CONTEXT_ENGINE_CONCURRENCY`, read once per process.
pub fn concurrency_limit() -> usize {
    static LIMIT: OnceLock<usize> = OnceLock::new();
    *LIMIT.get_or_init(|| {
        let raw = std::env::var("CONTEXT_ENGINE_CONCURRENCY").ok();
        parse_concurrency(raw.as_deref(), default_concurrency())
    })
}

/// Number of batch items currently executing across the process.
pub fn in_flight() -> usize {
    BATCH_IN_FLIGHT.load(Ordering::Relaxed)
}

struct InFlightGuard;

impl InFlightGuard {
    fn new() -> Self {
        BATCH_IN_FLIGHT.fetch_add(1, Ordering::Relaxed);
        Self
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        BATCH_IN_FLIGHT.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Run `work` over every item on the blocking pool and await them as one batch.
pub async fn run_blocking<T, R, F>(items: Vec<T>, limit: usize, work: F) -> Vec<Option<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }

    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let work = Arc::new(work);
    let mut set = JoinSet::new();

    for (idx, item) in items.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let work = work.clone();
        set.spawn(async move {
            // The semaphore lives until the batch finishes; it is never closed.
            let _permit = semaphore.acquire_owned().await.ok();
            let out = tokio::task::spawn_blocking(move || {
                let _guard = InFlightGuard::new();
                work(item)
            })
            .await;
            (idx, out.ok())
        });
    }

    let mut results: Vec<Option<R>> = Vec::with_capacity(total);
    results.resize_with(total, || None);
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, out)) => results[idx] = out,
            Err(err) => log::warn!("batch task failed: {err}"),
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_concurrency_defaults_and_clamps() {
        assert_eq!(parse_concurrency(None, 4), 4);
        assert_eq!(parse_concurrency(Some("  "), 4), 4);
        assert_eq!(parse_concurrency(Some("0"), 4), 1);
        assert_eq!(parse_concurrency(Some("999"), 4), MAX_BATCH_CONCURRENCY);
        assert_eq!(parse_concurrency(Some("abc"), 4), 4);
        assert_eq!(parse_concurrency(Some(" 3 "), 4), 3);
    }

    #[tokio::test]
    async fn results_keep_input_order() {
        let out = run_blocking((0..20).collect(), 3, |n: u32| n * 2).await;
        let values: Vec<u32> = out.into_iter().map(|v| v.unwrap()).collect();
        assert_eq!(values, (0..20).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn panicking_item_yields_none() {
        let out = run_blocking(vec![1, 0, 2], 2, |n: u32| {
            assert!(n != 0, "boom");
            n
        })
        .await;
        assert_eq!(out, vec![Some(1), None, Some(2)]);
    }
}
