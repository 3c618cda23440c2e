//! Order-preserving concurrent fetching.
//!
//! Two shapes are used by the adapters:
//!
//! - [`in_batches`]: consecutive batches of at most `size` tasks. A batch
//!   runs to completion before the next one starts.
//! - [`with_page_pool`]: a fixed pool of pages, each working through its
//!   own share of the items one after another.
//!
//! Both return results in input order. Tasks report their own failures in
//! their output type (`Option`, `Result` or a blank record), so one failed
//! task never stops its siblings or later batches.

use crate::browser::{BrowserSession, PageHandle};
use crate::error::BrowserError;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Run `task` over `items` in consecutive batches of `size`.
#[instrument(level = "debug", skip_all, fields(items = items.len(), size))]
pub async fn in_batches<T, R, F, Fut>(items: Vec<T>, size: usize, mut task: F) -> Vec<R>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    let size = size.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut pending = items.into_iter().peekable();
    let mut batch_no = 0usize;
    while pending.peek().is_some() {
        let batch: Vec<Fut> = pending.by_ref().take(size).map(&mut task).collect();
        batch_no += 1;
        debug!(batch = batch_no, tasks = batch.len(), "Running batch");
        results.extend(join_all(batch).await);
    }
    results
}

/// Open `pool_size` pages (never more than there are items) and share the
/// items among them round-robin. Each page handles its items sequentially;
/// the pages run concurrently. All pool pages are closed before returning.
#[instrument(level = "debug", skip_all, fields(items = items.len(), pool_size))]
pub async fn with_page_pool<T, R, F, Fut>(
    session: &dyn BrowserSession,
    pool_size: usize,
    items: Vec<T>,
    task: F,
) -> Result<Vec<R>, BrowserError>
where
    F: Fn(PageHandle, T) -> Fut,
    Fut: Future<Output = R>,
{
    let workers = pool_size.max(1).min(items.len());
    if workers == 0 {
        return Ok(Vec::new());
    }

    let mut pages: Vec<PageHandle> = Vec::with_capacity(workers);
    for _ in 0..workers {
        match session.new_page().await {
            Ok(page) => pages.push(page),
            Err(e) => {
                close_all(&pages).await;
                return Err(e);
            }
        }
    }

    let total = items.len();
    let mut lanes: Vec<Vec<(usize, T)>> = (0..workers).map(|_| Vec::new()).collect();
    for (idx, item) in items.into_iter().enumerate() {
        lanes[idx % workers].push((idx, item));
    }

    let task = &task;
    let lane_runs = lanes.into_iter().zip(pages.iter()).map(|(lane, page)| async move {
        let mut done = Vec::with_capacity(lane.len());
        for (idx, item) in lane {
            done.push((idx, task(Arc::clone(page), item).await));
        }
        done
    });
    let finished = join_all(lane_runs).await;
    close_all(&pages).await;

    let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
    for (idx, result) in finished.into_iter().flatten() {
        slots[idx] = Some(result);
    }
    Ok(slots.into_iter().flatten().collect())
}

async fn close_all(pages: &[PageHandle]) {
    for page in pages {
        if let Err(e) = page.close().await {
            debug!(error = %e, "Failed to close pooled page");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakeSite;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_in_batches_preserves_order_with_failures() {
        let items: Vec<usize> = (0..23).collect();
        let results = in_batches(items, 5, |n| async move {
            // Later items finish first inside a batch.
            tokio::time::sleep(Duration::from_millis((10 - (n % 5) * 2) as u64)).await;
            if n % 4 == 0 { None } else { Some(n * 10) }
        })
        .await;

        assert_eq!(results.len(), 23);
        for (idx, result) in results.iter().enumerate() {
            if idx % 4 == 0 {
                assert_eq!(*result, None);
            } else {
                assert_eq!(*result, Some(idx * 10));
            }
        }
        let survivors: Vec<usize> = results.into_iter().flatten().collect();
        let mut sorted = survivors.clone();
        sorted.sort();
        assert_eq!(survivors, sorted);
    }

    #[tokio::test]
    async fn test_in_batches_waits_for_each_batch() {
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let started = Mutex::new(Vec::new());
        in_batches((0..10).collect::<Vec<usize>>(), 3, |n| {
            let running = &running;
            let peak = &peak;
            let started = &started;
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                started.lock().unwrap().push(n);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(started.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_in_batches_empty_input() {
        let results: Vec<u8> = in_batches(Vec::<u8>::new(), 8, |n| async move { n }).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_page_pool_orders_results_and_closes_pages() {
        let site = FakeSite::new();
        let session = site.session();
        let items: Vec<usize> = (0..7).collect();
        let results = with_page_pool(session.as_ref(), 3, items, |_page, n| async move {
            tokio::time::sleep(Duration::from_millis((7 - n) as u64)).await;
            n * 2
        })
        .await
        .unwrap();

        assert_eq!(results, vec![0, 2, 4, 6, 8, 10, 12]);
        assert_eq!(site.pages_opened(), 3);
        assert_eq!(site.pages_closed(), 3);
    }

    #[tokio::test]
    async fn test_page_pool_never_opens_more_pages_than_items() {
        let site = FakeSite::new();
        let session = site.session();
        let results = with_page_pool(session.as_ref(), 16, vec!["a", "b"], |_page, s| async move {
            s.to_uppercase()
        })
        .await
        .unwrap();
        assert_eq!(results, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(site.pages_opened(), 2);
        assert_eq!(site.pages_closed(), 2);
    }
}
