//! Bounded worker pool over a shared FIFO queue.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

/// Run `worker` over `items` with at most `limit` concurrent tasks.
///
/// `min(limit, items.len())` tasks share one FIFO queue behind an async
/// mutex; each dequeues one item and awaits the worker future to completion
/// before taking the next, so no item is ever delivered twice. Per-item
/// error handling belongs inside the caller's worker closure; a panicking
/// task is contained and logged, and sibling tasks keep draining the queue.
pub async fn run_with_concurrency<T, F, Fut>(items: Vec<T>, limit: usize, worker: F)
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let worker_count = limit.min(items.len());
    if worker_count == 0 {
        return;
    }

    let queue = Arc::new(Mutex::new(VecDeque::from(items)));
    let worker = Arc::new(worker);

    let mut handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let queue = queue.clone();
        let worker = worker.clone();

        handles.push(tokio::spawn(async move {
            loop {
                // The lock guard is dropped before awaiting the worker, so
                // the dequeue never serializes sibling work.
                let item = queue.lock().await.pop_front();
                match item {
                    Some(item) => worker(item).await,
                    None => break,
                }
            }
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "worker task aborted");
        }
    }
}
