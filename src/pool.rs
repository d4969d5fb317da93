use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Runs every job with at most `limit` in flight and hands each output to
/// `on_done` from the calling task, in completion order.
///
/// Jobs are spawned up front and wait for a permit before doing any work. A job
/// that panics is logged and produces no output.
pub async fn run_bounded<T, Fut, I, F>(limit: usize, jobs: I, mut on_done: F)
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
    F: FnMut(T),
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut join_set = JoinSet::new();

    for job in jobs {
        let semaphore = Arc::clone(&semaphore);
        join_set.spawn(async move {
            // The semaphore is never closed, so acquire only fails if it were.
            let _permit = semaphore.acquire_owned().await.ok();
            job.await
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(output) => on_done(output),
            Err(err) => tracing::error!(error = %err, "pooled task did not complete"),
        }
    }
}
