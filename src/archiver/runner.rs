//! Bounded-parallelism execution of independent per-item tasks.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

/// Running completion count, reported once per finished task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    #[must_use]
    pub fn percent(&self) -> usize {
        if self.total == 0 {
            100
        } else {
            self.completed * 100 / self.total
        }
    }
}

/// Outcomes of a run, in completion order.
#[derive(Debug)]
pub struct RunReport<T> {
    pub outcomes: Vec<T>,
    /// Input positions of the tasks that panicked and produced no outcome.
    pub panicked: Vec<usize>,
}

/// Run `work` for every item with at most `max_concurrency` tasks in flight.
///
/// A failing or panicking task does not affect its siblings. `on_progress` is
/// called exactly once per task as it finishes, in completion order.
/// `max_concurrency` of 0 is treated as 1.
pub async fn run_all<I, T, F, Fut, P>(
    items: Vec<I>,
    max_concurrency: usize,
    work: F,
    mut on_progress: P,
) -> RunReport<T>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    P: FnMut(Progress),
{
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let task = work(item);
        tasks.spawn(async move {
            // The semaphore is never closed, so acquiring cannot fail.
            let _permit = semaphore.acquire_owned().await.ok();
            (index, AssertUnwindSafe(task).catch_unwind().await)
        });
    }

    let mut report = RunReport {
        outcomes: Vec::with_capacity(total),
        panicked: Vec::new(),
    };
    let mut completed = 0;

    while let Some(joined) = tasks.join_next().await {
        completed += 1;
        match joined {
            Ok((_, Ok(outcome))) => report.outcomes.push(outcome),
            Ok((index, Err(_))) => {
                error!(item = index, "Media task panicked");
                report.panicked.push(index);
            }
            Err(e) => error!("Media task was cancelled: {e}"),
        }
        on_progress(Progress { completed, total });
    }

    report
}
