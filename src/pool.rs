//! Fixed-size async worker pool
//!
//! `N` workers pull jobs from one shared channel. [`WorkerPool::run`] returns
//! once the channel is drained and every worker has exited, so at most `N`
//! jobs are ever in flight and none is still running when results come back.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    /// Pool with `workers` workers (at least one)
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `task` on every item and wait for all of them
    ///
    /// Results are returned in no particular order.
    pub async fn run<I, T, F, Fut, O>(&self, items: I, task: F) -> Vec<O>
    where
        I: IntoIterator<Item = T>,
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
        O: Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<T>(self.workers);
        let rx = Arc::new(Mutex::new(rx));
        let task = Arc::new(task);

        let mut workers = JoinSet::new();
        for _ in 0..self.workers {
            let rx = Arc::clone(&rx);
            let task = Arc::clone(&task);
            workers.spawn(async move {
                let mut done = Vec::new();
                loop {
                    // Lock is released before the job runs
                    let next = rx.lock().await.recv().await;
                    let Some(item) = next else { break };
                    done.push(task(item).await);
                }
                done
            });
        }

        for item in items {
            if tx.send(item).await.is_err() {
                // Every worker is gone; nothing left to feed
                break;
            }
        }
        drop(tx);

        let mut results = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(done) => results.extend(done),
                Err(e) => warn!(error = %e, "worker task aborted"),
            }
        }
        results
    }
}
