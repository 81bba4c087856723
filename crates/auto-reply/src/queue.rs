//! Process-wide FIFO that runs reply work one task at a time.
//!
//! Every ingestor shares one instance, so at most one external command runs
//! at once and session store read-modify-write cycles never interleave.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use {
    futures::future::BoxFuture,
    tokio::sync::{mpsc, oneshot},
    tracing::{debug, error},
};

use crate::{Error, Result};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Single-flight work queue.
///
/// Construct inside a Tokio runtime: `new` spawns the worker task. The
/// worker exits once every handle is dropped and the backlog is drained.
pub struct ReplyQueue {
    tx: mpsc::UnboundedSender<Job>,
    pending: Arc<AtomicUsize>,
}

/// Completion handle for a submitted task.
pub struct Ticket<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Ticket<T> {
    /// Wait for the task to run. Fails if the task panicked or the queue
    /// shut down before reaching it.
    pub async fn wait(self) -> Result<T> {
        self.rx.await.map_err(|_| Error::QueueClosed)
    }
}

impl ReplyQueue {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                // Run on its own task so a panicking job doesn't take the
                // worker down; awaiting it keeps execution serialized.
                if let Err(e) = tokio::spawn(job()).await {
                    error!(error = %e, "reply task panicked");
                }
                worker_pending.fetch_sub(1, Ordering::SeqCst);
            }
            debug!("reply queue worker stopped");
        });

        Self { tx, pending }
    }

    /// Enqueue `task` now and return a handle to its result.
    ///
    /// Queue position is fixed at call time, so callers that submit in order
    /// get FIFO execution even if they never wait on the ticket.
    pub fn submit<F, Fut, T>(&self, task: F) -> Ticket<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let _ = result_tx.send(task().await);
            })
        });

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            error!("reply queue worker is gone, dropping task");
        }
        Ticket { rx }
    }

    /// Enqueue `task` and wait for its result.
    pub async fn enqueue<F, Fut, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(task).wait().await
    }

    /// Tasks submitted but not yet finished (including the running one).
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl Default for ReplyQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{
            sync::Mutex,
            time::{Duration, Instant},
        },
    };

    #[tokio::test]
    async fn tasks_never_overlap() {
        let queue = Arc::new(ReplyQueue::new());
        let spans = Arc::new(Mutex::new(Vec::<(Instant, Instant)>::new()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            let spans = Arc::clone(&spans);
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(move || async move {
                        let start = Instant::now();
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        spans.lock().unwrap().push((start, Instant::now()));
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut spans = spans.lock().unwrap().clone();
        spans.sort_by_key(|(start, _)| *start);
        assert_eq!(spans.len(), 4);
        for pair in spans.windows(2) {
            assert!(pair[1].0 >= pair[0].1, "task started before previous ended");
        }
    }

    #[tokio::test]
    async fn submit_preserves_fifo_order() {
        let queue = ReplyQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let tickets: Vec<_> = (0..10)
            .map(|i| {
                let order = Arc::clone(&order);
                queue.submit(move || async move {
                    // Earlier tasks take longer; order must still hold.
                    tokio::time::sleep(Duration::from_millis(10 - i)).await;
                    order.lock().unwrap().push(i);
                })
            })
            .collect();
        for ticket in tickets {
            ticket.wait().await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn returns_task_output() {
        let queue = ReplyQueue::new();
        assert_eq!(queue.enqueue(|| async { 41 + 1 }).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn panicking_task_does_not_stall_the_queue() {
        let queue = ReplyQueue::new();
        let failed = queue.submit(|| async { panic!("boom") });
        let next = queue.submit(|| async { "ok" });
        assert!(matches!(failed.wait().await, Err(Error::QueueClosed)));
        assert_eq!(next.wait().await.unwrap(), "ok");
    }
}
