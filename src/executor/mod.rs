
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::error::{Error, Result};

const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Worker pool executing inbound invocations.
///
/// Workers are long-lived tasks pulling from one shared unbounded queue,
/// so queue admission never blocks the transport's delivery task. The
/// default single worker serializes target operations and completes them
/// in submission order; more workers trade that ordering for throughput.
pub struct Executor {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
}

impl Executor {
    pub fn new(worker_count: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(AsyncMutex::new(rx));
        let pending = Arc::new(AtomicUsize::new(0));

        let workers = (0..worker_count.max(1))
            .map(|_| {
                let rx = rx.clone();
                let pending = pending.clone();
                tokio::spawn(async move {
                    loop {
                        let job = { rx.lock().await.recv().await };
                        match job {
                            Some(job) => {
                                job.await;
                                pending.fetch_sub(1, Ordering::SeqCst);
                            }
                            None => break,
                        }
                    }
                })
            })
            .collect();

        Executor {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            pending,
        }
    }

    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let tx = self.tx.lock();
        let sender = tx.as_ref().ok_or(Error::ErrExecutorClosed)?;
        self.pending.fetch_add(1, Ordering::SeqCst);
        sender.send(Box::pin(job)).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            Error::ErrExecutorClosed
        })
    }

    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Graceful shutdown: close the queue, give workers up to five
    /// seconds to drain, then cancel whatever remains.
    pub async fn shutdown(&self) {
        let sender = self.tx.lock().take();
        drop(sender);

        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        let deadline = Instant::now() + SHUTDOWN_DRAIN;
        for mut handle in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if time::timeout(remaining, &mut handle).await.is_err() {
                handle.abort();
            }
        }

        let pending = self.pending_count();
        if pending > 0 {
            log::warn!("executor shut down with {pending} tasks still pending");
        } else {
            log::debug!("executor drained and shut down");
        }
    }
}
