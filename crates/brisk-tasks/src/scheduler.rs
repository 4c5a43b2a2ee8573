//! Per-task FIFO work queue
//!
//! A task function declares work (shell commands, glob expansions, other
//! task runs) by scheduling it. Scheduled operations run one at a time, in
//! the order they were scheduled, on a consumer loop spawned by
//! [`Scheduler::init`]. [`Scheduler::finalize`] waits until the queue is
//! empty, including work scheduled by operations while they ran.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::TaskError;
use crate::sync::lock;

type Job = BoxFuture<'static, Result<(), TaskError>>;

enum Message {
    Run(Job),
    Finalize,
}

struct Running {
    tx: mpsc::UnboundedSender<Message>,
    worker: Option<JoinHandle<Result<(), TaskError>>>,
    aborted: Arc<AtomicBool>,
}

/// Serializes the asynchronous operations of one execution context
#[derive(Default)]
pub struct Scheduler {
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("running", &self.is_running())
            .finish()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh queue and its consumer loop. Must be called from
    /// within a tokio runtime.
    pub fn init(&self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let aborted = Arc::new(AtomicBool::new(false));
        let worker = tokio::spawn(drain(rx, Arc::clone(&aborted)));

        // Replacing a previous queue closes its channel, which ends its loop.
        *lock(&self.running) = Some(Running {
            tx,
            worker: Some(worker),
            aborted,
        });
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    /// Enqueue `op`. It runs after every operation scheduled before it,
    /// whether or not the returned handle is awaited.
    pub fn schedule<T, F>(&self, op: F) -> Scheduled<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = async move {
            let result = op.await;
            let status = match &result {
                Ok(_) => Ok(()),
                Err(e) => Err(e.clone()),
            };
            let _ = result_tx.send(result);
            status
        }
        .boxed();

        match lock(&self.running).as_ref() {
            // A closed channel hands the job back; dropping it resolves the
            // handle as aborted.
            Some(running) => {
                let _ = running.tx.send(Message::Run(job));
            }
            None => trace!("scheduling on a stopped scheduler"),
        }

        Scheduled { rx: result_rx }
    }

    /// Wait for every queued operation to finish, then stop the loop.
    ///
    /// Returns the first error any operation produced. Operations still
    /// queued after that error are not started.
    pub async fn finalize(&self) -> Result<(), TaskError> {
        let (tx, worker) = {
            let mut guard = lock(&self.running);
            match guard.as_mut() {
                Some(running) => (running.tx.clone(), running.worker.take()),
                None => return Ok(()),
            }
        };

        let _ = tx.send(Message::Finalize);
        let result = match worker {
            Some(worker) => worker
                .await
                .unwrap_or_else(|e| Err(TaskError::Aborted(format!("scheduler loop ended: {}", e)))),
            None => Ok(()),
        };

        let mut guard = lock(&self.running);
        if guard.as_ref().is_some_and(|r| r.tx.same_channel(&tx)) {
            *guard = None;
        }
        result
    }

    /// Drop every operation that has not started yet, then finalize.
    pub async fn abort(&self) -> Result<(), TaskError> {
        if let Some(running) = lock(&self.running).as_ref() {
            running.aborted.store(true, Ordering::SeqCst);
        }
        self.finalize().await
    }
}

async fn drain(
    mut rx: mpsc::UnboundedReceiver<Message>,
    aborted: Arc<AtomicBool>,
) -> Result<(), TaskError> {
    let mut failure: Option<TaskError> = None;
    let mut finalizing = false;

    loop {
        let message = if finalizing {
            match rx.try_recv() {
                Ok(message) => message,
                Err(_) => break,
            }
        } else {
            match rx.recv().await {
                Some(message) => message,
                None => break,
            }
        };

        match message {
            Message::Finalize => finalizing = true,
            Message::Run(job) => {
                if failure.is_some() || aborted.load(Ordering::SeqCst) {
                    continue;
                }
                if let Err(e) = job.await {
                    debug!(error = %e, "scheduled operation failed");
                    failure = Some(e);
                }
            }
        }
    }

    failure.map_or(Ok(()), Err)
}

/// Handle to the result of a scheduled operation
#[derive(Debug)]
pub struct Scheduled<T> {
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> Scheduled<T> {
    /// A handle that is already resolved with `err`
    pub fn failed(err: TaskError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self { rx }
    }
}

impl<T> Future for Scheduled<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.rx.poll_unpin(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(TaskError::Aborted(
                    "the operation was dropped before it ran".to_string(),
                ))
            })
        })
    }
}
