// ─── Background Jobs ───
// Cancellation token plus a small runner that executes one unit of work off
// the controller task and delivers a typed result back through a channel.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{LauncherError, LauncherResult};

/// Revocable flag shared by a job and its controller.
///
/// Single writer (the controller), any number of readers. `cancel` is
/// write-once-effective: calling it again is a no-op.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Result-based abort for polling points inside workers. Workers call
    /// this at each safe point and bail out with `?` instead of throwing
    /// control flow across the thread boundary.
    pub fn checkpoint(&self) -> LauncherResult<()> {
        if self.is_cancelled() {
            Err(LauncherError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Two-axis progress reporting passed by reference into opaque install
/// steps: a status line and a numeric fraction.
///
/// `max == 0` signals indeterminate progress (spinner), not a 0/0 ratio.
pub trait ProgressSink {
    fn set_status(&self, text: &str);
    fn set_progress(&self, value: u64, max: u64);
}

/// Handle to one in-flight background job.
///
/// Dropping the handle does not stop the job; cancel it first if the work
/// should not outlive the controller's interest in it.
pub struct JobHandle<T> {
    token: CancellationToken,
    result: oneshot::Receiver<LauncherResult<T>>,
}

impl<T> JobHandle<T> {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the job's terminal outcome. Failures inside the worker are
    /// captured and surfaced here as `Err`; a worker that died without
    /// reporting (panic) is converted to a typed error as well.
    pub async fn join(self) -> LauncherResult<T> {
        match self.result.await {
            Ok(outcome) => outcome,
            Err(_) => Err(LauncherError::Other(
                "background job ended without reporting a result".into(),
            )),
        }
    }
}

pub struct JobRunner;

impl JobRunner {
    /// Run blocking work on a dedicated thread from the blocking pool.
    ///
    /// The task receives the cancellation token to poll at safe points and a
    /// sender for typed progress events; both the events and the final
    /// outcome are consumed on the controller side, never on the worker.
    pub fn run_blocking<P, T, F>(events: mpsc::UnboundedSender<P>, task: F) -> JobHandle<T>
    where
        P: Send + 'static,
        T: Send + 'static,
        F: FnOnce(&CancellationToken, &mpsc::UnboundedSender<P>) -> LauncherResult<T>
            + Send
            + 'static,
    {
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let (result_tx, result_rx) = oneshot::channel();

        tokio::task::spawn_blocking(move || {
            let outcome = task(&worker_token, &events);
            if result_tx.send(outcome).is_err() {
                debug!("job result dropped: controller went away");
            }
        });

        JobHandle {
            token,
            result: result_rx,
        }
    }

    /// Run async work (network-bound jobs) on its own task.
    pub fn run<T, F, Fut>(task: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = LauncherResult<T>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let (result_tx, result_rx) = oneshot::channel();

        tokio::spawn(async move {
            let outcome = task(worker_token).await;
            if result_tx.send(outcome).is_err() {
                debug!("job result dropped: controller went away");
            }
        });

        JobHandle {
            token,
            result: result_rx,
        }
    }
}
