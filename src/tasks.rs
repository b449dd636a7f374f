//! Cancellable background tasks with a single completion channel.
//!
//! Both background operations of a screen (metadata fetch and export run) are
//! spawned through [`spawn_task`]. The returned [`TaskHandle`] lets the
//! controlling context cancel the work, await its single result, or bound the
//! wait with a timeout.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Handle to a spawned background task
#[must_use = "a TaskHandle carries the task's only result"]
pub struct TaskHandle<T> {
    cancel: CancellationToken,
    result: oneshot::Receiver<T>,
    join: tokio::task::JoinHandle<()>,
}

/// Spawn `future` on the tokio runtime and return a handle to its result
///
/// The future receives nothing but is expected to observe `cancel` at its own
/// step boundaries; the handle only signals the token.
pub fn spawn_task<T, F>(cancel: CancellationToken, future: F) -> TaskHandle<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let join = tokio::spawn(async move {
        let value = future.await;
        // Receiver gone means nobody is waiting any more.
        tx.send(value).ok();
    });

    TaskHandle {
        cancel,
        result: rx,
        join,
    }
}

impl<T> TaskHandle<T> {
    /// Ask the task to stop at its next step boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Clone of the token the task observes
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the task has run to completion (or panicked)
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the task's result
    ///
    /// Returns [`Error::TaskAborted`] if the task ended without producing one,
    /// for example because it panicked.
    pub async fn wait(self) -> Result<T> {
        self.result.await.map_err(|_| Error::TaskAborted)
    }

    /// Wait for the task's result for at most `timeout`
    ///
    /// On expiry the task is cancelled and [`Error::Timeout`] is returned.
    pub async fn wait_timeout(self, timeout: Duration) -> Result<T> {
        let cancel = self.cancel.clone();
        match tokio::time::timeout(timeout, self.result).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(Error::TaskAborted),
            Err(_) => {
                cancel.cancel();
                Err(Error::Timeout(timeout))
            }
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.join.is_finished())
            .finish()
    }
}
