//! Async tasks
//!
//! A procedure is a plain `async` block. It suspends at its await points
//! (a response, a timer, a child procedure) and is resumed by whoever completes
//! the awaited event; the resumption runs on the executor that owns the task.
//!
//! Cancellation is cooperative: a [`CancelSignal`] never interrupts a running
//! step, it is observed at the next await point wrapped with
//! [`CancelSignal::guard`], where the procedure unwinds whatever it had
//! reserved before completing.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// A suspendable unit of procedural work producing a `T`.
pub type AsyncTask<T> = BoxFuture<'static, T>;

/// Marker returned when an await point observes cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("task cancelled")]
pub struct Cancelled;

/// Cooperative cancellation signal handed to each sequenced task.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
}

impl CancelSignal {
    /// Creates a signal that is not cancelled.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Creates a signal that is cancelled together with `self`, but can also
    /// be cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when cancellation is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Awaits `future` unless cancellation is requested first.
    ///
    /// If cancellation has already been requested the future is not polled.
    pub async fn guard<F>(&self, future: F) -> Result<F::Output, Cancelled>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Cancelled),
            out = future => Ok(out),
        }
    }
}

/// Result of a task handed to a sequencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    /// The task ran to completion and produced a value.
    Completed(T),
    /// The task was dropped before it started (sequencer drained) or its
    /// executor went away while it was suspended.
    Discarded,
}

impl<T> TaskOutcome<T> {
    /// Returns the value if the task completed.
    pub fn completed(self) -> Option<T> {
        match self {
            TaskOutcome::Completed(value) => Some(value),
            TaskOutcome::Discarded => None,
        }
    }

    /// Returns true if the task was discarded.
    pub fn is_discarded(&self) -> bool {
        matches!(self, TaskOutcome::Discarded)
    }
}

/// Future resolving to the outcome of a scheduled task.
#[derive(Debug)]
#[must_use = "dropping the completion does not cancel the task, but its result is lost"]
pub struct TaskCompletion<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> TaskCompletion<T> {
    pub(crate) fn new(rx: oneshot::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Returns the outcome without waiting, if the task has already finished.
    pub fn try_outcome(&mut self) -> Option<TaskOutcome<T>> {
        match self.rx.try_recv() {
            Ok(value) => Some(TaskOutcome::Completed(value)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(TaskOutcome::Discarded),
        }
    }
}

impl<T> Future for TaskCompletion<T> {
    type Output = TaskOutcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|result| match result {
            Ok(value) => TaskOutcome::Completed(value),
            Err(_) => TaskOutcome::Discarded,
        })
    }
}
