//! Task Sequencer
//!
//! Per-entity FIFO of procedures. At most one task of a sequencer is current;
//! the next one starts only once the current one has completed, even while the
//! current one is suspended waiting for a response or a timer.
//!
//! ```text
//!   schedule(t3) ──▶ [ t3 | t2 ] ──▶ current: t1 (suspended on F1 response)
//!                    bounded queue      │
//!                                       └─ completes ─▶ t2 starts
//! ```
//!
//! The drain loop is a single future spawned on the entity's executor, so the
//! tasks of one entity never run in parallel and tasks of different entities
//! on the same executor interleave only at their await points.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace, Instrument};

use crate::error::SequencerError;
use crate::executor::ExecutorHandle;
use crate::task::{CancelSignal, TaskCompletion};

type Job = Box<dyn FnOnce(CancelSignal) -> BoxFuture<'static, ()> + Send>;

/// How [`TaskSequencer::drain_and_close`] treats the current task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// Let the current task run to completion.
    Graceful,
    /// Signal cancellation to the current task, then wait for it to unwind.
    Cancel,
}

/// Proof that a sequencer has been drained: no task is current or queued and
/// none will ever start.
#[derive(Debug)]
#[must_use]
pub struct Drained {
    name: String,
}

impl Drained {
    /// Name of the drained sequencer.
    pub fn name(&self) -> &str {
        &self.name
    }
}

struct Shared {
    name: String,
    capacity: usize,
    discarding: AtomicBool,
    busy: AtomicBool,
    /// Current task plus queued tasks.
    outstanding: AtomicUsize,
    root: CancelSignal,
    current: Mutex<Option<CancelSignal>>,
}

/// FIFO of async tasks with at most one task current.
pub struct TaskSequencer {
    shared: Arc<Shared>,
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    done: watch::Receiver<bool>,
}

impl TaskSequencer {
    /// Creates a sequencer whose tasks run on `executor`, accepting at most
    /// `capacity` tasks waiting behind the current one.
    pub fn new(
        name: impl Into<String>,
        executor: &ExecutorHandle,
        capacity: usize,
    ) -> Result<Self, SequencerError> {
        let name = name.into();
        let shared = Arc::new(Shared {
            name: name.clone(),
            capacity,
            discarding: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            outstanding: AtomicUsize::new(0),
            root: CancelSignal::new(),
            current: Mutex::new(None),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done) = watch::channel(false);
        let span = tracing::debug_span!("sequencer", name = %name);
        let run = run_loop(shared.clone(), rx, done_tx).instrument(span);
        if !executor.spawn(run.boxed()) {
            return Err(SequencerError::ExecutorStopped(name));
        }

        Ok(Self {
            shared,
            tx: Mutex::new(Some(tx)),
            done,
        })
    }

    /// Sequencer name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Appends a task. `task` is called with the task's cancellation signal
    /// when the task becomes current.
    pub fn schedule<F, Fut, T>(&self, task: F) -> Result<TaskCompletion<T>, SequencerError>
    where
        F: FnOnce(CancelSignal) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::new(move |cancel| {
            async move {
                let output = task(cancel).await;
                let _ = done_tx.send(output);
            }
            .boxed()
        });

        let guard = self.tx.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(SequencerError::Closed(self.shared.name.clone()));
        };
        // The head task counts whether or not the loop has dequeued it yet.
        let outstanding = self.shared.outstanding.load(Ordering::SeqCst);
        if outstanding > self.shared.capacity {
            return Err(SequencerError::QueueFull {
                name: self.shared.name.clone(),
                capacity: self.shared.capacity,
            });
        }
        self.shared.outstanding.fetch_add(1, Ordering::SeqCst);
        if sender.send(job).is_err() {
            self.shared.outstanding.fetch_sub(1, Ordering::SeqCst);
            return Err(SequencerError::Closed(self.shared.name.clone()));
        }
        trace!("{}: task scheduled", self.shared.name);
        Ok(TaskCompletion::new(done_rx))
    }

    /// Signals cancellation to the current task, if any.
    pub fn cancel_current(&self) -> bool {
        match self.shared.current.lock().as_ref() {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of tasks waiting behind the current one.
    pub fn pending(&self) -> usize {
        let busy = usize::from(self.is_busy());
        self.shared.outstanding.load(Ordering::SeqCst).saturating_sub(busy)
    }

    /// Returns true while a task is current.
    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::SeqCst)
    }

    /// Returns true once the sequencer rejects new tasks.
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Stops accepting tasks, discards the queued ones and waits until the
    /// current task, if any, has completed.
    ///
    /// Must not be awaited from a task of this same sequencer: that task would
    /// wait for itself.
    pub async fn drain_and_close(&self, mode: DrainMode) -> Drained {
        self.close();
        if mode == DrainMode::Cancel {
            self.shared.root.cancel();
        }
        let mut done = self.done.clone();
        // An error means the loop was dropped with its executor: nothing runs.
        let _ = done.wait_for(|finished| *finished).await;
        debug!("{}: drained", self.shared.name);
        Drained {
            name: self.shared.name.clone(),
        }
    }

    fn close(&self) {
        self.shared.discarding.store(true, Ordering::SeqCst);
        self.tx.lock().take();
    }
}

impl Drop for TaskSequencer {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TaskSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSequencer")
            .field("name", &self.shared.name)
            .field("busy", &self.is_busy())
            .field("pending", &self.pending())
            .finish()
    }
}

async fn run_loop(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<Job>,
    done: watch::Sender<bool>,
) {
    while let Some(job) = rx.recv().await {
        if shared.discarding.load(Ordering::SeqCst) {
            trace!("{}: discarding queued task", shared.name);
            shared.outstanding.fetch_sub(1, Ordering::SeqCst);
            continue;
        }

        let was_busy = shared.busy.swap(true, Ordering::SeqCst);
        debug_assert!(!was_busy, "two tasks current on sequencer {}", shared.name);

        let cancel = shared.root.child();
        *shared.current.lock() = Some(cancel.clone());
        job(cancel).await;
        *shared.current.lock() = None;
        shared.outstanding.fetch_sub(1, Ordering::SeqCst);
        shared.busy.store(false, Ordering::SeqCst);
    }
    let _ = done.send(true);
}
