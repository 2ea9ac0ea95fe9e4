//! Task Executors
//!
//! An executor accepts units of work and runs them in submission order on a
//! single thread, never reentering. Procedures are posted to an executor as
//! futures; a future occupies the thread only until its next await point, so
//! one thread serves many entities.
//!
//! # Latency domains
//!
//! The wiring layer creates one executor per radio cell for slot-level work and
//! one or more shared executors for control-plane procedures. Components only
//! ever receive an [`ExecutorHandle`]; they never create executors themselves.
//! Handing work to another component's executor is done by posting to that
//! component's handle.
//!
//! Work items must not block: a blocking call stalls every entity that shares
//! the executor.

use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ExecutorError;

/// A ready-to-run unit of work.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Single logical worker that runs posted work strictly in order.
pub trait TaskExecutor: Send + Sync {
    /// Name of the executor, used in logs.
    fn name(&self) -> &str;

    /// Posts `work` to run after everything already queued.
    ///
    /// Returns `false` if the executor no longer accepts work.
    fn execute(&self, work: Work) -> bool;

    /// Posts `work` to run on the next iteration of the executor, after any
    /// futures that are ready right now had a chance to progress.
    fn defer(&self, work: Work) -> bool {
        self.execute(work)
    }

    /// Starts `future` on this executor. The future runs on the executor's
    /// thread and yields it at each of its await points.
    fn spawn(&self, future: BoxFuture<'static, ()>) -> bool;
}

/// Shared reference to an executor, as handed out by the wiring layer.
pub type ExecutorHandle = Arc<dyn TaskExecutor>;

enum Job {
    Work(Work),
    Deferred(Work),
    Future(BoxFuture<'static, ()>),
}

/// Executor backed by one dedicated OS thread.
///
/// The thread hosts a current-thread tokio runtime. Posted closures are run in
/// arrival order; spawned futures are driven by the same runtime and therefore
/// never run in parallel with the closures or with each other.
pub struct WorkerExecutor {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl WorkerExecutor {
    /// Starts a new worker thread with the given name.
    pub fn start(name: impl Into<String>) -> Result<Arc<Self>, ExecutorError> {
        let name = name.into();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| ExecutorError::Start {
                name: name.clone(),
                source,
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let span = tracing::debug_span!("executor", name = %name);
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _entered = span.enter();
                runtime.block_on(drain_queue(rx));
                debug!("Executor queue closed, worker exiting");
            })
            .map_err(|source| ExecutorError::Start {
                name: name.clone(),
                source,
            })?;

        let thread_id = thread.thread().id();
        debug!("Started executor {}", name);

        Ok(Arc::new(Self {
            name,
            tx: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(thread)),
            thread_id,
        }))
    }

    /// Returns a type-erased handle to this executor.
    pub fn handle(self: &Arc<Self>) -> ExecutorHandle {
        self.clone()
    }

    /// Returns true while the executor accepts work.
    pub fn is_running(&self) -> bool {
        self.tx.lock().is_some()
    }

    /// Stops accepting work and waits for the worker thread to finish the
    /// work already queued. Futures still suspended at that point are dropped.
    ///
    /// When called from the executor's own thread the join is skipped.
    pub fn stop(&self) {
        let Some(tx) = self.tx.lock().take() else {
            return;
        };
        drop(tx);

        if thread::current().id() == self.thread_id {
            return;
        }
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                warn!("Executor {} worker thread panicked", self.name);
            }
        }
        debug!("Stopped executor {}", self.name);
    }

    fn post(&self, job: Job) -> bool {
        let accepted = match self.tx.lock().as_ref() {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        };
        if !accepted {
            warn!("Executor {} is stopped, dropping work item", self.name);
        }
        accepted
    }
}

impl TaskExecutor for WorkerExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, work: Work) -> bool {
        self.post(Job::Work(work))
    }

    fn defer(&self, work: Work) -> bool {
        self.post(Job::Deferred(work))
    }

    fn spawn(&self, future: BoxFuture<'static, ()>) -> bool {
        self.post(Job::Future(future))
    }
}

impl Drop for WorkerExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WorkerExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerExecutor")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn drain_queue(mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Work(work) => work(),
            Job::Deferred(work) => {
                tokio::task::yield_now().await;
                work();
            }
            Job::Future(future) => {
                tokio::spawn(future);
            }
        }
    }
}

/// Executor that runs posted closures immediately on the caller's thread.
///
/// Futures are spawned on the ambient tokio runtime. Intended for glue code
/// and tests where the caller already provides the serialization.
#[derive(Debug, Clone)]
pub struct InlineExecutor {
    name: String,
}

impl InlineExecutor {
    /// Creates a new inline executor.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Creates a type-erased handle to a new inline executor.
    pub fn handle(name: impl Into<String>) -> ExecutorHandle {
        Arc::new(Self::new(name))
    }
}

impl TaskExecutor for InlineExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, work: Work) -> bool {
        work();
        true
    }

    fn spawn(&self, future: BoxFuture<'static, ()>) -> bool {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(future);
                true
            }
            Err(_) => {
                warn!("Inline executor {} has no runtime to spawn on", self.name);
                false
            }
        }
    }
}
