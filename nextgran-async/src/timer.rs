//! Tick-driven timers
//!
//! Timers do not own threads. An external driver calls [`TimerManager::tick`]
//! once per radio time unit; every timer whose deadline has been reached is
//! marked expired and its callback is posted onto the executor the timer was
//! created with.
//!
//! Every `run()`/`stop()` bumps the timer's epoch. An expiry posted for an older
//! epoch, or for a timer that has since been dropped, does nothing when it
//! finally runs, so a late expiry can never resume a task twice.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use nextgran_common::RadioTick;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{trace, warn};

use crate::executor::ExecutorHandle;

/// Identifier of a timer within its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Returns the raw identifier value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Stopped,
    Running,
    Expired,
}

struct TimerEntry {
    executor: ExecutorHandle,
    state: TimerState,
    duration: u64,
    deadline: RadioTick,
    epoch: u64,
    callback: Option<Callback>,
}

struct TimerTable {
    now: RadioTick,
    next_id: u64,
    timers: HashMap<TimerId, TimerEntry>,
}

struct TimerDb {
    table: Mutex<TimerTable>,
}

impl TimerDb {
    fn is_current_expiry(&self, id: TimerId, epoch: u64) -> bool {
        self.table
            .lock()
            .timers
            .get(&id)
            .is_some_and(|entry| entry.epoch == epoch && entry.state == TimerState::Expired)
    }

    fn with_entry<R>(&self, id: TimerId, f: impl FnOnce(&mut TimerEntry, RadioTick) -> R) -> Option<R> {
        let mut table = self.table.lock();
        let now = table.now;
        table.timers.get_mut(&id).map(|entry| f(entry, now))
    }
}

/// Owner of the logical clock and of every timer created from it.
///
/// Cloning the manager yields another handle to the same clock.
#[derive(Clone)]
pub struct TimerManager {
    db: Arc<TimerDb>,
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerManager {
    /// Creates a manager with its clock at tick 0.
    pub fn new() -> Self {
        Self {
            db: Arc::new(TimerDb {
                table: Mutex::new(TimerTable {
                    now: RadioTick::initial(),
                    next_id: 0,
                    timers: HashMap::new(),
                }),
            }),
        }
    }

    /// Current logical time.
    pub fn now(&self) -> RadioTick {
        self.db.table.lock().now
    }

    /// Creates a stopped timer whose expiries are posted to `executor`.
    pub fn create_timer(&self, executor: ExecutorHandle) -> UniqueTimer {
        let mut table = self.db.table.lock();
        let id = TimerId(table.next_id);
        table.next_id += 1;
        table.timers.insert(
            id,
            TimerEntry {
                executor,
                state: TimerState::Stopped,
                duration: 0,
                deadline: RadioTick::initial(),
                epoch: 0,
                callback: None,
            },
        );
        UniqueTimer {
            id,
            db: self.db.clone(),
        }
    }

    /// Advances the clock by one tick and fires every timer whose deadline
    /// has been reached. Returns the number of expiries posted.
    pub fn tick(&self) -> usize {
        let expired: Vec<(ExecutorHandle, TimerId, u64, Callback)> = {
            let mut table = self.db.table.lock();
            table.now.next();
            let now = table.now;
            table
                .timers
                .iter_mut()
                .filter(|(_, entry)| entry.state == TimerState::Running && entry.deadline <= now)
                .filter_map(|(id, entry)| {
                    entry.state = TimerState::Expired;
                    entry
                        .callback
                        .clone()
                        .map(|callback| (entry.executor.clone(), *id, entry.epoch, callback))
                })
                .collect()
        };

        let mut posted = 0;
        for (executor, id, epoch, callback) in expired {
            trace!("{} expired (epoch {})", id, epoch);
            let db = self.db.clone();
            let accepted = executor.execute(Box::new(move || {
                if db.is_current_expiry(id, epoch) {
                    callback();
                }
            }));
            if accepted {
                posted += 1;
            } else {
                warn!("Dropping expiry of {}: executor {} stopped", id, executor.name());
            }
        }
        posted
    }

    /// Number of live timers.
    pub fn nof_timers(&self) -> usize {
        self.db.table.lock().timers.len()
    }

    /// Number of running timers.
    pub fn nof_running(&self) -> usize {
        self.db
            .table
            .lock()
            .timers
            .values()
            .filter(|entry| entry.state == TimerState::Running)
            .count()
    }
}

impl std::fmt::Debug for TimerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.db.table.lock();
        f.debug_struct("TimerManager")
            .field("now", &table.now)
            .field("timers", &table.timers.len())
            .finish()
    }
}

/// Timer exclusively owned by one component. Dropping it destroys the timer.
pub struct UniqueTimer {
    id: TimerId,
    db: Arc<TimerDb>,
}

impl UniqueTimer {
    /// Identifier of this timer.
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Sets the duration and the expiry callback. A running timer is stopped;
    /// call [`run`](Self::run) to start it.
    pub fn set<F>(&mut self, ticks: u64, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.db.with_entry(self.id, |entry, _| {
            entry.epoch += 1;
            entry.state = TimerState::Stopped;
            entry.duration = ticks;
            entry.callback = Some(Arc::new(callback));
        });
    }

    /// Starts, or restarts, the timer with its configured duration.
    pub fn run(&mut self) {
        self.db.with_entry(self.id, |entry, now| {
            entry.epoch += 1;
            entry.state = TimerState::Running;
            entry.deadline = now.advanced_by(entry.duration);
        });
    }

    /// Stops the timer. A pending expiry for it becomes a no-op.
    pub fn stop(&mut self) {
        self.db.with_entry(self.id, |entry, _| {
            entry.epoch += 1;
            entry.state = TimerState::Stopped;
        });
    }

    /// Returns true while the timer is running.
    pub fn is_running(&self) -> bool {
        self.state() == Some(TimerState::Running)
    }

    /// Returns true if the timer expired and was not restarted or stopped since.
    pub fn has_expired(&self) -> bool {
        self.state() == Some(TimerState::Expired)
    }

    /// Configured duration in ticks.
    pub fn duration(&self) -> u64 {
        self.db.with_entry(self.id, |entry, _| entry.duration).unwrap_or(0)
    }

    /// Arms the timer for `ticks` and returns a future that completes on expiry.
    ///
    /// If the timer is stopped, re-armed or dropped before expiring, the
    /// returned future never completes; race it against the awaited event.
    pub fn wait(&mut self, ticks: u64) -> TimerExpiry {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        self.set(ticks, move || {
            if let Some(tx) = slot.lock().take() {
                let _ = tx.send(());
            }
        });
        self.run();
        TimerExpiry { rx }
    }

    fn state(&self) -> Option<TimerState> {
        self.db.with_entry(self.id, |entry, _| entry.state)
    }
}

impl Drop for UniqueTimer {
    fn drop(&mut self) {
        self.db.table.lock().timers.remove(&self.id);
    }
}

impl std::fmt::Debug for UniqueTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniqueTimer")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Future completing when an armed timer expires.
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct TimerExpiry {
    rx: oneshot::Receiver<()>,
}

impl Future for TimerExpiry {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(()),
            // Re-armed or dropped: this arming can no longer fire.
            Poll::Ready(Err(_)) | Poll::Pending => Poll::Pending,
        }
    }
}
