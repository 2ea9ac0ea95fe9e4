//! Tick driver
//!
//! Calls [`TimerManager::tick`] once per radio time unit from a tokio interval
//! until stopped. Missed ticks are delivered in a burst so the logical clock
//! does not drift behind wall time.

use std::time::Duration;

use nextgran_async::TimerManager;
use nextgran_common::TickConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Periodic driver of a [`TimerManager`].
#[derive(Debug)]
pub struct TickDriver {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<u64>,
}

impl TickDriver {
    /// Starts ticking `timers` every `period` on the current tokio runtime.
    pub fn start(timers: TimerManager, period: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            // The first interval tick completes immediately.
            interval.tick().await;

            let mut ticks = 0u64;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        timers.tick();
                        ticks += 1;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Tick driver stopped after {} ticks", ticks);
            ticks
        });
        Self { shutdown, task }
    }

    /// Starts ticking at the cadence of `config`.
    pub fn from_config(timers: TimerManager, config: &TickConfig) -> Self {
        Self::start(timers, config.tick_duration())
    }

    /// Stops the driver and returns the number of ticks delivered.
    pub async fn stop(self) -> u64 {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(ticks) => ticks,
            Err(e) => {
                warn!("Tick driver task failed: {}", e);
                0
            }
        }
    }
}
