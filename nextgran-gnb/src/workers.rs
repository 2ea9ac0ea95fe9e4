//! Worker pool
//!
//! Builds the executors the stack runs on and hands out handles to them:
//!
//! ```text
//!   control   ──▶ DU manager, DU processor, F1 setup
//!   cell[i]   ──▶ slot-level work of cell i
//!   ue[j]     ──▶ UE sequencers, UE index modulo number of UE workers
//! ```
//!
//! Components never create executors themselves; they receive handles from
//! the pool at construction.

use std::sync::Arc;

use nextgran_async::{ExecutorError, ExecutorHandle, WorkerExecutor};
use tracing::info;

use crate::types::{CellIndex, UeIndex};

/// Picks the executor a UE's procedures run on.
pub trait UeExecutorMapper: Send + Sync {
    /// Executor for `ue_index`.
    fn ue_executor(&self, ue_index: UeIndex) -> ExecutorHandle;
}

/// Maps every UE to the same executor.
pub struct SingleExecutorMapper(pub ExecutorHandle);

impl UeExecutorMapper for SingleExecutorMapper {
    fn ue_executor(&self, _ue_index: UeIndex) -> ExecutorHandle {
        self.0.clone()
    }
}

/// Fixed set of worker threads, one per latency domain.
#[derive(Debug)]
pub struct WorkerPool {
    control: Arc<WorkerExecutor>,
    cells: Vec<Arc<WorkerExecutor>>,
    ues: Vec<Arc<WorkerExecutor>>,
}

impl WorkerPool {
    /// Starts one control worker, `nof_cells` cell workers and
    /// `nof_ue_workers` UE workers (at least one).
    pub fn start(nof_cells: usize, nof_ue_workers: usize) -> Result<Self, ExecutorError> {
        let control = WorkerExecutor::start("ctrl")?;
        let cells = (0..nof_cells)
            .map(|i| WorkerExecutor::start(format!("cell{}", i)))
            .collect::<Result<Vec<_>, _>>()?;
        let ues = (0..nof_ue_workers.max(1))
            .map(|i| WorkerExecutor::start(format!("ue{}", i)))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Worker pool started: 1 control, {} cell, {} UE workers",
            cells.len(),
            ues.len()
        );
        Ok(Self { control, cells, ues })
    }

    /// Control-plane executor.
    pub fn control_executor(&self) -> ExecutorHandle {
        self.control.handle()
    }

    /// Executor of cell `index`, if the pool has one.
    pub fn cell_executor(&self, index: CellIndex) -> Option<ExecutorHandle> {
        self.cells.get(index.as_usize()).map(|e| e.handle())
    }

    /// Number of UE workers.
    pub fn nof_ue_workers(&self) -> usize {
        self.ues.len()
    }

    /// Stops every worker after the work already queued.
    pub fn stop(&self) {
        for worker in self.ues.iter().chain(&self.cells) {
            worker.stop();
        }
        self.control.stop();
        info!("Worker pool stopped");
    }
}

impl UeExecutorMapper for WorkerPool {
    fn ue_executor(&self, ue_index: UeIndex) -> ExecutorHandle {
        self.ues[ue_index.as_usize() % self.ues.len()].handle()
    }
}
