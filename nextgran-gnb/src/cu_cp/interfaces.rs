//! Capability interfaces of the DU processor
//!
//! Collaborators depend on the narrowest of these rather than on
//! [`DuProcessor`](super::DuProcessor) itself.

use async_trait::async_trait;
use nextgran_async::{AsyncTask, CancelSignal, TaskCompletion};

use super::ue_manager::UeState;
use crate::error::ProcedureError;
use crate::f1ap::F1SetupRequest;
use crate::types::{DrbId, F1apCause, UeHandle, UeIndex};

/// A UE procedure, built from its cancellation signal when it becomes current.
pub type UeTask = Box<dyn FnOnce(CancelSignal) -> AsyncTask<()> + Send>;

/// Accepts F1 Setup Requests from a DU.
pub trait F1SetupHandler: Send + Sync {
    /// Validates the DU's cells and answers with F1 Setup Response or Failure.
    fn handle_f1_setup_request(&self, request: F1SetupRequest);
}

/// Read access to the UEs of a DU.
pub trait UeRepository: Send + Sync {
    /// Resolves a wire index to a live UE.
    fn find_ue(&self, ue_index: UeIndex) -> Option<UeHandle>;

    /// Lifecycle state of a UE.
    fn ue_state(&self, ue: UeHandle) -> Result<UeState, ProcedureError>;

    /// Number of live UEs.
    fn nof_ues(&self) -> usize;
}

/// Runs work on a UE's task sequencer.
pub trait UeTaskScheduler: Send + Sync {
    /// Queues `task` behind the UE's current procedure.
    fn handle_ue_async_task(
        &self,
        ue: UeHandle,
        task: UeTask,
    ) -> Result<TaskCompletion<()>, ProcedureError>;
}

/// Drives a UE through context setup and release.
#[async_trait]
pub trait UeLifecycleHandler: Send + Sync {
    /// Sets up the UE context at the DU and waits for the outcome.
    async fn setup_ue(&self, ue: UeHandle, drbs: Vec<DrbId>) -> Result<(), ProcedureError>;

    /// Releases the UE context and removes the UE once its procedures drained.
    async fn release_ue(&self, ue: UeHandle, cause: F1apCause) -> Result<(), ProcedureError>;
}
