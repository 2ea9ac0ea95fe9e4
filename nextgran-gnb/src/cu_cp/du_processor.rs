//! DU processor
//!
//! CU-CP side of one F1 connection. It owns the cells the DU announced in
//! F1 Setup and the UEs served by them.
//!
//! ```text
//!   F1apRouter ──▶ DuProcessor::handle_message
//!                     │
//!                     ├── F1 Setup Request ──▶ cell registry ──▶ Response / Failure
//!                     └── UE outcomes ──▶ transactions ──▶ wakes the UE procedure
//!
//!   UE procedures:  handle_ue_context_setup / release_ue
//!                     └── UeManager::schedule ──▶ UE sequencer (UE executor)
//! ```
//!
//! Everything done on behalf of one UE is scheduled on that UE's sequencer.
//! `release_ue` awaits the release procedure from outside the sequencer,
//! then drains it and removes the UE.

use std::sync::Arc;

use async_trait::async_trait;
use nextgran_async::{
    DrainMode, EntityRegistry, ProtocolTransactionManager, TaskCompletion, TaskOutcome,
    TimerManager, TransactionId, UniqueTimer,
};
use nextgran_common::{StackConfig, TimerConfig};
use parking_lot::Mutex;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use super::interfaces::{F1SetupHandler, UeLifecycleHandler, UeRepository, UeTask, UeTaskScheduler};
use super::ue_context_release::UeContextReleaseProcedure;
use super::ue_context_setup::UeContextSetupProcedure;
use super::ue_manager::{UeManager, UeManagerConfig, UeState};
use crate::error::ProcedureError;
use crate::f1ap::{
    DecodeError, F1SetupFailure, F1SetupRequest, F1SetupResponse, F1apMessage,
    F1apMessageHandler, F1apMessageNotifier, RrcCodec, ServedCell,
};
use crate::types::{
    Cell, CellHandle, CellIndex, DrbId, F1apCause, SrbId, UeHandle, UeIndex,
};
use crate::workers::UeExecutorMapper;

/// Completion of a UE procedure scheduled by the DU processor.
pub type UeProcedureCompletion = TaskCompletion<Result<(), ProcedureError>>;

/// Parameters of a [`DuProcessor`]
#[derive(Debug, Clone)]
pub struct DuProcessorConfig {
    /// gNB-CU name sent in F1 Setup Response
    pub gnb_cu_name: String,
    /// Maximum number of cells per DU
    pub max_cells: usize,
    /// UE limits
    pub ues: UeManagerConfig,
    /// Procedure timers
    pub timers: TimerConfig,
}

impl DuProcessorConfig {
    /// Takes the limits and timers of `config`.
    pub fn from_stack_config(config: &StackConfig, gnb_cu_name: impl Into<String>) -> Self {
        Self {
            gnb_cu_name: gnb_cu_name.into(),
            max_cells: config.max_cells,
            ues: UeManagerConfig {
                max_ues: config.max_ues,
                task_queue_capacity: config.ue_task_queue_capacity,
                max_drbs_per_ue: config.max_drbs_per_ue,
            },
            timers: config.timers,
        }
    }
}

/// Cell of a connected DU as known to the CU-CP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuCellContext {
    /// NR Cell Identity
    pub nci: u64,
    /// Physical cell id
    pub pci: u16,
    /// Tracking area code
    pub tac: u32,
}

impl From<&ServedCell> for CuCellContext {
    fn from(cell: &ServedCell) -> Self {
        Self {
            nci: cell.nci,
            pci: cell.pci,
            tac: cell.tac,
        }
    }
}

/// CU-CP handler of one DU.
pub struct DuProcessor {
    config: DuProcessorConfig,
    gnb_du_id: Mutex<Option<u64>>,
    cells: EntityRegistry<Cell, CuCellContext>,
    ues: UeManager,
    transactions: ProtocolTransactionManager<F1apMessage>,
    notifier: Arc<dyn F1apMessageNotifier>,
    rrc: Arc<dyn RrcCodec>,
    timers: TimerManager,
    span: Span,
}

impl DuProcessor {
    /// Creates a processor answering the DU through `notifier`.
    pub fn new(
        config: DuProcessorConfig,
        ue_executors: Arc<dyn UeExecutorMapper>,
        timers: TimerManager,
        notifier: Arc<dyn F1apMessageNotifier>,
        rrc: Arc<dyn RrcCodec>,
        span: Span,
    ) -> Self {
        Self {
            cells: EntityRegistry::with_capacity(CellIndex::clamp_capacity(config.max_cells)),
            ues: UeManager::new(config.ues, ue_executors, span.clone()),
            config,
            gnb_du_id: Mutex::new(None),
            transactions: ProtocolTransactionManager::new("cu-f1ap"),
            notifier,
            rrc,
            timers,
            span,
        }
    }

    // ========================================================================
    // Cells
    // ========================================================================

    /// Handles F1 Setup Request: registers the served cells and answers.
    /// Either all cells are registered or none is.
    pub fn handle_f1_setup_request(&self, request: F1SetupRequest) {
        let _entered = self.span.enter();
        info!(
            "F1 Setup Request from DU {} ({}): {} cells",
            request.gnb_du_id,
            request.gnb_du_name,
            request.served_cells.len()
        );

        match self.add_cells(&request.served_cells) {
            Ok(cells_to_activate) => {
                *self.gnb_du_id.lock() = Some(request.gnb_du_id);
                self.send_f1_setup_response(request.transaction_id, cells_to_activate);
            }
            Err(e) => {
                warn!("Rejecting F1 Setup from DU {}: {}", request.gnb_du_id, e);
                self.send_f1_setup_failure(request.transaction_id, e.cause());
            }
        }
    }

    fn add_cells(&self, served_cells: &[ServedCell]) -> Result<Vec<u64>, ProcedureError> {
        if served_cells.is_empty() {
            return Err(ProcedureError::Protocol("no served cells".to_string()));
        }

        let mut added: Vec<CellHandle> = Vec::with_capacity(served_cells.len());
        let result = served_cells.iter().try_for_each(|cell| {
            if self.find_cell(cell.nci).is_some() {
                return Err(ProcedureError::Rejected {
                    cause: F1apCause::CellNotAvailable,
                });
            }
            let handle = self.cells.allocate(CuCellContext::from(cell))?;
            debug!("Cell {} registered: nci={:#x}, pci={}", handle, cell.nci, cell.pci);
            added.push(handle);
            Ok(())
        });

        match result {
            Ok(()) => Ok(served_cells.iter().map(|cell| cell.nci).collect()),
            Err(e) => {
                for handle in added {
                    let _ = self.cells.release(handle);
                }
                Err(e)
            }
        }
    }

    fn send_f1_setup_response(&self, transaction_id: TransactionId, cells_to_activate: Vec<u64>) {
        info!("Sending F1 Setup Response: {} cells to activate", cells_to_activate.len());
        self.notifier
            .on_new_message(F1apMessage::F1SetupResponse(F1SetupResponse {
                transaction_id,
                gnb_cu_name: self.config.gnb_cu_name.clone(),
                cells_to_activate,
            }));
    }

    fn send_f1_setup_failure(&self, transaction_id: TransactionId, cause: F1apCause) {
        self.notifier
            .on_new_message(F1apMessage::F1SetupFailure(F1SetupFailure {
                transaction_id,
                cause,
                time_to_wait: None,
            }));
    }

    /// Finds a registered cell by NCI.
    pub fn find_cell(&self, nci: u64) -> Option<CellHandle> {
        self.cells.find(|cell| cell.nci == nci)
    }

    /// A registered cell.
    pub fn cell(&self, handle: CellHandle) -> Result<CuCellContext, ProcedureError> {
        Ok(self.cells.get(handle)?)
    }

    /// Number of registered cells.
    pub fn nof_cells(&self) -> usize {
        self.cells.len()
    }

    /// gNB-DU ID received in F1 Setup, once set up.
    pub fn gnb_du_id(&self) -> Option<u64> {
        *self.gnb_du_id.lock()
    }

    // ========================================================================
    // UEs
    // ========================================================================

    /// Creates a UE in the cell `pcell_nci` with SRB0 established.
    pub fn handle_ue_creation_request(
        &self,
        pcell_nci: u64,
        c_rnti: u16,
    ) -> Result<UeHandle, ProcedureError> {
        let Some(pcell) = self.find_cell(pcell_nci) else {
            self.span
                .in_scope(|| warn!("UE creation in unknown cell {:#x}", pcell_nci));
            return Err(ProcedureError::Rejected {
                cause: F1apCause::CellNotAvailable,
            });
        };

        let ue = match self.ues.add_ue(pcell, c_rnti) {
            Ok(ue) => ue,
            Err(e) => {
                self.span.in_scope(|| warn!("UE creation rejected: {}", e));
                return Err(e);
            }
        };
        self.create_srb(ue, SrbId::SRB0)?;
        Ok(ue)
    }

    /// Adds an established SRB to a UE.
    pub fn create_srb(&self, ue: UeHandle, srb: SrbId) -> Result<(), ProcedureError> {
        self.ues.get_ue(ue)?.with_bearers(|bearers| bearers.add_srb(srb))
    }

    /// Schedules UE Context Setup with `drbs` on the UE's sequencer.
    pub fn handle_ue_context_setup(
        &self,
        ue: UeHandle,
        drbs: Vec<DrbId>,
    ) -> Result<UeProcedureCompletion, ProcedureError> {
        let context = self.ues.get_ue(ue)?;
        let pcell_nci = self.cells.with(context.pcell(), |cell| cell.nci)?;
        let procedure = UeContextSetupProcedure::new(
            context,
            pcell_nci,
            drbs,
            self.transactions.clone(),
            self.notifier.clone(),
            self.rrc.clone(),
            self.make_unique_timer(ue)?,
            self.config.timers.ue_context_setup_timeout_ticks,
        );
        let span = self.ue_span(ue);
        self.ues
            .schedule(ue, move |cancel| procedure.run(cancel).instrument(span))
    }

    /// Schedules UE Context Release on the UE's sequencer. The UE stays in
    /// the registry; see [`release_ue`](Self::release_ue).
    pub fn handle_ue_context_release_command(
        &self,
        ue: UeHandle,
        cause: F1apCause,
    ) -> Result<UeProcedureCompletion, ProcedureError> {
        let procedure = UeContextReleaseProcedure::new(
            self.ues.get_ue(ue)?,
            cause,
            self.transactions.clone(),
            self.notifier.clone(),
            self.rrc.clone(),
            self.make_unique_timer(ue)?,
            self.config.timers.ue_context_release_timeout_ticks,
        );
        let span = self.ue_span(ue);
        self.ues
            .schedule(ue, move |cancel| procedure.run(cancel).instrument(span))
    }

    /// Releases a UE: runs the release procedure behind whatever the UE is
    /// doing, then drains its sequencer and frees its index.
    ///
    /// Must not be awaited from one of the UE's own procedures.
    pub async fn release_ue(&self, ue: UeHandle, cause: F1apCause) -> Result<(), ProcedureError> {
        let completion = self.handle_ue_context_release_command(ue, cause)?;
        let result = match completion.await {
            TaskOutcome::Completed(result) => result,
            TaskOutcome::Discarded => Err(ProcedureError::Cancelled),
        };
        self.ues.teardown_ue(ue, DrainMode::Graceful).await?;
        result
    }

    /// Signals cancellation to the UE's current procedure.
    pub fn cancel_ue_procedure(&self, ue: UeHandle) -> Result<bool, ProcedureError> {
        Ok(self.ues.get_ue(ue)?.sequencer().cancel_current())
    }

    /// Queues `task` on the UE's sequencer.
    pub fn handle_ue_async_task(
        &self,
        ue: UeHandle,
        task: UeTask,
    ) -> Result<TaskCompletion<()>, ProcedureError> {
        self.ues.schedule(ue, task)
    }

    /// Creates a timer whose expiries run on the UE's executor.
    pub fn make_unique_timer(&self, ue: UeHandle) -> Result<UniqueTimer, ProcedureError> {
        let context = self.ues.get_ue(ue)?;
        Ok(self.timers.create_timer(context.executor().clone()))
    }

    /// Timer manager driving this processor's procedures.
    pub fn timer_manager(&self) -> &TimerManager {
        &self.timers
    }

    /// UE contexts of this DU.
    pub fn ue_manager(&self) -> &UeManager {
        &self.ues
    }

    /// Number of live UEs.
    pub fn nof_ues(&self) -> usize {
        self.ues.nof_ues()
    }

    /// Cancels every UE procedure and removes all UEs.
    pub async fn shutdown(&self) {
        for ue in self.ues.ues() {
            if let Err(e) = self.ues.teardown_ue(ue, DrainMode::Cancel).await {
                self.span.in_scope(|| warn!("UE {} teardown: {}", ue, e));
            }
        }
        self.transactions.cancel_all();
        self.span.in_scope(|| info!("DU processor shut down"));
    }

    fn ue_span(&self, ue: UeHandle) -> Span {
        info_span!(parent: &self.span, "ue", ue = %ue)
    }

    fn handle_ue_outcome(&self, msg: F1apMessage) {
        let id = msg.transaction_id();
        let known_ue = msg
            .ue_index()
            .and_then(|index| self.ues.find_ue(index))
            .is_some();
        if !known_ue {
            warn!("{} for unknown UE, transaction {}", msg.name(), id);
        }
        if !self.transactions.set_response(id, msg) {
            warn!("Discarding outcome for unknown transaction {}", id);
        }
    }
}

impl std::fmt::Debug for DuProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuProcessor")
            .field("gnb_du_id", &self.gnb_du_id())
            .field("cells", &self.cells)
            .field("ues", &self.ues)
            .finish()
    }
}

impl F1apMessageHandler for DuProcessor {
    fn handle_message(&self, msg: F1apMessage) {
        match msg {
            F1apMessage::F1SetupRequest(request) => self.handle_f1_setup_request(request),
            F1apMessage::UeContextSetupResponse(_)
            | F1apMessage::UeContextSetupFailure(_)
            | F1apMessage::UeContextReleaseComplete(_) => {
                let _entered = self.span.enter();
                self.handle_ue_outcome(msg)
            }
            other => self
                .span
                .in_scope(|| warn!("Unexpected {} at CU-CP", other.name())),
        }
    }

    fn handle_decode_error(&self, transaction_id: TransactionId, error: DecodeError) {
        let _entered = self.span.enter();
        if !self.transactions.set_failure(transaction_id, error.reason) {
            debug!("Undecodable PDU for unknown transaction {}", transaction_id);
        }
    }
}

impl F1SetupHandler for DuProcessor {
    fn handle_f1_setup_request(&self, request: F1SetupRequest) {
        DuProcessor::handle_f1_setup_request(self, request)
    }
}

impl UeRepository for DuProcessor {
    fn find_ue(&self, ue_index: UeIndex) -> Option<UeHandle> {
        self.ues.find_ue(ue_index)
    }

    fn ue_state(&self, ue: UeHandle) -> Result<UeState, ProcedureError> {
        Ok(self.ues.get_ue(ue)?.state())
    }

    fn nof_ues(&self) -> usize {
        self.ues.nof_ues()
    }
}

impl UeTaskScheduler for DuProcessor {
    fn handle_ue_async_task(
        &self,
        ue: UeHandle,
        task: UeTask,
    ) -> Result<TaskCompletion<()>, ProcedureError> {
        DuProcessor::handle_ue_async_task(self, ue, task)
    }
}

#[async_trait]
impl UeLifecycleHandler for DuProcessor {
    async fn setup_ue(&self, ue: UeHandle, drbs: Vec<DrbId>) -> Result<(), ProcedureError> {
        match self.handle_ue_context_setup(ue, drbs)?.await {
            TaskOutcome::Completed(result) => result,
            TaskOutcome::Discarded => Err(ProcedureError::Cancelled),
        }
    }

    async fn release_ue(&self, ue: UeHandle, cause: F1apCause) -> Result<(), ProcedureError> {
        DuProcessor::release_ue(self, ue, cause).await
    }
}
