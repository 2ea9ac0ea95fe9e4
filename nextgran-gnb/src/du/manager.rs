//! DU manager
//!
//! Owns the DU's served cells and its F1 interface towards the CU-CP:
//!
//! ```text
//!   ┌──────────────────────────── DuManager ───────────────────────────┐
//!   │  cells: EntityRegistry<Cell, DuCellContext>                      │
//!   │  sequencer ──▶ F1SetupProcedure (one DU procedure at a time)     │
//!   │  transactions ◀── F1 Setup Response / Failure from the router    │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! UE context requests from the CU are answered directly: the DU only checks
//! that the serving cell is active and tracks which UEs it holds.

use std::collections::HashSet;
use std::sync::Arc;

use nextgran_async::{
    DrainMode, Drained, ExecutorHandle, ProtocolTransactionManager, TaskCompletion, TaskSequencer,
    TimerManager, TransactionId,
};
use nextgran_common::{CellConfig, StackConfig, TimerConfig};
use parking_lot::Mutex;
use tracing::{debug, info, warn, Instrument, Span};

use super::cell::{CellSetupState, DuCellContext, DuCellRegistry};
use super::f1_setup::F1SetupProcedure;
use crate::error::ProcedureError;
use crate::f1ap::{
    DecodeError, F1apMessage, F1apMessageHandler, F1apMessageNotifier, UeContextReleaseCommand,
    UeContextReleaseComplete, UeContextSetupFailure, UeContextSetupRequest,
    UeContextSetupResponse,
};
use crate::types::{CellHandle, CellIndex, F1apCause, UeIndex};

/// Pending DU-level procedures allowed behind the current one.
const DU_TASK_QUEUE_CAPACITY: usize = 4;

/// Completion of an F1 Setup run, yielding the activated cells.
pub type F1SetupCompletion = TaskCompletion<Result<Vec<CellHandle>, ProcedureError>>;

/// DU-side control plane.
pub struct DuManager {
    gnb_du_id: u64,
    gnb_du_name: String,
    timer_config: TimerConfig,
    cells: Arc<DuCellRegistry>,
    ues: Mutex<HashSet<UeIndex>>,
    sequencer: TaskSequencer,
    executor: ExecutorHandle,
    timers: TimerManager,
    transactions: ProtocolTransactionManager<F1apMessage>,
    notifier: Arc<dyn F1apMessageNotifier>,
    span: Span,
}

impl DuManager {
    /// Creates the DU with the cells of `config`. Procedures run on `executor`
    /// and log under `span`.
    pub fn new(
        config: &StackConfig,
        executor: ExecutorHandle,
        timers: TimerManager,
        notifier: Arc<dyn F1apMessageNotifier>,
        span: Span,
    ) -> Result<Self, ProcedureError> {
        let cells = Arc::new(DuCellRegistry::with_capacity(CellIndex::clamp_capacity(
            config.max_cells,
        )));
        for cell in &config.cells {
            let handle = cells.allocate(DuCellContext::new(cell.clone()))?;
            span.in_scope(|| debug!("Cell {} added: nci={:#x}, pci={}", handle, cell.nci, cell.pci));
        }
        let sequencer = TaskSequencer::new(
            format!("du-{}", config.gnb_du_id),
            &executor,
            DU_TASK_QUEUE_CAPACITY,
        )?;

        Ok(Self {
            gnb_du_id: config.gnb_du_id,
            gnb_du_name: config.gnb_du_name.clone(),
            timer_config: config.timers,
            cells,
            ues: Mutex::new(HashSet::new()),
            sequencer,
            executor,
            timers,
            transactions: ProtocolTransactionManager::new("du-f1ap"),
            notifier,
            span,
        })
    }

    /// Schedules F1 Setup for every served cell.
    pub fn start_f1_setup(&self) -> Result<F1SetupCompletion, ProcedureError> {
        let procedure = F1SetupProcedure::new(
            self.gnb_du_id,
            self.gnb_du_name.clone(),
            self.cells.clone(),
            self.transactions.clone(),
            self.notifier.clone(),
            self.timers.create_timer(self.executor.clone()),
            self.timer_config,
        );
        let span = self.span.clone();
        Ok(self
            .sequencer
            .schedule(move |cancel| procedure.run(cancel).instrument(span))?)
    }

    /// Adds a served cell. Only cells present before F1 Setup are offered.
    pub fn add_cell(&self, config: CellConfig) -> Result<CellHandle, ProcedureError> {
        Ok(self.cells.allocate(DuCellContext::new(config))?)
    }

    /// Setup state of a cell.
    pub fn cell_state(&self, handle: CellHandle) -> Result<CellSetupState, ProcedureError> {
        Ok(self.cells.with(handle, |cell| cell.state)?)
    }

    /// Finds a served cell by NCI.
    pub fn find_cell(&self, nci: u64) -> Option<CellHandle> {
        self.cells.find(|cell| cell.config.nci == nci)
    }

    /// Handles of all served cells.
    pub fn cells(&self) -> Vec<CellHandle> {
        self.cells.handles()
    }

    /// Number of cells activated by the CU.
    pub fn nof_active_cells(&self) -> usize {
        self.cells
            .handles()
            .into_iter()
            .filter(|&h| self.cells.with(h, DuCellContext::is_active).unwrap_or(false))
            .count()
    }

    /// Number of UE contexts set up by the CU.
    pub fn nof_ues(&self) -> usize {
        self.ues.lock().len()
    }

    /// Timer manager driving this DU's procedures.
    pub fn timer_manager(&self) -> &TimerManager {
        &self.timers
    }

    /// Cancels any running procedure and closes the DU sequencer.
    pub async fn shutdown(&self) -> Drained {
        let drained = self.sequencer.drain_and_close(DrainMode::Cancel).await;
        self.transactions.cancel_all();
        self.span.in_scope(|| info!("DU {} shut down", self.gnb_du_id));
        drained
    }

    fn handle_ue_context_setup_request(&self, request: UeContextSetupRequest) {
        let cell_active = self
            .find_cell(request.pcell_nci)
            .and_then(|h| self.cells.with(h, DuCellContext::is_active).ok())
            .unwrap_or(false);

        let reply = if cell_active {
            self.ues.lock().insert(request.ue_index);
            info!(
                "UE {} context set up: srbs={}, drbs={}",
                request.ue_index,
                request.srbs.len(),
                request.drbs.len()
            );
            F1apMessage::UeContextSetupResponse(UeContextSetupResponse {
                transaction_id: request.transaction_id,
                ue_index: request.ue_index,
                drbs_failed: Vec::new(),
            })
        } else {
            warn!(
                "Rejecting UE {} context setup: cell {:#x} not active",
                request.ue_index, request.pcell_nci
            );
            F1apMessage::UeContextSetupFailure(UeContextSetupFailure {
                transaction_id: request.transaction_id,
                ue_index: request.ue_index,
                cause: F1apCause::CellNotAvailable,
            })
        };
        self.notifier.on_new_message(reply);
    }

    fn handle_ue_context_release_command(&self, command: UeContextReleaseCommand) {
        if !self.ues.lock().remove(&command.ue_index) {
            debug!("Release of unknown UE {}, confirming anyway", command.ue_index);
        }
        info!("UE {} context released: cause={}", command.ue_index, command.cause);
        self.notifier
            .on_new_message(F1apMessage::UeContextReleaseComplete(UeContextReleaseComplete {
                transaction_id: command.transaction_id,
                ue_index: command.ue_index,
            }));
    }
}

impl F1apMessageHandler for DuManager {
    fn handle_message(&self, msg: F1apMessage) {
        let _entered = self.span.enter();
        match msg {
            F1apMessage::F1SetupResponse(_) | F1apMessage::F1SetupFailure(_) => {
                let id = msg.transaction_id();
                if !self.transactions.set_response(id, msg) {
                    warn!("Discarding F1 Setup outcome for unknown transaction {}", id);
                }
            }
            F1apMessage::UeContextSetupRequest(request) => {
                self.handle_ue_context_setup_request(request)
            }
            F1apMessage::UeContextReleaseCommand(command) => {
                self.handle_ue_context_release_command(command)
            }
            other => warn!("Unexpected {} at DU", other.name()),
        }
    }

    fn handle_decode_error(&self, transaction_id: TransactionId, error: DecodeError) {
        let _entered = self.span.enter();
        if !self.transactions.set_failure(transaction_id, error.reason) {
            debug!("Undecodable PDU for unknown transaction {}", transaction_id);
        }
    }
}

impl std::fmt::Debug for DuManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuManager")
            .field("gnb_du_id", &self.gnb_du_id)
            .field("cells", &self.cells)
            .finish()
    }
}
