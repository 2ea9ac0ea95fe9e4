//! F1 Setup procedure (DU side)
//!
//! ```text
//!   Idle ──send F1 Setup Request──▶ AwaitingPeerResponse ──response──▶ Active
//!                                          │
//!                                          ├── failure (retries left) ── wait time_to_wait, resend
//!                                          └── failure / timer / decode error / cancel ──▶ Failed
//! ```
//!
//! Cells the CU does not list for activation end up `Failed` as well.

use std::sync::Arc;

use nextgran_async::{CancelSignal, ProtocolTransactionManager, UniqueTimer};
use nextgran_common::TimerConfig;
use tracing::{info, warn};

use super::cell::{CellSetupState, DuCellRegistry};
use crate::error::ProcedureError;
use crate::f1ap::{F1SetupRequest, F1SetupResponse, F1apMessage, F1apMessageNotifier};
use crate::types::CellHandle;

/// One run of F1 Setup for all served cells of a DU.
pub struct F1SetupProcedure {
    gnb_du_id: u64,
    gnb_du_name: String,
    cells: Arc<DuCellRegistry>,
    transactions: ProtocolTransactionManager<F1apMessage>,
    notifier: Arc<dyn F1apMessageNotifier>,
    timer: UniqueTimer,
    timers: TimerConfig,
}

impl F1SetupProcedure {
    /// Creates the procedure; nothing is sent until [`run`](Self::run).
    pub fn new(
        gnb_du_id: u64,
        gnb_du_name: String,
        cells: Arc<DuCellRegistry>,
        transactions: ProtocolTransactionManager<F1apMessage>,
        notifier: Arc<dyn F1apMessageNotifier>,
        timer: UniqueTimer,
        timers: TimerConfig,
    ) -> Self {
        Self {
            gnb_du_id,
            gnb_du_name,
            cells,
            transactions,
            notifier,
            timer,
            timers,
        }
    }

    /// Runs the procedure and returns the activated cells.
    pub async fn run(mut self, cancel: CancelSignal) -> Result<Vec<CellHandle>, ProcedureError> {
        let handles = self.cells.handles();
        self.set_state(&handles, CellSetupState::AwaitingPeerResponse);

        let result = self.exchange(&cancel).await;
        match &result {
            Ok(active) => info!(
                "F1 Setup complete: {} of {} cells active",
                active.len(),
                handles.len()
            ),
            Err(e) => {
                warn!("F1 Setup failed: {}", e);
                self.set_state(&handles, CellSetupState::Failed);
            }
        }
        result
    }

    async fn exchange(&mut self, cancel: &CancelSignal) -> Result<Vec<CellHandle>, ProcedureError> {
        let served_cells = self
            .cells
            .handles()
            .into_iter()
            .filter_map(|h| self.cells.with(h, |cell| cell.served_cell()).ok())
            .collect::<Vec<_>>();

        let mut retries_left = self.timers.f1_setup_retries;
        loop {
            let transaction = self.transactions.create()?;
            info!(
                "Sending F1 Setup Request: gnb_du_id={}, cells={}, transaction={}",
                self.gnb_du_id,
                served_cells.len(),
                transaction.id()
            );
            self.notifier
                .on_new_message(F1apMessage::F1SetupRequest(F1SetupRequest {
                    transaction_id: transaction.id(),
                    gnb_du_id: self.gnb_du_id,
                    gnb_du_name: self.gnb_du_name.clone(),
                    served_cells: served_cells.clone(),
                }));

            let outcome = transaction
                .wait(&mut self.timer, self.timers.f1_setup_timeout_ticks, cancel)
                .await?;

            match outcome {
                F1apMessage::F1SetupResponse(response) => return Ok(self.activate(&response)),
                F1apMessage::F1SetupFailure(failure) => {
                    warn!("Received F1 Setup Failure: cause={}", failure.cause);
                    if retries_left == 0 {
                        return Err(ProcedureError::Rejected {
                            cause: failure.cause,
                        });
                    }
                    retries_left -= 1;
                    if let Some(ticks) = failure.time_to_wait {
                        info!("CU requested {} ticks before retrying F1 Setup", ticks);
                        let waited = cancel.guard(self.timer.wait(ticks)).await;
                        self.timer.stop();
                        waited.map_err(|_| ProcedureError::Cancelled)?;
                    }
                }
                other => {
                    return Err(ProcedureError::Protocol(format!(
                        "unexpected {} during F1 Setup",
                        other.name()
                    )))
                }
            }
        }
    }

    fn activate(&self, response: &F1SetupResponse) -> Vec<CellHandle> {
        info!("Received F1 Setup Response from {}", response.gnb_cu_name);
        self.cells
            .handles()
            .into_iter()
            .filter(|&handle| {
                self.cells
                    .with_mut(handle, |cell| {
                        let activate = response.cells_to_activate.contains(&cell.config.nci);
                        cell.state = if activate {
                            CellSetupState::Active
                        } else {
                            CellSetupState::Failed
                        };
                        activate
                    })
                    .unwrap_or(false)
            })
            .collect()
    }

    fn set_state(&self, handles: &[CellHandle], state: CellSetupState) {
        for &handle in handles {
            let _ = self.cells.with_mut(handle, |cell| cell.state = state);
        }
    }
}
