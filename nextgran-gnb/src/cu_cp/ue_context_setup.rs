//! UE Context Setup procedure (CU-CP side)
//!
//! ```text
//!   reserve SRB1 + DRBs (provisional)
//!        │
//!   UE Context Setup Request ──▶ AwaitingPeerResponse
//!        │
//!        ├── response ──▶ commit bearers ──▶ Active
//!        ├── failure / timer / decode error ──▶ roll back ──▶ Failed
//!        └── cancel ──▶ roll back ──▶ Cancelled
//! ```

use std::sync::Arc;

use nextgran_async::{CancelSignal, ProtocolTransactionManager, UniqueTimer};
use tracing::{info, warn};

use super::ue_manager::{UeContext, UeState};
use crate::error::ProcedureError;
use crate::f1ap::{
    F1apMessage, F1apMessageNotifier, RrcCodec, RrcMessage, UeContextSetupRequest,
};
use crate::types::{DrbId, SrbId};

/// One UE Context Setup towards the DU.
pub struct UeContextSetupProcedure {
    ue: Arc<UeContext>,
    pcell_nci: u64,
    drbs: Vec<DrbId>,
    transactions: ProtocolTransactionManager<F1apMessage>,
    notifier: Arc<dyn F1apMessageNotifier>,
    rrc: Arc<dyn RrcCodec>,
    timer: UniqueTimer,
    timeout_ticks: u64,
}

impl UeContextSetupProcedure {
    /// Creates the procedure for `ue` served by the cell `pcell_nci`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ue: Arc<UeContext>,
        pcell_nci: u64,
        drbs: Vec<DrbId>,
        transactions: ProtocolTransactionManager<F1apMessage>,
        notifier: Arc<dyn F1apMessageNotifier>,
        rrc: Arc<dyn RrcCodec>,
        timer: UniqueTimer,
        timeout_ticks: u64,
    ) -> Self {
        Self {
            ue,
            pcell_nci,
            drbs,
            transactions,
            notifier,
            rrc,
            timer,
            timeout_ticks,
        }
    }

    /// Runs the procedure to a terminal state.
    pub async fn run(mut self, cancel: CancelSignal) -> Result<(), ProcedureError> {
        let ue = self.ue.clone();
        match ue.state() {
            UeState::AwaitingReleaseConfirmation | UeState::Released => {
                return Err(ProcedureError::Protocol(format!(
                    "UE {} is being released",
                    ue.handle()
                )))
            }
            _ => {}
        }

        let srbs = [SrbId::SRB1];
        if let Err(e) = ue.with_bearers(|bearers| bearers.reserve(&srbs, &self.drbs)) {
            warn!("UE {} context setup rejected locally: {}", ue.handle(), e);
            ue.set_state(UeState::Failed);
            return Err(e);
        }
        ue.set_state(UeState::AwaitingPeerResponse);

        match self.exchange(&srbs, &cancel).await {
            Ok(failed_drbs) => {
                ue.with_bearers(|bearers| bearers.commit(&failed_drbs));
                ue.set_state(UeState::Active);
                info!(
                    "UE {} context set up: drbs={}, failed={}",
                    ue.handle(),
                    ue.with_bearers(|bearers| bearers.established_drbs().len()),
                    failed_drbs.len()
                );
                Ok(())
            }
            Err(e) => {
                let dropped = ue.with_bearers(|bearers| bearers.rollback());
                ue.set_state(if e == ProcedureError::Cancelled {
                    UeState::Cancelled
                } else {
                    UeState::Failed
                });
                warn!(
                    "UE {} context setup failed: {} ({} provisional bearers released)",
                    ue.handle(),
                    e,
                    dropped
                );
                Err(e)
            }
        }
    }

    async fn exchange(
        &mut self,
        srbs: &[SrbId],
        cancel: &CancelSignal,
    ) -> Result<Vec<DrbId>, ProcedureError> {
        let transaction = self.transactions.create()?;
        let rrc_container = self.rrc.encode(&RrcMessage::RrcReconfiguration {
            rrc_transaction_id: self.ue.next_rrc_transaction_id(),
            srbs_to_add: srbs.to_vec(),
            drbs_to_add: self.drbs.clone(),
        });
        self.notifier
            .on_new_message(F1apMessage::UeContextSetupRequest(UeContextSetupRequest {
                transaction_id: transaction.id(),
                ue_index: self.ue.ue_index(),
                pcell_nci: self.pcell_nci,
                srbs: srbs.to_vec(),
                drbs: self.drbs.clone(),
                rrc_container,
            }));

        let outcome = transaction
            .wait(&mut self.timer, self.timeout_ticks, cancel)
            .await?;
        self.ue.check_addressed(&outcome)?;
        match outcome {
            F1apMessage::UeContextSetupResponse(response) => Ok(response.drbs_failed),
            F1apMessage::UeContextSetupFailure(failure) => Err(ProcedureError::Rejected {
                cause: failure.cause,
            }),
            other => Err(ProcedureError::Protocol(format!(
                "unexpected {} during UE context setup",
                other.name()
            ))),
        }
    }
}
