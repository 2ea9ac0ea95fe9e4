//! UE Context Release procedure (CU-CP side)
//!
//! The UE ends up `Released` whatever the DU answers: a missing confirmation
//! only means the release is completed locally.

use std::sync::Arc;

use nextgran_async::{CancelSignal, ProtocolTransactionManager, UniqueTimer};
use tracing::{info, warn};

use super::ue_manager::{UeContext, UeState};
use crate::error::ProcedureError;
use crate::f1ap::{
    F1apMessage, F1apMessageNotifier, RrcCodec, RrcMessage, UeContextReleaseCommand,
};
use crate::types::F1apCause;

/// One UE Context Release towards the DU.
pub struct UeContextReleaseProcedure {
    ue: Arc<UeContext>,
    cause: F1apCause,
    transactions: ProtocolTransactionManager<F1apMessage>,
    notifier: Arc<dyn F1apMessageNotifier>,
    rrc: Arc<dyn RrcCodec>,
    timer: UniqueTimer,
    timeout_ticks: u64,
}

impl UeContextReleaseProcedure {
    /// Creates the procedure releasing `ue` with `cause`.
    pub fn new(
        ue: Arc<UeContext>,
        cause: F1apCause,
        transactions: ProtocolTransactionManager<F1apMessage>,
        notifier: Arc<dyn F1apMessageNotifier>,
        rrc: Arc<dyn RrcCodec>,
        timer: UniqueTimer,
        timeout_ticks: u64,
    ) -> Self {
        Self {
            ue,
            cause,
            transactions,
            notifier,
            rrc,
            timer,
            timeout_ticks,
        }
    }

    /// Runs the procedure. The returned error, if any, concerns the DU's
    /// confirmation only; the UE is `Released` in every case.
    pub async fn run(mut self, cancel: CancelSignal) -> Result<(), ProcedureError> {
        let ue = self.ue.clone();
        let result = if ue.state() == UeState::Idle {
            // Nothing was ever set up at the DU.
            Ok(())
        } else {
            ue.set_state(UeState::AwaitingReleaseConfirmation);
            self.exchange(&cancel).await
        };

        ue.with_bearers(|bearers| bearers.clear());
        ue.set_state(UeState::Released);
        match &result {
            Ok(()) => info!("UE {} context released: cause={}", ue.handle(), self.cause),
            Err(e) => warn!("UE {} released locally: {}", ue.handle(), e),
        }
        result
    }

    async fn exchange(&mut self, cancel: &CancelSignal) -> Result<(), ProcedureError> {
        let transaction = self.transactions.create()?;
        let rrc_container = self.rrc.encode(&RrcMessage::RrcRelease {
            rrc_transaction_id: self.ue.next_rrc_transaction_id(),
        });
        self.notifier
            .on_new_message(F1apMessage::UeContextReleaseCommand(UeContextReleaseCommand {
                transaction_id: transaction.id(),
                ue_index: self.ue.ue_index(),
                cause: self.cause,
                rrc_container,
            }));

        let outcome = transaction
            .wait(&mut self.timer, self.timeout_ticks, cancel)
            .await?;
        self.ue.check_addressed(&outcome)?;
        match outcome {
            F1apMessage::UeContextReleaseComplete(_) => Ok(()),
            other => Err(ProcedureError::Protocol(format!(
                "unexpected {} during UE context release",
                other.name()
            ))),
        }
    }
}
