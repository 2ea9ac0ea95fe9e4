//! Connected DUs
//!
//! One [`DuProcessor`] per F1 connection, kept in a bounded registry sized by
//! `max_dus`.

use std::sync::Arc;

use nextgran_async::{EntityRegistry, TimerManager};
use nextgran_common::component_span;
use tracing::{info, Span};

use super::du_processor::{DuProcessor, DuProcessorConfig};
use crate::error::ProcedureError;
use crate::f1ap::{F1apMessageNotifier, RrcCodec};
use crate::types::{Du, DuHandle, DuIndex};
use crate::workers::UeExecutorMapper;

/// Registry of the DUs connected to the CU-CP
pub struct DuRepository {
    config: DuProcessorConfig,
    dus: EntityRegistry<Du, Arc<DuProcessor>>,
    ue_executors: Arc<dyn UeExecutorMapper>,
    timers: TimerManager,
    rrc: Arc<dyn RrcCodec>,
    span: Span,
}

impl DuRepository {
    /// Creates an empty repository accepting up to `max_dus` DUs.
    pub fn new(
        config: DuProcessorConfig,
        max_dus: usize,
        ue_executors: Arc<dyn UeExecutorMapper>,
        timers: TimerManager,
        rrc: Arc<dyn RrcCodec>,
        span: Span,
    ) -> Self {
        Self {
            config,
            dus: EntityRegistry::with_capacity(DuIndex::clamp_capacity(max_dus)),
            ue_executors,
            timers,
            rrc,
            span,
        }
    }

    /// Accepts a new F1 connection answering through `notifier`.
    pub fn add_du(&self, notifier: Arc<dyn F1apMessageNotifier>) -> Result<DuHandle, ProcedureError> {
        let handle = self.dus.allocate_with(|handle| {
            Arc::new(DuProcessor::new(
                self.config.clone(),
                self.ue_executors.clone(),
                self.timers.clone(),
                notifier,
                self.rrc.clone(),
                component_span("du-processor", handle),
            ))
        })?;
        self.span.in_scope(|| info!("DU {} connected", handle));
        Ok(handle)
    }

    /// Processor of a connected DU.
    pub fn get_du(&self, du: DuHandle) -> Result<Arc<DuProcessor>, ProcedureError> {
        Ok(self.dus.get(du)?)
    }

    /// Resolves a wire index to a connected DU.
    pub fn find_du(&self, du_index: DuIndex) -> Option<DuHandle> {
        self.dus.resolve(du_index.as_usize())
    }

    /// Finds the DU that set up with `gnb_du_id`.
    pub fn find_du_by_id(&self, gnb_du_id: u64) -> Option<DuHandle> {
        self.dus.find(|du| du.gnb_du_id() == Some(gnb_du_id))
    }

    /// Tears down all UEs of a DU and forgets it.
    pub async fn remove_du(&self, du: DuHandle) -> Result<(), ProcedureError> {
        let processor = self.get_du(du)?;
        processor.shutdown().await;
        self.dus.release(du)?;
        self.span.in_scope(|| info!("DU {} removed", du));
        Ok(())
    }

    /// Number of connected DUs.
    pub fn nof_dus(&self) -> usize {
        self.dus.len()
    }

    /// Number of UEs over all DUs.
    pub fn nof_ues(&self) -> usize {
        self.dus
            .handles()
            .into_iter()
            .filter_map(|du| self.dus.with(du, |processor| processor.nof_ues()).ok())
            .sum()
    }
}

impl std::fmt::Debug for DuRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuRepository").field("dus", &self.dus).finish()
    }
}
