//! UE contexts at the CU-CP
//!
//! Each UE owns a [`TaskSequencer`] on the executor picked for it by the
//! [`UeExecutorMapper`]. Every procedure touching the UE runs through that
//! sequencer, so a release can never interleave with a setup of the same UE.
//!
//! ```text
//!   Idle ──setup──▶ AwaitingPeerResponse ──▶ Active | Failed | Cancelled
//!   Active ──release──▶ AwaitingReleaseConfirmation ──▶ Released
//! ```
//!
//! A UE leaves the registry only with the [`Drained`] proof of its sequencer.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use nextgran_async::{
    DrainMode, Drained, EntityRegistry, ExecutorHandle, TaskCompletion, TaskSequencer,
};
use parking_lot::Mutex;
use tracing::{debug, info, Span};

use crate::error::ProcedureError;
use crate::f1ap::F1apMessage;
use crate::types::{CellHandle, DrbId, SrbId, Ue, UeHandle, UeIndex};
use crate::workers::UeExecutorMapper;

/// Lifecycle state of a UE context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UeState {
    /// Created, context not yet set up at the DU
    #[default]
    Idle,
    /// UE Context Setup Request sent
    AwaitingPeerResponse,
    /// Context set up at the DU
    Active,
    /// Setup rejected or timed out
    Failed,
    /// Setup cancelled while in progress
    Cancelled,
    /// UE Context Release Command sent
    AwaitingReleaseConfirmation,
    /// Context released
    Released,
}

impl std::fmt::Display for UeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UeState::Idle => write!(f, "Idle"),
            UeState::AwaitingPeerResponse => write!(f, "AwaitingPeerResponse"),
            UeState::Active => write!(f, "Active"),
            UeState::Failed => write!(f, "Failed"),
            UeState::Cancelled => write!(f, "Cancelled"),
            UeState::AwaitingReleaseConfirmation => write!(f, "AwaitingReleaseConfirmation"),
            UeState::Released => write!(f, "Released"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BearerStatus {
    Provisional,
    Established,
}

/// Radio bearers of one UE.
///
/// Bearers requested by a setup procedure are provisional until the DU
/// confirms them; a failed, timed out or cancelled setup rolls them back.
#[derive(Debug)]
pub struct BearerTable {
    max_drbs: usize,
    srbs: BTreeMap<SrbId, BearerStatus>,
    drbs: BTreeMap<DrbId, BearerStatus>,
}

impl BearerTable {
    /// Creates an empty table allowing at most `max_drbs` DRBs.
    pub fn new(max_drbs: usize) -> Self {
        Self {
            max_drbs,
            srbs: BTreeMap::new(),
            drbs: BTreeMap::new(),
        }
    }

    /// Adds an established SRB.
    pub fn add_srb(&mut self, srb: SrbId) -> Result<(), ProcedureError> {
        if !srb.is_valid() {
            return Err(ProcedureError::Protocol(format!("invalid {}", srb)));
        }
        if self.srbs.insert(srb, BearerStatus::Established).is_some() {
            return Err(ProcedureError::Protocol(format!("{} already exists", srb)));
        }
        Ok(())
    }

    /// Reserves the bearers in `srbs` and `drbs` that do not exist yet.
    /// Nothing is reserved if the DRB limit would be exceeded.
    pub fn reserve(&mut self, srbs: &[SrbId], drbs: &[DrbId]) -> Result<(), ProcedureError> {
        if let Some(bad) = drbs.iter().find(|drb| !drb.is_valid()) {
            return Err(ProcedureError::Protocol(format!("invalid {}", bad)));
        }
        let new_drbs = drbs.iter().filter(|drb| !self.drbs.contains_key(drb)).count();
        if self.drbs.len() + new_drbs > self.max_drbs {
            return Err(ProcedureError::ResourcesUnavailable(format!(
                "{} DRBs requested, {} of {} in use",
                new_drbs,
                self.drbs.len(),
                self.max_drbs
            )));
        }
        for &srb in srbs {
            self.srbs.entry(srb).or_insert(BearerStatus::Provisional);
        }
        for &drb in drbs {
            self.drbs.entry(drb).or_insert(BearerStatus::Provisional);
        }
        Ok(())
    }

    /// Confirms all provisional bearers except the DRBs in `failed`, which
    /// are dropped.
    pub fn commit(&mut self, failed: &[DrbId]) {
        self.drbs
            .retain(|drb, status| *status == BearerStatus::Established || !failed.contains(drb));
        self.srbs
            .values_mut()
            .chain(self.drbs.values_mut())
            .for_each(|status| *status = BearerStatus::Established);
    }

    /// Drops all provisional bearers. Returns how many were dropped.
    pub fn rollback(&mut self) -> usize {
        let before = self.srbs.len() + self.drbs.len();
        self.srbs.retain(|_, status| *status == BearerStatus::Established);
        self.drbs.retain(|_, status| *status == BearerStatus::Established);
        before - self.srbs.len() - self.drbs.len()
    }

    /// Drops every bearer.
    pub fn clear(&mut self) {
        self.srbs.clear();
        self.drbs.clear();
    }

    /// Established SRBs
    pub fn established_srbs(&self) -> Vec<SrbId> {
        Self::established(&self.srbs)
    }

    /// Established DRBs
    pub fn established_drbs(&self) -> Vec<DrbId> {
        Self::established(&self.drbs)
    }

    /// Bearers awaiting confirmation
    pub fn nof_provisional(&self) -> usize {
        self.srbs
            .values()
            .chain(self.drbs.values())
            .filter(|&&status| status == BearerStatus::Provisional)
            .count()
    }

    fn established<T: Copy>(table: &BTreeMap<T, BearerStatus>) -> Vec<T> {
        table
            .iter()
            .filter(|(_, status)| **status == BearerStatus::Established)
            .map(|(&id, _)| id)
            .collect()
    }
}

/// UE context at the CU-CP
pub struct UeContext {
    handle: UeHandle,
    pcell: CellHandle,
    c_rnti: u16,
    state: Mutex<UeState>,
    bearers: Mutex<BearerTable>,
    rrc_transaction_id: AtomicU8,
    sequencer: TaskSequencer,
    executor: ExecutorHandle,
}

impl UeContext {
    /// Handle of this UE
    pub fn handle(&self) -> UeHandle {
        self.handle
    }

    /// Index carried in F1AP messages
    pub fn ue_index(&self) -> UeIndex {
        UeIndex::from(self.handle)
    }

    /// Fails unless `msg` is addressed to this UE.
    pub fn check_addressed(&self, msg: &F1apMessage) -> Result<(), ProcedureError> {
        match msg.ue_index() {
            Some(index) if index == self.ue_index() => Ok(()),
            other => Err(ProcedureError::Protocol(format!(
                "{} addressed to UE index {}, expected {}",
                msg.name(),
                other.map_or_else(|| "none".to_string(), |index| index.to_string()),
                self.ue_index()
            ))),
        }
    }

    /// Serving cell
    pub fn pcell(&self) -> CellHandle {
        self.pcell
    }

    /// C-RNTI assigned by the DU
    pub fn c_rnti(&self) -> u16 {
        self.c_rnti
    }

    /// Current lifecycle state
    pub fn state(&self) -> UeState {
        *self.state.lock()
    }

    /// Moves the UE to `state`.
    pub fn set_state(&self, state: UeState) {
        let mut current = self.state.lock();
        debug!("UE {}: {} -> {}", self.handle, *current, state);
        *current = state;
    }

    /// Runs `f` on the UE's bearers.
    pub fn with_bearers<R>(&self, f: impl FnOnce(&mut BearerTable) -> R) -> R {
        f(&mut self.bearers.lock())
    }

    /// Next RRC transaction identifier (0..=3).
    pub fn next_rrc_transaction_id(&self) -> u8 {
        self.rrc_transaction_id.fetch_add(1, Ordering::Relaxed) % 4
    }

    /// Executor the UE's procedures run on
    pub fn executor(&self) -> &ExecutorHandle {
        &self.executor
    }

    /// The UE's task sequencer
    pub fn sequencer(&self) -> &TaskSequencer {
        &self.sequencer
    }
}

impl std::fmt::Debug for UeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UeContext")
            .field("handle", &self.handle)
            .field("pcell", &self.pcell)
            .field("c_rnti", &self.c_rnti)
            .field("state", &self.state())
            .finish()
    }
}

/// Parameters of a [`UeManager`]
#[derive(Debug, Clone, Copy)]
pub struct UeManagerConfig {
    /// Maximum number of UEs
    pub max_ues: usize,
    /// Procedures allowed to wait behind a UE's current one
    pub task_queue_capacity: usize,
    /// Maximum number of DRBs per UE
    pub max_drbs_per_ue: usize,
}

/// Registry of UE contexts
pub struct UeManager {
    config: UeManagerConfig,
    ues: EntityRegistry<Ue, Arc<UeContext>>,
    executors: Arc<dyn UeExecutorMapper>,
    span: Span,
}

impl UeManager {
    /// Creates an empty manager.
    pub fn new(config: UeManagerConfig, executors: Arc<dyn UeExecutorMapper>, span: Span) -> Self {
        Self {
            config,
            ues: EntityRegistry::with_capacity(UeIndex::clamp_capacity(config.max_ues)),
            executors,
            span,
        }
    }

    /// Creates a UE in the lowest free slot, with its sequencer running on the
    /// executor mapped to that slot.
    pub fn add_ue(&self, pcell: CellHandle, c_rnti: u16) -> Result<UeHandle, ProcedureError> {
        let handle = self.ues.try_allocate_with(|handle| {
            let executor = self.executors.ue_executor(UeIndex::from(handle));
            let sequencer = TaskSequencer::new(
                format!("ue-{}", handle.index()),
                &executor,
                self.config.task_queue_capacity,
            )?;
            Ok::<_, ProcedureError>(Arc::new(UeContext {
                handle,
                pcell,
                c_rnti,
                state: Mutex::new(UeState::Idle),
                bearers: Mutex::new(BearerTable::new(self.config.max_drbs_per_ue)),
                rrc_transaction_id: AtomicU8::new(0),
                sequencer,
                executor,
            }))
        })?;
        self.span.in_scope(|| {
            info!(
                "UE {} created: pcell={}, c-rnti={:#06x}",
                handle, pcell, c_rnti
            )
        });
        Ok(handle)
    }

    /// Resolves a wire index to a live UE.
    pub fn find_ue(&self, ue_index: UeIndex) -> Option<UeHandle> {
        self.ues.resolve(ue_index.as_usize())
    }

    /// Context of a live UE.
    pub fn get_ue(&self, ue: UeHandle) -> Result<Arc<UeContext>, ProcedureError> {
        Ok(self.ues.get(ue)?)
    }

    /// Handles of all live UEs.
    pub fn ues(&self) -> Vec<UeHandle> {
        self.ues.handles()
    }

    /// Queues `task` on the UE's sequencer.
    pub fn schedule<F, Fut, T>(&self, ue: UeHandle, task: F) -> Result<TaskCompletion<T>, ProcedureError>
    where
        F: FnOnce(nextgran_async::CancelSignal) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Ok(self.get_ue(ue)?.sequencer.schedule(task)?)
    }

    /// Removes a UE whose sequencer has been drained.
    pub fn remove_ue(&self, ue: UeHandle, drained: Drained) -> Result<(), ProcedureError> {
        let context = self.ues.release(ue)?;
        debug_assert_eq!(drained.name(), context.sequencer.name());
        self.span
            .in_scope(|| info!("UE {} removed, {} UEs left", ue, self.ues.len()));
        Ok(())
    }

    /// Drains the UE's sequencer and removes it.
    ///
    /// Must not be awaited from one of the UE's own procedures.
    pub async fn teardown_ue(&self, ue: UeHandle, mode: DrainMode) -> Result<(), ProcedureError> {
        let context = self.get_ue(ue)?;
        let drained = context.sequencer.drain_and_close(mode).await;
        self.remove_ue(ue, drained)
    }

    /// Number of live UEs.
    pub fn nof_ues(&self) -> usize {
        self.ues.len()
    }
}

impl std::fmt::Debug for UeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UeManager")
            .field("config", &self.config)
            .field("ues", &self.ues)
            .finish()
    }
}
