//! DU cell contexts

use nextgran_async::EntityRegistry;
use nextgran_common::CellConfig;

use crate::f1ap::ServedCell;
use crate::types::Cell;

/// Setup state of a served cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellSetupState {
    /// Configured, F1 Setup not started
    #[default]
    Idle,
    /// F1 Setup Request sent, waiting for the CU
    AwaitingPeerResponse,
    /// Activated by the CU
    Active,
    /// Rejected, not activated, or no answer in time
    Failed,
}

impl std::fmt::Display for CellSetupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellSetupState::Idle => write!(f, "Idle"),
            CellSetupState::AwaitingPeerResponse => write!(f, "AwaitingPeerResponse"),
            CellSetupState::Active => write!(f, "Active"),
            CellSetupState::Failed => write!(f, "Failed"),
        }
    }
}

/// Served cell as tracked by the DU
#[derive(Debug, Clone)]
pub struct DuCellContext {
    /// Cell configuration
    pub config: CellConfig,
    /// Current setup state
    pub state: CellSetupState,
}

impl DuCellContext {
    /// Creates an idle cell.
    pub fn new(config: CellConfig) -> Self {
        Self {
            config,
            state: CellSetupState::Idle,
        }
    }

    /// Cell as offered in F1 Setup.
    pub fn served_cell(&self) -> ServedCell {
        ServedCell {
            nci: self.config.nci,
            pci: self.config.pci,
            tac: self.config.tac,
        }
    }

    /// Returns true once the CU activated the cell.
    pub fn is_active(&self) -> bool {
        self.state == CellSetupState::Active
    }
}

/// Registry of the DU's served cells
pub type DuCellRegistry = EntityRegistry<Cell, DuCellContext>;
