//! DU side of the F1 interface
//!
//! - `cell`: served cell contexts and their setup state
//! - `f1_setup`: the F1 Setup procedure
//! - `manager`: the DU manager sequencing DU procedures and answering the CU

mod cell;
mod f1_setup;
mod manager;

pub use cell::{CellSetupState, DuCellContext, DuCellRegistry};
pub use f1_setup::F1SetupProcedure;
pub use manager::{DuManager, F1SetupCompletion};
