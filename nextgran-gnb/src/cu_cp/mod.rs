//! CU-CP side of the F1 interface
//!
//! - `du_repository`: connected DUs
//! - `du_processor`: F1 Setup handling, UE creation and UE procedures per DU
//! - `ue_manager`: UE contexts, bearers and per-UE sequencers
//! - `ue_context_setup` / `ue_context_release`: the UE procedures
//! - `interfaces`: capability traits exposed by the DU processor

mod du_processor;
mod du_repository;
mod interfaces;
mod ue_context_release;
mod ue_context_setup;
mod ue_manager;

pub use du_processor::{CuCellContext, DuProcessor, DuProcessorConfig, UeProcedureCompletion};
pub use du_repository::DuRepository;
pub use interfaces::{F1SetupHandler, UeLifecycleHandler, UeRepository, UeTask, UeTaskScheduler};
pub use ue_context_release::UeContextReleaseProcedure;
pub use ue_context_setup::UeContextSetupProcedure;
pub use ue_manager::{BearerTable, UeContext, UeManager, UeManagerConfig, UeState};
