//! nextgran-gnb - gNB DU / CU-CP control plane
//!
//! This crate implements the F1 control-plane procedures of a disaggregated
//! gNB on top of the `nextgran-async` scheduling substrate:
//!
//! - F1 Setup, DU side (`du`) and CU-CP side (`cu_cp`)
//! - UE creation, UE Context Setup and UE Context Release at the CU-CP
//! - Typed F1AP / RRC messages behind pluggable codecs (`f1ap`)
//! - Worker pool and tick driver wiring the executors and timers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────── DU ────────────────┐        ┌──────────────────── CU-CP ──────────────────┐
//! │ DuManager                          │  F1AP  │ DuRepository                                │
//! │   cells ─ F1SetupProcedure ────────┼───────▶│   DuProcessor (one per DU)                  │
//! │   answers UE context requests ◀────┼────────┤     cells                                   │
//! └────────────────────────────────────┘        │     UeManager ─ UE sequencer per UE         │
//!                                               │       UeContextSetup / UeContextRelease     │
//!                                               └─────────────────────────────────────────────┘
//!
//!   WorkerPool: ctrl executor, one executor per cell, N UE executors
//!   TickDriver: TimerManager::tick() once per radio time unit
//! ```
//!
//! Every procedure of an entity runs on that entity's task sequencer, so two
//! procedures of the same UE never interleave while different UEs progress
//! independently.
//!
//! # Configuration Loading
//!
//! ```rust,ignore
//! use nextgran_gnb::app::load_and_validate_stack_config;
//!
//! let config = load_and_validate_stack_config("config/gnb.yaml")?;
//! ```

pub mod app;
pub mod cu_cp;
pub mod du;
pub mod error;
pub mod f1ap;
pub mod tick_driver;
pub mod types;
pub mod workers;

pub use app::{load_and_validate_stack_config, ConfigError, ConfigValidationError};
pub use cu_cp::{DuProcessor, DuProcessorConfig, DuRepository, UeState};
pub use du::{CellSetupState, DuManager};
pub use error::ProcedureError;
pub use tick_driver::TickDriver;
pub use workers::{UeExecutorMapper, WorkerPool};
