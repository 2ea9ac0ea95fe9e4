//! Configuration structures for the DU / CU-CP control plane
//!
//! The capacity constants (`max_dus`, `max_cells`, `max_ues`) are read once at
//! process start and sized into the entity registries; they are never resized
//! at runtime.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::tick::TickConfig;

/// Served cell configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellConfig {
    /// NR Cell Identity (36-bit value)
    pub nci: u64,
    /// Physical Cell ID (0..=1007)
    pub pci: u16,
    /// Tracking Area Code (24-bit)
    #[serde(default)]
    pub tac: u32,
}

impl CellConfig {
    /// Creates a new cell configuration.
    pub fn new(nci: u64, pci: u16) -> Self {
        Self { nci, pci, tac: 1 }
    }
}

/// Procedure supervision timers, in radio ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Time to wait for the F1 Setup Response
    #[serde(default = "default_f1_setup_timeout")]
    pub f1_setup_timeout_ticks: u64,
    /// Number of F1 Setup retries after an F1 Setup Failure
    #[serde(default = "default_f1_setup_retries")]
    pub f1_setup_retries: u32,
    /// Time to wait for the UE Context Setup Response
    #[serde(default = "default_ue_context_setup_timeout")]
    pub ue_context_setup_timeout_ticks: u64,
    /// Time to wait for the UE Context Release Complete
    #[serde(default = "default_ue_context_release_timeout")]
    pub ue_context_release_timeout_ticks: u64,
}

fn default_f1_setup_timeout() -> u64 {
    1000
}

fn default_f1_setup_retries() -> u32 {
    2
}

fn default_ue_context_setup_timeout() -> u64 {
    1000
}

fn default_ue_context_release_timeout() -> u64 {
    500
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            f1_setup_timeout_ticks: default_f1_setup_timeout(),
            f1_setup_retries: default_f1_setup_retries(),
            ue_context_setup_timeout_ticks: default_ue_context_setup_timeout(),
            ue_context_release_timeout_ticks: default_ue_context_release_timeout(),
        }
    }
}

/// Control-plane stack configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    /// gNB-DU ID
    pub gnb_du_id: u64,
    /// gNB-DU name sent in F1 Setup Request
    #[serde(default = "default_du_name")]
    pub gnb_du_name: String,
    /// Served cells of this DU
    #[serde(default)]
    pub cells: Vec<CellConfig>,
    /// Maximum number of DUs connected to one CU-CP
    #[serde(default = "default_max_dus")]
    pub max_dus: usize,
    /// Maximum number of cells per DU
    #[serde(default = "default_max_cells")]
    pub max_cells: usize,
    /// Maximum number of concurrent UEs
    #[serde(default = "default_max_ues")]
    pub max_ues: usize,
    /// Maximum number of pending procedures per UE before new ones are rejected
    #[serde(default = "default_ue_task_queue_capacity")]
    pub ue_task_queue_capacity: usize,
    /// Maximum number of DRBs per UE
    #[serde(default = "default_max_drbs")]
    pub max_drbs_per_ue: usize,
    /// Tick cadence
    #[serde(default)]
    pub tick: TickConfig,
    /// Procedure timers
    #[serde(default)]
    pub timers: TimerConfig,
}

fn default_du_name() -> String {
    "nextgran-du".to_string()
}

fn default_max_dus() -> usize {
    4
}

fn default_max_cells() -> usize {
    16
}

fn default_max_ues() -> usize {
    1024
}

fn default_ue_task_queue_capacity() -> usize {
    16
}

fn default_max_drbs() -> usize {
    8
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            gnb_du_id: 1,
            gnb_du_name: default_du_name(),
            cells: vec![CellConfig::new(0x000000010, 1)],
            max_dus: default_max_dus(),
            max_cells: default_max_cells(),
            max_ues: default_max_ues(),
            ue_task_queue_capacity: default_ue_task_queue_capacity(),
            max_drbs_per_ue: default_max_drbs(),
            tick: TickConfig::default(),
            timers: TimerConfig::default(),
        }
    }
}

impl StackConfig {
    /// Parses a configuration from a YAML string without validating it.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads and parses a YAML configuration file without validating it.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Returns the gNB ID carried in the upper 22 bits of the first cell's NCI.
    pub fn gnb_id(&self) -> Option<u32> {
        self.cells
            .first()
            .map(|cell| ((cell.nci & 0xFFFFFFFFF) >> 14) as u32)
    }
}
