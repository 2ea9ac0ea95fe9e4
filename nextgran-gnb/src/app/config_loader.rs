//! Configuration Loading for the DU / CU-CP stack
//!
//! Wraps `StackConfig` from `nextgran-common` with file loading and the
//! validation the registries and procedures rely on: capacities are sized into
//! fixed registries at start and must therefore be non-zero and fit the index
//! types carried on the wire.
//!
//! # Example
//!
//! ```rust,ignore
//! use nextgran_gnb::app::{load_stack_config, validate_stack_config};
//!
//! let config = load_stack_config("config/du.yaml")?;
//! validate_stack_config(&config)?;
//! ```

use std::collections::HashSet;
use std::path::Path;

use nextgran_common::{StackConfig, TickConfig};
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Configuration validation error
    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ConfigValidationError),
}

impl From<nextgran_common::Error> for ConfigError {
    fn from(err: nextgran_common::Error) -> Self {
        match err {
            nextgran_common::Error::Io(e) => ConfigError::IoError(e),
            nextgran_common::Error::Yaml(e) => ConfigError::ParseError(e.to_string()),
        }
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// Invalid gNB-DU ID
    #[error("Invalid gNB-DU ID: {0}")]
    InvalidDuId(String),

    /// Invalid gNB-DU name
    #[error("Invalid gNB-DU name: {0}")]
    InvalidDuName(String),

    /// No served cell configured
    #[error("No cells configured: at least one served cell must be specified")]
    NoCellsConfigured,

    /// Invalid NCI value
    #[error("Invalid NCI: {0}")]
    InvalidNci(String),

    /// Invalid PCI value
    #[error("Invalid PCI: {0}")]
    InvalidPci(String),

    /// Invalid TAC value
    #[error("Invalid TAC: {0}")]
    InvalidTac(String),

    /// Registry or queue capacity out of range
    #[error("Invalid capacity: {0}")]
    InvalidCapacity(String),

    /// Invalid numerology
    #[error("Invalid numerology: {0}")]
    InvalidNumerology(String),

    /// Invalid procedure timer
    #[error("Invalid timer: {0}")]
    InvalidTimer(String),
}

/// Loads a stack configuration from a YAML file.
///
/// For comprehensive validation, call `validate_stack_config` after loading.
///
/// # Arguments
///
/// * `path` - Path to the YAML configuration file
pub fn load_stack_config<P: AsRef<Path>>(path: P) -> Result<StackConfig, ConfigError> {
    Ok(StackConfig::from_file(path)?)
}

/// Loads a stack configuration from a YAML string.
pub fn load_stack_config_from_str(yaml: &str) -> Result<StackConfig, ConfigError> {
    Ok(StackConfig::from_yaml(yaml)?)
}

/// Validates a stack configuration.
///
/// # Validation Rules
///
/// - gNB-DU ID must fit in 36 bits, the name must not be empty
/// - At least one cell, at most `max_cells`, no duplicate NCI
/// - NCI must be a 36-bit value, PCI at most 1007, TAC a 24-bit value
/// - `max_dus`, `max_ues`, `max_cells` and `ue_task_queue_capacity` must be
///   non-zero and fit the wire index types
/// - `max_drbs_per_ue` between 1 and 32, numerology at most 4
/// - Procedure timers must be non-zero
pub fn validate_stack_config(config: &StackConfig) -> Result<(), ConfigValidationError> {
    const MAX_DU_ID: u64 = 0xFFFFFFFFF; // 36 bits
    if config.gnb_du_id > MAX_DU_ID {
        return Err(ConfigValidationError::InvalidDuId(format!(
            "gNB-DU ID {} exceeds maximum 36-bit value ({})",
            config.gnb_du_id, MAX_DU_ID
        )));
    }
    if config.gnb_du_name.trim().is_empty() {
        return Err(ConfigValidationError::InvalidDuName(
            "name cannot be empty".to_string(),
        ));
    }

    validate_capacities(config)?;
    validate_cells(config)?;

    if config.tick.numerology > TickConfig::MAX_NUMEROLOGY {
        return Err(ConfigValidationError::InvalidNumerology(format!(
            "numerology {} must be between 0 and 4",
            config.tick.numerology
        )));
    }

    let timers = &config.timers;
    for (name, ticks) in [
        ("f1_setup_timeout_ticks", timers.f1_setup_timeout_ticks),
        ("ue_context_setup_timeout_ticks", timers.ue_context_setup_timeout_ticks),
        ("ue_context_release_timeout_ticks", timers.ue_context_release_timeout_ticks),
    ] {
        if ticks == 0 {
            return Err(ConfigValidationError::InvalidTimer(format!(
                "{} must be non-zero",
                name
            )));
        }
    }

    Ok(())
}

fn validate_capacities(config: &StackConfig) -> Result<(), ConfigValidationError> {
    // Upper bounds come from the width of DuIndex, CellIndex and UeIndex.
    for (name, value, max) in [
        ("max_dus", config.max_dus, u16::MAX as usize + 1),
        ("max_cells", config.max_cells, u8::MAX as usize + 1),
        ("max_ues", config.max_ues, u16::MAX as usize + 1),
        ("ue_task_queue_capacity", config.ue_task_queue_capacity, 4096),
        ("max_drbs_per_ue", config.max_drbs_per_ue, 32),
    ] {
        if value == 0 || value > max {
            return Err(ConfigValidationError::InvalidCapacity(format!(
                "{} {} must be between 1 and {}",
                name, value, max
            )));
        }
    }
    Ok(())
}

fn validate_cells(config: &StackConfig) -> Result<(), ConfigValidationError> {
    if config.cells.is_empty() {
        return Err(ConfigValidationError::NoCellsConfigured);
    }
    if config.cells.len() > config.max_cells {
        return Err(ConfigValidationError::InvalidCapacity(format!(
            "{} cells configured but max_cells is {}",
            config.cells.len(),
            config.max_cells
        )));
    }

    const MAX_NCI: u64 = 0xFFFFFFFFF; // 36 bits
    const MAX_PCI: u16 = 1007;
    const MAX_TAC: u32 = 0xFFFFFF; // 24 bits
    let mut seen = HashSet::new();
    for cell in &config.cells {
        if cell.nci > MAX_NCI {
            return Err(ConfigValidationError::InvalidNci(format!(
                "NCI {} exceeds maximum 36-bit value ({})",
                cell.nci, MAX_NCI
            )));
        }
        if !seen.insert(cell.nci) {
            return Err(ConfigValidationError::InvalidNci(format!(
                "NCI {} configured twice",
                cell.nci
            )));
        }
        if cell.pci > MAX_PCI {
            return Err(ConfigValidationError::InvalidPci(format!(
                "PCI {} exceeds {}",
                cell.pci, MAX_PCI
            )));
        }
        if cell.tac > MAX_TAC {
            return Err(ConfigValidationError::InvalidTac(format!(
                "TAC {} exceeds maximum 24-bit value ({})",
                cell.tac, MAX_TAC
            )));
        }
    }
    Ok(())
}

/// Loads and validates a stack configuration in one step.
pub fn load_and_validate_stack_config<P: AsRef<Path>>(path: P) -> Result<StackConfig, ConfigError> {
    let config = load_stack_config(path)?;
    validate_stack_config(&config)?;
    Ok(config)
}
