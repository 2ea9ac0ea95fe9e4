//! Application support: configuration loading and validation

mod config_loader;

pub use config_loader::{
    load_and_validate_stack_config, load_stack_config, load_stack_config_from_str,
    validate_stack_config, ConfigError, ConfigValidationError,
};
