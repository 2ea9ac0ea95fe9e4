//! Error types for nextgran-common

use thiserror::Error;

/// Errors raised while reading shared configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The YAML document does not describe a configuration
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result alias over [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
