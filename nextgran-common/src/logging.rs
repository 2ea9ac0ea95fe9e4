//! Logging setup for nextgran
//!
//! Every component logs under a span handed to it at construction
//! ([`component_span`]), so lines emitted from a shared executor thread still
//! name the DU, cell or UE they belong to. PDUs crossing the codec boundary
//! are logged at debug level, with their payload at trace level.

use std::fmt;

use tracing::{Level, Span};
use tracing_subscriber::EnvFilter;

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Trace level, includes PDU payloads
    Trace,
    /// Debug level, includes every PDU and state change
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        })
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("unknown log level: {s}")),
        }
    }
}

/// Filter directives for `level`: nextgran crates at `level`, everything else
/// at warn.
pub fn default_filter(level: LogLevel) -> String {
    format!(
        "warn,nextgran_common={level},nextgran_async={level},nextgran_gnb={level}"
    )
}

/// Installs the global subscriber. `RUST_LOG` overrides `level` when set.
///
/// Call once at process start; later calls are ignored.
///
/// # Example
///
/// ```
/// use nextgran_common::logging::{init_logging, LogLevel};
///
/// init_logging(LogLevel::Debug);
/// ```
pub fn init_logging(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .try_init();
}

/// Direction of a PDU relative to this node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Received from the peer
    Rx,
    /// Sent to the peer
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Rx => "RX",
            Direction::Tx => "TX",
        })
    }
}

/// Protocol a logged PDU belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// F1 application protocol between DU and CU-CP
    F1ap,
    /// RRC, carried in F1AP containers
    Rrc,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::F1ap => "F1AP",
            Protocol::Rrc => "RRC",
        })
    }
}

/// Logs a PDU crossing the codec boundary.
pub fn log_pdu(protocol: Protocol, direction: Direction, name: &str, pdu: &[u8]) {
    tracing::debug!(len = pdu.len(), "{} {} {}", direction, protocol, name);
    tracing::trace!("{} payload: {}", protocol, hex::encode(pdu));
}

/// Creates the span a component logs under.
///
/// `component` names the kind ("du", "du-processor", ...), `instance` the
/// handle or id of this one.
pub fn component_span(component: &'static str, instance: impl fmt::Display) -> Span {
    tracing::info_span!("cmp", component, instance = %instance)
}
