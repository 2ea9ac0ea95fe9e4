//! Common types and utilities for nextgran
//!
//! This crate provides the configuration structures, error type, logging
//! setup and radio tick types shared by the scheduler core and the gNB
//! procedure crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod tick;

pub use config::{CellConfig, StackConfig, TimerConfig};
pub use error::{Error, Result};
pub use logging::{component_span, init_logging, log_pdu, Direction, LogLevel, Protocol};
pub use tick::{RadioTick, TickConfig};
