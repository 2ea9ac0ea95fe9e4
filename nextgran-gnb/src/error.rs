//! Procedure errors
//!
//! Timeout and cancellation are ordinary terminal outcomes of a procedure and
//! are reported through this type like any other result.

use nextgran_async::{RegistryError, SequencerError, TransactionError};
use thiserror::Error;

use crate::types::F1apCause;

/// Outcome of a control-plane procedure other than success.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcedureError {
    /// No free slot for a new entity
    #[error("{kind} capacity {capacity} reached")]
    RegistryExhausted {
        /// Entity kind
        kind: &'static str,
        /// Registry capacity
        capacity: usize,
    },

    /// The index does not refer to a live entity
    #[error("{kind} {index} not found")]
    EntityNotFound {
        /// Entity kind
        kind: &'static str,
        /// Index that was looked up
        index: usize,
    },

    /// The peer did not answer in time
    #[error("procedure timed out after {ticks} ticks")]
    Timeout {
        /// Supervision time in ticks
        ticks: u64,
    },

    /// The procedure was cancelled before completing
    #[error("procedure cancelled")]
    Cancelled,

    /// The peer's answer could not be decoded
    #[error("undecodable response: {0}")]
    Decode(String),

    /// The request was rejected with a cause
    #[error("rejected: {cause}")]
    Rejected {
        /// Cause sent by the peer
        cause: F1apCause,
    },

    /// Local resources (bearers, transaction ids) are exhausted
    #[error("resources unavailable: {0}")]
    ResourcesUnavailable(String),

    /// The procedure could not be queued
    #[error("scheduling failed: {0}")]
    Scheduling(#[from] SequencerError),

    /// Unexpected message for the current state
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ProcedureError {
    /// Cause to send to the peer when this error rejects one of its requests.
    pub fn cause(&self) -> F1apCause {
        match self {
            ProcedureError::RegistryExhausted { .. } | ProcedureError::ResourcesUnavailable(_) => {
                F1apCause::ResourcesUnavailable
            }
            ProcedureError::EntityNotFound { kind: "cell", .. } => F1apCause::CellNotAvailable,
            ProcedureError::EntityNotFound { .. } => F1apCause::UnknownUeId,
            ProcedureError::Rejected { cause } => *cause,
            ProcedureError::Protocol(_) | ProcedureError::Decode(_) => F1apCause::MessageNotCompatible,
            _ => F1apCause::Unspecified,
        }
    }
}

impl From<RegistryError> for ProcedureError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Exhausted { kind, capacity } => {
                ProcedureError::RegistryExhausted { kind, capacity }
            }
            RegistryError::NotFound { kind, index } => ProcedureError::EntityNotFound { kind, index },
        }
    }
}

impl From<TransactionError> for ProcedureError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::Timeout { ticks } => ProcedureError::Timeout { ticks },
            TransactionError::Cancelled | TransactionError::Abandoned => ProcedureError::Cancelled,
            TransactionError::Negative(reason) => ProcedureError::Decode(reason),
            TransactionError::IdsExhausted => {
                ProcedureError::ResourcesUnavailable("transaction ids".to_string())
            }
        }
    }
}
