//! Error types for the scheduling substrate
//!
//! Every error here is returned to the immediate caller. None of them crosses
//! a suspension point: a task that times out or is cancelled reports that as
//! its result, not as a panic or an unwinding error.

use thiserror::Error;

/// Errors raised when starting or posting to an executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The worker thread or its runtime could not be created.
    #[error("failed to start executor {name}: {source}")]
    Start {
        /// Executor name
        name: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The executor has been stopped and no longer accepts work.
    #[error("executor {0} is stopped")]
    Stopped(String),
}

/// Errors raised by an entity registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Every slot is occupied.
    #[error("{kind} registry exhausted (capacity {capacity})")]
    Exhausted {
        /// Entity kind name
        kind: &'static str,
        /// Fixed registry capacity
        capacity: usize,
    },

    /// The handle does not refer to a live entity (never allocated, released,
    /// or the slot has since been reused).
    #[error("{kind} index {index} not found")]
    NotFound {
        /// Entity kind name
        kind: &'static str,
        /// Slot index carried by the handle
        index: usize,
    },
}

/// Errors raised when scheduling onto a task sequencer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequencerError {
    /// The sequencer is draining or closed and rejects new tasks.
    #[error("sequencer {0} is closed")]
    Closed(String),

    /// The pending queue is full.
    #[error("sequencer {name} queue full (capacity {capacity})")]
    QueueFull {
        /// Sequencer name
        name: String,
        /// Maximum number of pending tasks
        capacity: usize,
    },

    /// The executor the sequencer would run on does not accept work.
    #[error("executor for sequencer {0} is stopped")]
    ExecutorStopped(String),
}

/// Terminal outcomes of awaiting a protocol transaction other than a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// The supervision timer fired before a response arrived.
    #[error("no response within {ticks} ticks")]
    Timeout {
        /// Timeout in ticks
        ticks: u64,
    },

    /// The awaiting task was cancelled.
    #[error("transaction cancelled")]
    Cancelled,

    /// The peer answered negatively, or with a message that could not be
    /// decoded.
    #[error("negative response: {0}")]
    Negative(String),

    /// The transaction manager was shut down while the transaction was pending.
    #[error("transaction abandoned")]
    Abandoned,

    /// All transaction identifiers are in use.
    #[error("no free transaction id")]
    IdsExhausted,
}
