//! nextgran-async - procedure scheduling substrate for the gNB control plane
//!
//! This crate provides the pieces every control-plane procedure is built on:
//!
//! - [`executor`]: single-threaded FIFO workers, one per latency domain
//! - [`task`]: boxed async tasks, cancellation signals and completion handles
//! - [`transaction`]: correlation of outbound requests with their responses
//! - [`sequencer`]: per-entity FIFO of procedures, at most one current task
//! - [`timer`]: tick-driven timers whose expiry is posted to their executor
//! - [`registry`]: bounded, generation-checked entity tables
//!
//! # Architecture
//!
//! ```text
//!            tick()                     inbound message
//!              │                              │
//!      ┌───────▼───────┐            ┌─────────▼─────────┐
//!      │ TimerManager  │            │ TransactionManager│
//!      └───────┬───────┘            └─────────┬─────────┘
//!              │ post expiry                  │ wake awaiting task
//!      ┌───────▼──────────────────────────────▼────────┐
//!      │ WorkerExecutor (one thread, FIFO)             │
//!      │   ┌──────────────┐  ┌──────────────┐          │
//!      │   │ Sequencer UE0│  │ Sequencer UE1│   ...    │
//!      │   └──────────────┘  └──────────────┘          │
//!      └───────────────────────────────────────────────┘
//! ```
//!
//! Entity contexts live in an [`registry::EntityRegistry`] and are referred to
//! by generation-checked handles only.

pub mod error;
pub mod executor;
pub mod registry;
pub mod sequencer;
pub mod task;
pub mod timer;
pub mod transaction;

pub use error::{ExecutorError, RegistryError, SequencerError, TransactionError};
pub use executor::{ExecutorHandle, InlineExecutor, TaskExecutor, WorkerExecutor};
pub use registry::{EntityHandle, EntityKind, EntityRegistry};
pub use sequencer::{DrainMode, Drained, TaskSequencer};
pub use task::{AsyncTask, CancelSignal, Cancelled, TaskCompletion, TaskOutcome};
pub use timer::{TimerExpiry, TimerId, TimerManager, UniqueTimer};
pub use transaction::{ProtocolTransaction, ProtocolTransactionManager, TransactionId};
