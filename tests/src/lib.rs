//! Integration test framework for nextgran
//!
//! This crate provides test utilities and a mock F1 peer for integration
//! testing of the DU and CU-CP procedures.
//!
//! # Components
//!
//! - [`mock_f1_peer`] - Mock F1 peer playing the CU or the DU
//! - [`test_fixtures`] - Stack configuration and node wiring helpers
//! - [`test_utils`] - Logging, polling and tick helpers
//!
//! # Test Categories
//!
//! 1. **F1 Setup Tests** - DU side setup, timeout and retry
//! 2. **Sequencing Tests** - Per-UE ordering of procedures
//! 3. **UE Lifecycle Tests** - Creation, cancellation, release, capacity
//! 4. **Multi-UE Tests** - Independent progress of UEs on separate executors
//! 5. **End-to-end Scenario** - DU and CU-CP connected back to back

pub mod test_fixtures;

pub use mock_f1_peer::{MockF1Peer, MockF1PeerConfig, MockF1PeerError};
pub use test_fixtures::{
    test_stack_config, Loopback, TestCuCp, TestDu, TEST_NCI_1, TEST_NCI_2,
};
pub use test_utils::{
    advance_ticks, init_test_logging, settle, wait_for_condition, DEFAULT_POLL_INTERVAL,
};
