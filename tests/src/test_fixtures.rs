//! Test fixtures and configuration helpers
//!
//! Wires a node under test (CU-CP `DuProcessor` or DU `DuManager`) to a
//! [`MockF1Peer`] through the text codec, the same way a deployment wires it
//! to a transport.

use std::sync::Arc;

use bytes::Bytes;
use nextgran_async::{InlineExecutor, TimerManager};
use nextgran_common::{component_span, CellConfig, StackConfig};
use nextgran_gnb::cu_cp::{DuProcessor, DuProcessorConfig};
use nextgran_gnb::du::DuManager;
use nextgran_gnb::f1ap::{
    EncodingNotifier, F1SetupRequest, F1apMessage, F1apRouter, PduNotifier, ServedCell,
    YamlCodec,
};
use nextgran_gnb::workers::{SingleExecutorMapper, UeExecutorMapper};
use parking_lot::Mutex;

use crate::mock_f1_peer::{MockF1Peer, MockF1PeerConfig, MockF1PeerError};

/// NCI of the first test cell
pub const TEST_NCI_1: u64 = 0x000000010;

/// NCI of the second test cell
pub const TEST_NCI_2: u64 = 0x000000020;

/// Stack configuration with two cells and short timers
pub fn test_stack_config() -> StackConfig {
    let mut config = StackConfig {
        gnb_du_id: 1,
        gnb_du_name: "Test-DU".to_string(),
        cells: vec![CellConfig::new(TEST_NCI_1, 1), CellConfig::new(TEST_NCI_2, 2)],
        max_ues: 4,
        ue_task_queue_capacity: 4,
        max_drbs_per_ue: 4,
        ..StackConfig::default()
    };
    config.timers.f1_setup_timeout_ticks = 20;
    config.timers.f1_setup_retries = 1;
    config.timers.ue_context_setup_timeout_ticks = 10;
    config.timers.ue_context_release_timeout_ticks = 5;
    config
}

/// CU-CP under test: one DU processor facing a mock DU
pub struct TestCuCp {
    /// Processor under test
    pub processor: Arc<DuProcessor>,
    /// Mock DU
    pub peer: Arc<MockF1Peer>,
    /// Timers of the processor, ticked by the test
    pub timers: TimerManager,
}

impl TestCuCp {
    /// Builds the CU-CP with UE procedures on the given executors
    pub fn new(
        config: &StackConfig,
        peer_config: MockF1PeerConfig,
        ue_executors: Arc<dyn UeExecutorMapper>,
    ) -> Self {
        let timers = TimerManager::new();
        let peer = MockF1Peer::with_config(peer_config);
        let codec = Arc::new(YamlCodec);
        let processor = Arc::new(DuProcessor::new(
            DuProcessorConfig::from_stack_config(config, "Test-CU"),
            ue_executors,
            timers.clone(),
            Arc::new(EncodingNotifier::new(codec.clone(), peer.clone())),
            codec.clone(),
            component_span("du-processor", 0),
        ));
        peer.connect(Arc::new(F1apRouter::new(codec, processor.clone())));
        Self {
            processor,
            peer,
            timers,
        }
    }

    /// Builds the CU-CP with UE procedures on the test runtime
    pub fn inline(config: &StackConfig, peer_config: MockF1PeerConfig) -> Self {
        Self::new(
            config,
            peer_config,
            Arc::new(SingleExecutorMapper(InlineExecutor::handle("ue"))),
        )
    }

    /// Has the mock DU set up F1 with the cells of `config`
    pub fn setup_f1(&self, config: &StackConfig) -> Result<(), MockF1PeerError> {
        self.peer.send(F1apMessage::F1SetupRequest(F1SetupRequest {
            transaction_id: 0,
            gnb_du_id: config.gnb_du_id,
            gnb_du_name: config.gnb_du_name.clone(),
            served_cells: config
                .cells
                .iter()
                .map(|cell| ServedCell {
                    nci: cell.nci,
                    pci: cell.pci,
                    tac: cell.tac,
                })
                .collect(),
        }))
    }
}

/// DU under test: a DU manager facing a mock CU
pub struct TestDu {
    /// DU manager under test
    pub du: Arc<DuManager>,
    /// Mock CU
    pub peer: Arc<MockF1Peer>,
    /// Timers of the DU, ticked by the test
    pub timers: TimerManager,
}

impl TestDu {
    /// Builds the DU with its procedures on the test runtime
    pub fn new(config: &StackConfig, peer_config: MockF1PeerConfig) -> Self {
        let timers = TimerManager::new();
        let peer = MockF1Peer::with_config(peer_config);
        let codec = Arc::new(YamlCodec);
        let du = Arc::new(
            DuManager::new(
                config,
                InlineExecutor::handle("du"),
                timers.clone(),
                Arc::new(EncodingNotifier::new(codec.clone(), peer.clone())),
                component_span("du", config.gnb_du_id),
            )
            .expect("test DU configuration is valid"),
        );
        peer.connect(Arc::new(F1apRouter::new(codec, du.clone())));
        Self { du, peer, timers }
    }
}

/// Transport handing PDUs straight to the other node's router
#[derive(Default)]
pub struct Loopback {
    router: Mutex<Option<Arc<F1apRouter>>>,
}

impl Loopback {
    /// Create an unconnected loopback
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Connect to the receiving node's router
    pub fn connect(&self, router: Arc<F1apRouter>) {
        *self.router.lock() = Some(router);
    }
}

impl PduNotifier for Loopback {
    fn on_new_pdu(&self, pdu: Bytes) {
        let router = self.router.lock().clone();
        if let Some(router) = router {
            router.handle_pdu(&pdu);
        }
    }
}
