//! End-to-end scenario tests
//!
//! A DU manager and a CU-CP DU repository connected back to back through
//! the text codec: F1 Setup, UE context setup and release across both nodes.

use std::sync::Arc;
use std::time::Duration;

use integration_tests::{
    init_test_logging, test_stack_config, Loopback, MockF1PeerConfig, TestCuCp, TEST_NCI_1,
    TEST_NCI_2,
};
use nextgran_async::{InlineExecutor, TaskOutcome, TimerManager};
use nextgran_common::{component_span, StackConfig};
use nextgran_gnb::cu_cp::{UeLifecycleHandler, UeRepository, UeState};
use nextgran_gnb::du::{CellSetupState, DuManager};
use nextgran_gnb::f1ap::{
    EncodingNotifier, F1SetupRequest, F1apMessage, F1apRouter, ServedCell, YamlCodec,
};
use nextgran_gnb::types::{DrbId, DuHandle, F1apCause};
use nextgran_gnb::workers::SingleExecutorMapper;
use nextgran_gnb::{DuProcessorConfig, DuRepository, ProcedureError, TickDriver};

struct Network {
    du: Arc<DuManager>,
    cu: DuRepository,
    du_handle: DuHandle,
}

impl Network {
    fn connect(config: &StackConfig) -> Self {
        let codec = Arc::new(YamlCodec);
        let to_cu = Loopback::new();
        let to_du = Loopback::new();

        let cu = DuRepository::new(
            DuProcessorConfig::from_stack_config(config, "Test-CU"),
            config.max_dus,
            Arc::new(SingleExecutorMapper(InlineExecutor::handle("ue"))),
            TimerManager::new(),
            codec.clone(),
            component_span("cu-cp", 0),
        );
        let du_handle = cu
            .add_du(Arc::new(EncodingNotifier::new(codec.clone(), to_du.clone())))
            .unwrap();
        to_cu.connect(Arc::new(F1apRouter::new(
            codec.clone(),
            cu.get_du(du_handle).unwrap(),
        )));

        let du = Arc::new(
            DuManager::new(
                config,
                InlineExecutor::handle("du"),
                TimerManager::new(),
                Arc::new(EncodingNotifier::new(codec.clone(), to_cu)),
                component_span("du", config.gnb_du_id),
            )
            .unwrap(),
        );
        to_du.connect(Arc::new(F1apRouter::new(codec, du.clone())));

        Self { du, cu, du_handle }
    }
}

/// Test F1 Setup, UE context setup and release between a DU and the CU-CP
#[tokio::test]
async fn test_du_and_cu_cp_back_to_back() {
    init_test_logging();
    let config = test_stack_config();
    let network = Network::connect(&config);

    let active = network.du.start_f1_setup().unwrap().await;
    assert_eq!(active.completed().unwrap().unwrap().len(), 2);
    assert_eq!(network.du.nof_active_cells(), 2);
    assert_eq!(
        network.du.cell_state(network.du.find_cell(TEST_NCI_2).unwrap()),
        Ok(CellSetupState::Active)
    );

    let processor = network.cu.get_du(network.du_handle).unwrap();
    assert_eq!(processor.nof_cells(), 2);
    assert_eq!(
        network.cu.find_du_by_id(config.gnb_du_id),
        Some(network.du_handle)
    );

    let ue = processor.handle_ue_creation_request(TEST_NCI_1, 0x4601).unwrap();
    processor.setup_ue(ue, vec![DrbId(1), DrbId(2)]).await.unwrap();
    assert_eq!(processor.ue_state(ue), Ok(UeState::Active));
    assert_eq!(network.du.nof_ues(), 1);
    assert_eq!(network.cu.nof_ues(), 1);

    UeLifecycleHandler::release_ue(processor.as_ref(), ue, F1apCause::NormalRelease)
        .await
        .unwrap();
    assert_eq!(network.du.nof_ues(), 0);
    assert_eq!(network.cu.nof_ues(), 0);

    network.cu.remove_du(network.du_handle).await.unwrap();
    assert_eq!(network.cu.nof_dus(), 0);
    let _drained = network.du.shutdown().await;
}

/// Test that a UE setup against a DU that never set up its cell is rejected
#[tokio::test]
async fn test_ue_setup_in_inactive_du_cell_is_rejected() {
    init_test_logging();
    let config = test_stack_config();
    let network = Network::connect(&config);
    let processor = network.cu.get_du(network.du_handle).unwrap();

    // The CU-CP knows the cells, the DU never activated them.
    processor.handle_f1_setup_request(F1SetupRequest {
        transaction_id: 7,
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
    });
    assert_eq!(network.du.nof_active_cells(), 0);

    let ue = processor.handle_ue_creation_request(TEST_NCI_1, 0x4601).unwrap();
    assert_eq!(
        processor.setup_ue(ue, vec![DrbId(1)]).await,
        Err(ProcedureError::Rejected {
            cause: F1apCause::CellNotAvailable
        })
    );
    assert_eq!(processor.ue_state(ue), Ok(UeState::Failed));
    assert_eq!(network.du.nof_ues(), 0);
}

/// Test that the tick driver supervises a UE setup on wall-clock time
#[tokio::test(start_paused = true)]
async fn test_tick_driver_times_out_ue_setup() {
    init_test_logging();
    let config = test_stack_config();
    let timeout = config.timers.ue_context_setup_timeout_ticks;
    let test = TestCuCp::inline(&config, MockF1PeerConfig::silent());
    test.setup_f1(&config).unwrap();
    let ue = test.processor.handle_ue_creation_request(TEST_NCI_1, 1).unwrap();

    let driver = TickDriver::start(test.timers.clone(), Duration::from_millis(1));
    let completion = test.processor.handle_ue_context_setup(ue, vec![DrbId(1)]).unwrap();
    assert_eq!(
        completion.await,
        TaskOutcome::Completed(Err(ProcedureError::Timeout { ticks: timeout }))
    );
    assert!(test
        .peer
        .received()
        .iter()
        .any(|msg| matches!(msg, F1apMessage::UeContextSetupRequest(_))));

    let ticks = driver.stop().await;
    assert!(ticks >= timeout);
    assert_eq!(test.processor.ue_state(ue), Ok(UeState::Failed));
}
