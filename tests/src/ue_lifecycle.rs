//! UE lifecycle integration tests (CU-CP side)
//!
//! Creation, context setup, cancellation, release and capacity handling of
//! UEs against a mock DU.

use std::time::Duration;

use integration_tests::{
    advance_ticks, init_test_logging, settle, test_stack_config, MockF1PeerConfig, TestCuCp,
    TEST_NCI_1,
};
use nextgran_async::TaskOutcome;
use nextgran_gnb::cu_cp::{UeLifecycleHandler, UeRepository, UeState};
use nextgran_gnb::f1ap::{F1apMessage, RrcCodec, RrcMessage, UeContextSetupResponse, YamlCodec};
use nextgran_gnb::types::{DrbId, F1apCause, SrbId, UeIndex};
use nextgran_gnb::ProcedureError;

const WAIT: Duration = Duration::from_secs(1);

async fn cu_with_cells(peer: MockF1PeerConfig) -> TestCuCp {
    let config = test_stack_config();
    let test = TestCuCp::inline(&config, peer);
    test.setup_f1(&config).unwrap();
    assert!(matches!(
        test.peer.next_message(WAIT).await,
        Some(F1apMessage::F1SetupResponse(_))
    ));
    test
}

/// Test cancelling a UE context setup while it waits for the DU
#[tokio::test]
async fn test_cancel_ue_creation_releases_bearers() {
    init_test_logging();
    let test = cu_with_cells(MockF1PeerConfig::silent()).await;
    let ue = test.processor.handle_ue_creation_request(TEST_NCI_1, 1).unwrap();
    let context = test.processor.ue_manager().get_ue(ue).unwrap();

    let completion = test
        .processor
        .handle_ue_context_setup(ue, vec![DrbId(1), DrbId(2)])
        .unwrap();
    assert!(test.peer.next_message(WAIT).await.is_some());
    settle().await;
    assert_eq!(context.state(), UeState::AwaitingPeerResponse);
    assert_eq!(context.with_bearers(|b| b.nof_provisional()), 3);
    assert_eq!(test.timers.nof_running(), 1);

    assert!(test.processor.cancel_ue_procedure(ue).unwrap());
    assert_eq!(
        completion.await,
        TaskOutcome::Completed(Err(ProcedureError::Cancelled))
    );
    assert_eq!(context.state(), UeState::Cancelled);
    assert_eq!(context.with_bearers(|b| b.nof_provisional()), 0);
    assert_eq!(
        context.with_bearers(|b| (b.established_srbs(), b.established_drbs())),
        (vec![SrbId::SRB0], vec![])
    );
    assert_eq!(test.timers.nof_running(), 0);
    assert_eq!(test.processor.nof_ues(), 1);
}

/// Test a UE set up and released with a cooperative DU
#[tokio::test]
async fn test_ue_setup_and_release() {
    init_test_logging();
    let test = cu_with_cells(MockF1PeerConfig::default()).await;
    let ue = test.processor.handle_ue_creation_request(TEST_NCI_1, 1).unwrap();

    test.processor.setup_ue(ue, vec![DrbId(1)]).await.unwrap();
    assert_eq!(test.processor.ue_state(ue), Ok(UeState::Active));

    UeLifecycleHandler::release_ue(test.processor.as_ref(), ue, F1apCause::NormalRelease)
        .await
        .unwrap();
    assert_eq!(test.processor.nof_ues(), 0);
    assert!(test.processor.find_ue(UeIndex(0)).is_none());

    let command = test
        .peer
        .received()
        .into_iter()
        .find_map(|msg| match msg {
            F1apMessage::UeContextReleaseCommand(command) => Some(command),
            _ => None,
        })
        .unwrap();
    assert_eq!(command.cause, F1apCause::NormalRelease);
    assert!(matches!(
        RrcCodec::decode(&YamlCodec, &command.rrc_container),
        Ok(RrcMessage::RrcRelease { .. })
    ));
}

/// Test that a release the DU never confirms still releases locally
#[tokio::test]
async fn test_release_timeout_releases_locally() {
    init_test_logging();
    let config = test_stack_config();
    let test = cu_with_cells(MockF1PeerConfig {
        auto_ue_context_release: false,
        ..MockF1PeerConfig::default()
    })
    .await;
    let ue = test.processor.handle_ue_creation_request(TEST_NCI_1, 1).unwrap();
    test.processor.setup_ue(ue, vec![]).await.unwrap();

    let processor = test.processor.clone();
    let release =
        tokio::spawn(async move { processor.release_ue(ue, F1apCause::NormalRelease).await });
    settle().await;
    assert_eq!(
        test.processor.ue_state(ue),
        Ok(UeState::AwaitingReleaseConfirmation)
    );

    advance_ticks(&test.timers, config.timers.ue_context_release_timeout_ticks);
    assert_eq!(
        release.await.unwrap(),
        Err(ProcedureError::Timeout {
            ticks: config.timers.ue_context_release_timeout_ticks
        })
    );
    assert_eq!(test.processor.nof_ues(), 0);
}

/// Test capacity exhaustion and index reuse after a release
#[tokio::test]
async fn test_registry_exhaustion_and_reuse_after_release() {
    init_test_logging();
    let config = test_stack_config();
    let test = cu_with_cells(MockF1PeerConfig::default()).await;

    let ues: Vec<_> = (0..config.max_ues)
        .map(|i| {
            test.processor
                .handle_ue_creation_request(TEST_NCI_1, 0x4601 + i as u16)
                .unwrap()
        })
        .collect();
    let err = test
        .processor
        .handle_ue_creation_request(TEST_NCI_1, 0x4700)
        .unwrap_err();
    assert_eq!(
        err,
        ProcedureError::RegistryExhausted {
            kind: "ue",
            capacity: config.max_ues
        }
    );
    assert_eq!(err.cause(), F1apCause::ResourcesUnavailable);

    test.processor
        .release_ue(ues[1], F1apCause::NormalRelease)
        .await
        .unwrap();
    let reused = test
        .processor
        .handle_ue_creation_request(TEST_NCI_1, 0x4700)
        .unwrap();
    assert_eq!(reused.index(), ues[1].index());
    assert!(matches!(
        test.processor.ue_state(ues[1]),
        Err(ProcedureError::EntityNotFound { kind: "ue", .. })
    ));
    assert_eq!(test.processor.ue_state(reused), Ok(UeState::Idle));
    assert_eq!(test.processor.nof_ues(), config.max_ues);
}

/// Test that the setup timer firing after completion is a no-op
#[tokio::test]
async fn test_setup_timer_after_completion_is_noop() {
    init_test_logging();
    let config = test_stack_config();
    let test = cu_with_cells(MockF1PeerConfig::default()).await;
    let ue = test.processor.handle_ue_creation_request(TEST_NCI_1, 1).unwrap();

    test.processor.setup_ue(ue, vec![DrbId(3)]).await.unwrap();
    advance_ticks(
        &test.timers,
        config.timers.ue_context_setup_timeout_ticks * 3,
    );
    settle().await;

    assert_eq!(test.processor.ue_state(ue), Ok(UeState::Active));
    assert_eq!(test.timers.nof_running(), 0);
}

/// Test that an undecodable setup answer fails the setup and rolls back
#[tokio::test]
async fn test_undecodable_setup_response_rolls_back() {
    init_test_logging();
    let test = cu_with_cells(MockF1PeerConfig::silent()).await;
    let ue = test.processor.handle_ue_creation_request(TEST_NCI_1, 1).unwrap();

    let completion = test.processor.handle_ue_context_setup(ue, vec![DrbId(1)]).unwrap();
    let request = test.peer.next_message(WAIT).await.unwrap();
    let pdu = format!(
        "UeContextSetupResponse:\n  transaction_id: {}\n",
        request.transaction_id()
    );
    test.peer.send_raw(pdu.as_bytes()).unwrap();

    assert!(matches!(
        completion.await,
        TaskOutcome::Completed(Err(ProcedureError::Decode(_)))
    ));
    let context = test.processor.ue_manager().get_ue(ue).unwrap();
    assert_eq!(context.state(), UeState::Failed);
    assert_eq!(context.with_bearers(|b| b.nof_provisional()), 0);
}

/// Test that a setup answer naming another UE does not complete this UE's setup
#[tokio::test]
async fn test_setup_response_for_other_ue_is_rejected() {
    init_test_logging();
    let test = cu_with_cells(MockF1PeerConfig::silent()).await;
    let ue_a = test.processor.handle_ue_creation_request(TEST_NCI_1, 1).unwrap();
    let ue_b = test.processor.handle_ue_creation_request(TEST_NCI_1, 2).unwrap();
    assert_ne!(UeIndex::from(ue_a), UeIndex::from(ue_b));

    let completion = test.processor.handle_ue_context_setup(ue_a, vec![DrbId(1)]).unwrap();
    let request = test.peer.next_message(WAIT).await.unwrap();
    assert_eq!(request.ue_index(), Some(UeIndex::from(ue_a)));
    test.peer
        .send(F1apMessage::UeContextSetupResponse(UeContextSetupResponse {
            transaction_id: request.transaction_id(),
            ue_index: UeIndex::from(ue_b),
            drbs_failed: vec![],
        }))
        .unwrap();

    assert!(matches!(
        completion.await,
        TaskOutcome::Completed(Err(ProcedureError::Protocol(_)))
    ));
    let context = test.processor.ue_manager().get_ue(ue_a).unwrap();
    assert_eq!(context.state(), UeState::Failed);
    assert_eq!(context.with_bearers(|b| b.nof_provisional()), 0);
    assert!(context.with_bearers(|b| b.established_drbs()).is_empty());
    assert_eq!(test.processor.ue_state(ue_b), Ok(UeState::Idle));
}

/// Test UE creation in a cell the DU never set up
#[tokio::test]
async fn test_ue_creation_in_unknown_cell() {
    init_test_logging();
    let test = cu_with_cells(MockF1PeerConfig::default()).await;
    let err = test
        .processor
        .handle_ue_creation_request(0xdead, 1)
        .unwrap_err();
    assert_eq!(err.cause(), F1apCause::CellNotAvailable);
    assert_eq!(test.processor.nof_ues(), 0);
}
