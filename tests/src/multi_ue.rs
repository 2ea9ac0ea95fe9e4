//! Multi-UE integration tests
//!
//! UEs mapped to different UE workers make progress independently: a UE
//! suspended on the DU never holds back another UE.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use integration_tests::{
    init_test_logging, test_stack_config, wait_for_condition, MockF1PeerConfig, TestCuCp,
    TEST_NCI_1, TEST_NCI_2,
};
use nextgran_async::TaskOutcome;
use nextgran_gnb::cu_cp::{UeRepository, UeState};
use nextgran_gnb::f1ap::{F1apMessage, UeContextSetupResponse};
use nextgran_gnb::types::{DrbId, UeIndex};
use nextgran_gnb::{ProcedureError, WorkerPool};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn cu_on_pool(peer: MockF1PeerConfig) -> (TestCuCp, Arc<WorkerPool>) {
    let config = test_stack_config();
    let pool = Arc::new(WorkerPool::start(0, 2).unwrap());
    let test = TestCuCp::new(&config, peer, pool.clone());
    test.setup_f1(&config).unwrap();
    (test, pool)
}

/// Test that a UE waiting on the DU does not block a UE on another worker
#[tokio::test]
async fn test_suspended_ue_does_not_block_other_ue() {
    init_test_logging();
    let (test, pool) = cu_on_pool(MockF1PeerConfig::silent());
    let ue0 = test.processor.handle_ue_creation_request(TEST_NCI_1, 0x4601).unwrap();
    let ue1 = test.processor.handle_ue_creation_request(TEST_NCI_2, 0x4602).unwrap();
    assert_ne!(
        test.processor.ue_manager().get_ue(ue0).unwrap().executor().name(),
        test.processor.ue_manager().get_ue(ue1).unwrap().executor().name()
    );

    let setup0 = test.processor.handle_ue_context_setup(ue0, vec![DrbId(1)]).unwrap();
    let setup1 = test.processor.handle_ue_context_setup(ue1, vec![DrbId(1)]).unwrap();

    let mut request_for_ue1 = None;
    while request_for_ue1.is_none() {
        match test.peer.next_message(WAIT).await {
            Some(msg @ F1apMessage::UeContextSetupRequest(_))
                if msg.ue_index() == Some(UeIndex::from(ue1)) =>
            {
                request_for_ue1 = Some(msg)
            }
            Some(_) => {}
            None => panic!("no UE Context Setup Request for {}", ue1),
        }
    }
    let request = request_for_ue1.unwrap();
    test.peer
        .send(F1apMessage::UeContextSetupResponse(UeContextSetupResponse {
            transaction_id: request.transaction_id(),
            ue_index: UeIndex::from(ue1),
            drbs_failed: vec![],
        }))
        .unwrap();

    assert_eq!(
        timeout(WAIT, setup1).await.unwrap(),
        TaskOutcome::Completed(Ok(()))
    );
    assert_eq!(test.processor.ue_state(ue1), Ok(UeState::Active));

    wait_for_condition(
        || test.processor.ue_state(ue0) == Ok(UeState::AwaitingPeerResponse),
        WAIT,
    )
    .await
    .unwrap();

    assert!(test.processor.cancel_ue_procedure(ue0).unwrap());
    assert_eq!(
        timeout(WAIT, setup0).await.unwrap(),
        TaskOutcome::Completed(Err(ProcedureError::Cancelled))
    );
    assert_eq!(test.processor.ue_state(ue0), Ok(UeState::Cancelled));

    pool.stop();
}

/// Test UE context setups of several UEs running concurrently
#[tokio::test]
async fn test_concurrent_setups_all_complete() {
    init_test_logging();
    let config = test_stack_config();
    let (test, pool) = cu_on_pool(MockF1PeerConfig::default());

    let ues: Vec<_> = (0..config.max_ues)
        .map(|i| {
            test.processor
                .handle_ue_creation_request(TEST_NCI_1, 0x4601 + i as u16)
                .unwrap()
        })
        .collect();
    let completions: Vec<_> = ues
        .iter()
        .map(|&ue| {
            test.processor
                .handle_ue_context_setup(ue, vec![DrbId(1), DrbId(2)])
                .unwrap()
        })
        .collect();

    let outcomes = timeout(WAIT, join_all(completions)).await.unwrap();
    assert!(outcomes
        .iter()
        .all(|outcome| *outcome == TaskOutcome::Completed(Ok(()))));
    for &ue in &ues {
        assert_eq!(test.processor.ue_state(ue), Ok(UeState::Active));
    }
    assert_eq!(
        test.peer
            .count(|msg| matches!(msg, F1apMessage::UeContextSetupRequest(_))),
        config.max_ues
    );

    pool.stop();
}
