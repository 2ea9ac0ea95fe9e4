//! Per-UE sequencing integration tests
//!
//! Procedures of one UE run strictly one after the other, in the order they
//! were scheduled, even while the current one is suspended on the DU.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use integration_tests::{
    init_test_logging, settle, test_stack_config, MockF1PeerConfig, TestCuCp, TEST_NCI_1,
};
use nextgran_async::{SequencerError, TaskOutcome};
use nextgran_gnb::cu_cp::{UeLifecycleHandler, UeRepository, UeState, UeTask};
use nextgran_gnb::f1ap::{F1apMessage, UeContextReleaseComplete, UeContextSetupResponse};
use nextgran_gnb::types::{DrbId, F1apCause, UeIndex};
use nextgran_gnb::ProcedureError;
use parking_lot::Mutex;
use tokio::sync::oneshot;

const WAIT: Duration = Duration::from_secs(1);

fn setup_requests(test: &TestCuCp) -> usize {
    test.peer
        .count(|msg| matches!(msg, F1apMessage::UeContextSetupRequest(_)))
}

fn release_commands(test: &TestCuCp) -> usize {
    test.peer
        .count(|msg| matches!(msg, F1apMessage::UeContextReleaseCommand(_)))
}

fn answer_setup(test: &TestCuCp, msg: &F1apMessage) {
    test.peer
        .send(F1apMessage::UeContextSetupResponse(UeContextSetupResponse {
            transaction_id: msg.transaction_id(),
            ue_index: msg.ue_index().unwrap_or(UeIndex(0)),
            drbs_failed: vec![],
        }))
        .unwrap();
}

/// Test two setups scheduled back to back for the same new UE
#[tokio::test]
async fn test_back_to_back_setups_on_same_ue() {
    init_test_logging();
    let config = test_stack_config();
    let test = TestCuCp::inline(&config, MockF1PeerConfig::silent());
    test.setup_f1(&config).unwrap();
    let _ = test.peer.next_message(WAIT).await;

    let ue = test.processor.handle_ue_creation_request(TEST_NCI_1, 0x4601).unwrap();
    let first = test.processor.handle_ue_context_setup(ue, vec![DrbId(1)]).unwrap();
    let second = test.processor.handle_ue_context_setup(ue, vec![DrbId(2)]).unwrap();

    let request = test.peer.next_message(WAIT).await.unwrap();
    settle().await;
    assert_eq!(setup_requests(&test), 1);
    match &request {
        F1apMessage::UeContextSetupRequest(request) => assert_eq!(request.drbs, vec![DrbId(1)]),
        other => panic!("expected UE Context Setup Request, got {:?}", other),
    }

    answer_setup(&test, &request);
    assert_eq!(first.await, TaskOutcome::Completed(Ok(())));

    let request = test.peer.next_message(WAIT).await.unwrap();
    assert_eq!(setup_requests(&test), 2);
    match &request {
        F1apMessage::UeContextSetupRequest(request) => assert_eq!(request.drbs, vec![DrbId(2)]),
        other => panic!("expected UE Context Setup Request, got {:?}", other),
    }
    answer_setup(&test, &request);
    assert_eq!(second.await, TaskOutcome::Completed(Ok(())));

    let context = test.processor.ue_manager().get_ue(ue).unwrap();
    assert_eq!(context.state(), UeState::Active);
    assert_eq!(
        context.with_bearers(|bearers| bearers.established_drbs()),
        vec![DrbId(1), DrbId(2)]
    );
}

/// Test FIFO completion and a single current task per UE
#[tokio::test]
async fn test_ue_tasks_fifo_and_never_overlap() {
    init_test_logging();
    let config = test_stack_config();
    let test = TestCuCp::inline(&config, MockF1PeerConfig::default());
    test.setup_f1(&config).unwrap();
    let ue = test.processor.handle_ue_creation_request(TEST_NCI_1, 1).unwrap();

    let running = Arc::new(AtomicUsize::new(0));
    let max_running = Arc::new(AtomicUsize::new(0));
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut completions = Vec::new();
    for i in 0..4 {
        let running = running.clone();
        let max_running = max_running.clone();
        let order = order.clone();
        let task: UeTask = Box::new(move |_cancel| {
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_running.fetch_max(now, Ordering::SeqCst);
                for _ in 0..3 {
                    tokio::task::yield_now().await;
                }
                order.lock().push(i);
                running.fetch_sub(1, Ordering::SeqCst);
            }
            .boxed()
        });
        completions.push(test.processor.handle_ue_async_task(ue, task).unwrap());
    }

    for completion in completions {
        assert_eq!(completion.await, TaskOutcome::Completed(()));
    }
    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    assert_eq!(max_running.load(Ordering::SeqCst), 1);
}

/// Test that a full UE queue rejects new procedures
#[tokio::test]
async fn test_full_ue_queue_rejects_procedures() {
    init_test_logging();
    let config = test_stack_config();
    let test = TestCuCp::inline(&config, MockF1PeerConfig::default());
    test.setup_f1(&config).unwrap();
    let ue = test.processor.handle_ue_creation_request(TEST_NCI_1, 1).unwrap();

    let (release_tx, release_rx) = oneshot::channel::<()>();
    let blocker: UeTask = Box::new(move |_cancel| {
        async move {
            let _ = release_rx.await;
        }
        .boxed()
    });
    let blocked = test.processor.handle_ue_async_task(ue, blocker).unwrap();
    settle().await;

    let mut queued = Vec::new();
    for _ in 0..config.ue_task_queue_capacity {
        let task: UeTask = Box::new(|_cancel| async {}.boxed());
        queued.push(test.processor.handle_ue_async_task(ue, task).unwrap());
    }

    let overflow: UeTask = Box::new(|_cancel| async {}.boxed());
    match test.processor.handle_ue_async_task(ue, overflow) {
        Err(ProcedureError::Scheduling(SequencerError::QueueFull { capacity, .. })) => {
            assert_eq!(capacity, config.ue_task_queue_capacity)
        }
        Err(other) => panic!("expected queue full, got {}", other),
        Ok(_) => panic!("expected queue full"),
    }

    release_tx.send(()).unwrap();
    assert_eq!(blocked.await, TaskOutcome::Completed(()));
    for completion in queued {
        assert_eq!(completion.await, TaskOutcome::Completed(()));
    }
}

/// Test two setups accepted back to back with room for one queued procedure
#[tokio::test]
async fn test_back_to_back_setups_with_single_queue_slot() {
    init_test_logging();
    let mut config = test_stack_config();
    config.ue_task_queue_capacity = 1;
    let test = TestCuCp::inline(&config, MockF1PeerConfig::default());
    test.setup_f1(&config).unwrap();

    let ue = test.processor.handle_ue_creation_request(TEST_NCI_1, 0x4601).unwrap();
    let first = test.processor.handle_ue_context_setup(ue, vec![DrbId(1)]).unwrap();
    let second = test.processor.handle_ue_context_setup(ue, vec![DrbId(2)]).unwrap();
    assert!(matches!(
        test.processor.handle_ue_context_setup(ue, vec![DrbId(3)]),
        Err(ProcedureError::Scheduling(SequencerError::QueueFull { capacity: 1, .. }))
    ));

    assert_eq!(first.await, TaskOutcome::Completed(Ok(())));
    assert_eq!(second.await, TaskOutcome::Completed(Ok(())));
    assert_eq!(setup_requests(&test), 2);
}

/// Test that a release issued during a pending setup waits for the setup
#[tokio::test]
async fn test_release_waits_for_pending_setup() {
    init_test_logging();
    let config = test_stack_config();
    let test = TestCuCp::inline(&config, MockF1PeerConfig::silent());
    test.setup_f1(&config).unwrap();
    let _ = test.peer.next_message(WAIT).await;

    let ue = test.processor.handle_ue_creation_request(TEST_NCI_1, 0x4601).unwrap();
    let index = UeIndex::from(ue);
    let setup = test.processor.handle_ue_context_setup(ue, vec![DrbId(1)]).unwrap();
    let request = test.peer.next_message(WAIT).await.unwrap();
    assert!(matches!(request, F1apMessage::UeContextSetupRequest(_)));

    let processor = test.processor.clone();
    let release = tokio::spawn(async move {
        UeLifecycleHandler::release_ue(processor.as_ref(), ue, F1apCause::NormalRelease).await
    });
    settle().await;
    assert_eq!(release_commands(&test), 0);
    assert_eq!(test.processor.find_ue(index), Some(ue));
    assert_eq!(test.processor.ue_state(ue), Ok(UeState::AwaitingPeerResponse));

    answer_setup(&test, &request);
    assert_eq!(setup.await, TaskOutcome::Completed(Ok(())));

    let command = test.peer.next_message(WAIT).await.unwrap();
    assert!(matches!(command, F1apMessage::UeContextReleaseCommand(_)));
    assert_eq!(command.ue_index(), Some(index));
    assert_eq!(release_commands(&test), 1);
    assert_eq!(
        test.processor.ue_state(ue),
        Ok(UeState::AwaitingReleaseConfirmation)
    );
    assert_eq!(test.processor.find_ue(index), Some(ue));

    test.peer
        .send(F1apMessage::UeContextReleaseComplete(UeContextReleaseComplete {
            transaction_id: command.transaction_id(),
            ue_index: index,
        }))
        .unwrap();
    assert_eq!(release.await.unwrap(), Ok(()));
    assert_eq!(test.processor.find_ue(index), None);
    assert_eq!(test.processor.nof_ues(), 0);
}
