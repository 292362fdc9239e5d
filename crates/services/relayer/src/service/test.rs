#![allow(non_snake_case)]
#![allow(clippy::arithmetic_side_effects)]

use super::{
    state::RelayLocal,
    *,
};
use crate::{
    ports::{
        MockCheckpointStore,
        MockProofBuilder,
        ProofUnavailable,
        StorageError,
    },
    storage::InMemoryCheckpointStore,
    test_helpers::{
        FakeSigner,
        FakeSourceChain,
        FakeTargetChain,
    },
};
use lightbridge_client::Backoff;
use lightbridge_types::{
    Bytes32,
    EpochId,
    entities::{
        Proof,
        ProofKind,
    },
};
use pretty_assertions::assert_eq;

type TestTask = Task<FakeSourceChain, FakeTargetChain, FakeSigner, InMemoryCheckpointStore>;

fn config() -> Config {
    Config {
        start_height: 100.into(),
        signer_account_id: "relayer.test".to_string(),
        polling_interval: Duration::from_secs(1),
        confirmation_timeout: Duration::from_secs(10),
        confirmation_poll_interval: Duration::from_secs(1),
        ..Default::default()
    }
}

struct Setup {
    source: FakeSourceChain,
    target: FakeTargetChain,
    store: InMemoryCheckpointStore,
}

impl Setup {
    fn new(tip: u64, epoch_length: u64) -> Self {
        let source = FakeSourceChain::new(100..=tip, epoch_length);
        let target = FakeTargetChain::new(&source.header_at(100));
        Self {
            source,
            target,
            store: InMemoryCheckpointStore::default(),
        }
    }

    async fn task(&self, config: Config) -> TestTask {
        self.task_with_proofs(config, None).await
    }

    async fn task_with_proofs(
        &self,
        config: Config,
        proof_builder: Option<Arc<dyn ProofBuilder>>,
    ) -> TestTask {
        NotInitializedTask::new(
            self.source.clone(),
            self.target.clone(),
            FakeSigner::default(),
            self.store.clone(),
            proof_builder,
            config,
        )
        .into_task(&StateWatcher::started(), ())
        .await
        .unwrap()
    }
}

async fn relay_up_to(task: &mut TestTask, height: u64) {
    task.prepare().await.unwrap();
    for height in *task.relayed() + 1..=height {
        assert_eq!(
            task.relay(height.into()).await.unwrap(),
            RelayOutcome::Relayed
        );
    }
}

#[tokio::test(start_paused = true)]
async fn prepare__bootstraps_the_checkpoint_at_the_start_height() {
    let setup = Setup::new(105, 10);
    let mut task = setup.task(config()).await;

    task.prepare().await.unwrap();

    let checkpoint = setup.store.get().unwrap();
    assert_eq!(checkpoint.last_relayed_height, 100.into());
    assert_eq!(checkpoint.last_relayed_hash, setup.source.header_at(100).hash);
    assert_eq!(checkpoint.recent.len(), 1);
    assert_eq!(task.relayed(), 100.into());
}

#[tokio::test(start_paused = true)]
async fn prepare__resumes_from_the_stored_checkpoint() {
    let setup = Setup::new(105, 10);
    let mut checkpoint = RelayCheckpoint::starting_at(&setup.source.header_at(100));
    checkpoint.advance((&setup.source.header_at(101)).into(), Some(0), 8);
    setup.store.clone().save(&checkpoint).unwrap();
    let mut task = setup.task(config()).await;

    task.prepare().await.unwrap();

    assert_eq!(task.relayed(), 101.into());
    assert!(setup.source.header_requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn prepare__corrupted_checkpoint_is_fatal() {
    let setup = Setup::new(105, 10);
    let mut store = MockCheckpointStore::default();
    store
        .expect_load()
        .returning(|| Err(StorageError::Corrupted("garbage".to_string())));
    let mut task = NotInitializedTask::new(
        setup.source.clone(),
        setup.target.clone(),
        FakeSigner::default(),
        store,
        None,
        config(),
    )
    .into_task(&StateWatcher::started(), ())
    .await
    .unwrap();

    let err = task.prepare().await.unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(err, RelayError::CheckpointCorrupted(_)));
}

#[tokio::test(start_paused = true)]
async fn prepare__bootstraps_at_the_light_client_head() {
    let setup = Setup::new(105, 10);
    let head = setup.source.header_at(103);
    setup.target.update_data(|data| {
        data.known_headers.insert(head.hash);
        data.head = Some(head.height);
    });
    let mut task = setup.task(config()).await;

    task.prepare().await.unwrap();

    assert_eq!(task.relayed(), 103.into());
    assert_eq!(setup.store.get().unwrap().last_relayed_hash, head.hash);
    relay_up_to(&mut task, 104).await;
    assert_eq!(setup.target.relayed(), vec![104]);
}

#[tokio::test(start_paused = true)]
async fn prepare__start_header_unknown_to_the_light_client_is_refused() {
    let setup = Setup::new(105, 10);
    setup.target.update_data(|data| {
        data.known_headers.clear();
        data.head = None;
    });
    let mut task = setup.task(config()).await;

    let err = task.prepare().await.unwrap_err();

    assert!(!err.is_fatal());
    assert!(matches!(
        err,
        RelayError::UnknownStartHeader { height, .. } if height == 100.into()
    ));
    assert_eq!(setup.store.get(), None);
}

#[tokio::test(start_paused = true)]
async fn into_task__invalid_error_backoff_is_refused() {
    let setup = Setup::new(105, 10);
    let config = Config {
        error_backoff: Backoff {
            initial: Duration::from_secs(10),
            max: Duration::from_secs(1),
            jitter_percent: 0,
        },
        ..config()
    };

    let result = NotInitializedTask::new(
        setup.source.clone(),
        setup.target.clone(),
        FakeSigner::default(),
        setup.store.clone(),
        None,
        config,
    )
    .into_task(&StateWatcher::started(), ())
    .await;

    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn relay__advances_the_checkpoint() {
    let setup = Setup::new(105, 10);
    let mut task = setup.task(config()).await;
    task.prepare().await.unwrap();

    let outcome = task.relay(101.into()).await.unwrap();

    assert_eq!(outcome, RelayOutcome::Relayed);
    let checkpoint = setup.store.get().unwrap();
    assert_eq!(checkpoint.last_relayed(), (&setup.source.header_at(101)).into());
    assert_eq!(checkpoint.last_submission_sequence, Some(0));
    assert_eq!(checkpoint.in_flight, None);
    assert_eq!(setup.target.relayed(), vec![101]);
}

#[tokio::test(start_paused = true)]
async fn relay__header_the_light_client_knows_is_not_submitted() {
    let setup = Setup::new(105, 10);
    let known = setup.source.header_at(101);
    setup
        .target
        .update_data(|data| data.known_headers.insert(known.hash));
    let mut task = setup.task(config()).await;
    task.prepare().await.unwrap();

    assert_eq!(
        task.relay(101.into()).await.unwrap(),
        RelayOutcome::AlreadyKnown
    );
    assert!(setup.target.broadcasts().is_empty());
    let checkpoint = setup.store.get().unwrap();
    assert_eq!(checkpoint.last_relayed_hash, known.hash);
    assert_eq!(checkpoint.last_submission_sequence, None);

    assert_eq!(task.relay(102.into()).await.unwrap(), RelayOutcome::Relayed);
    assert_eq!(setup.target.broadcasts()[0].sequence, 0);
}

#[tokio::test(start_paused = true)]
async fn relay__refuses_heights_out_of_order() {
    let setup = Setup::new(105, 10);
    let mut task = setup.task(config()).await;
    task.prepare().await.unwrap();

    let result = task.relay(103.into()).await;

    assert!(matches!(result, Err(RelayError::InconsistentSource(_))));
    assert!(setup.target.broadcasts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn relay__attaches_the_validator_set_on_epoch_boundaries() {
    // Epochs of 5 heights: 100 to 104 are epoch 20, 105 starts epoch 21.
    let setup = Setup::new(106, 5);
    let mut task = setup.task(config()).await;

    relay_up_to(&mut task, 106).await;

    let sets: Vec<_> = setup
        .target
        .payloads()
        .into_iter()
        .map(|payload| payload.validator_set.map(|set| set.epoch))
        .collect();
    assert_eq!(
        sets,
        vec![None, None, None, None, Some(EpochId::new(21)), None]
    );
    assert_eq!(setup.store.get().unwrap().last_relayed_epoch, EpochId::new(21));
}

#[tokio::test(start_paused = true)]
async fn relay__attaches_the_proof() {
    let setup = Setup::new(105, 10);
    let mut builder = MockProofBuilder::default();
    builder.expect_build_proof().returning(|height| {
        Ok(Proof {
            kind: ProofKind::Header,
            subject_height: height,
            payload: vec![0xaa; 8],
        })
    });
    let mut task = setup
        .task_with_proofs(config(), Some(Arc::new(builder)))
        .await;

    relay_up_to(&mut task, 101).await;

    let proof = setup.target.payloads()[0].proof.clone().unwrap();
    assert_eq!(proof.subject_height, 101.into());
}

#[tokio::test(start_paused = true)]
async fn relay__unavailable_proof_keeps_the_checkpoint() {
    let setup = Setup::new(105, 10);
    let mut builder = MockProofBuilder::default();
    builder.expect_build_proof().returning(|height| {
        Err(ProofUnavailable {
            height,
            reason: "not finalized".to_string(),
        })
    });
    let mut task = setup
        .task_with_proofs(config(), Some(Arc::new(builder)))
        .await;
    task.prepare().await.unwrap();

    let result = task.relay(101.into()).await;

    assert!(matches!(result, Err(RelayError::Proof(_))));
    assert_eq!(task.relayed(), 100.into());
    assert!(setup.target.broadcasts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn relay__rolls_back_to_the_fork_point() {
    let setup = Setup::new(110, 10);
    let mut task = setup.task(config()).await;
    relay_up_to(&mut task, 110).await;
    setup.source.reorg(104, 1);
    setup.source.extend_to(111);

    let outcome = task.relay(111.into()).await.unwrap();

    assert_eq!(outcome, RelayOutcome::RolledBack);
    let checkpoint = setup.store.get().unwrap();
    assert_eq!(checkpoint.last_relayed(), (&setup.source.header_at(103)).into());
    assert_eq!(checkpoint.recent.last(), Some(&checkpoint.last_relayed()));
    assert_eq!(task.relayed(), 103.into());

    relay_up_to(&mut task, 111).await;
    assert_eq!(
        setup.store.get().unwrap().last_relayed_hash,
        setup.source.header_at(111).hash
    );
}

#[tokio::test(start_paused = true)]
async fn relay__rollback_to_the_oldest_remembered_header() {
    let config = Config {
        max_reorg_depth: 3,
        ..config()
    };
    let setup = Setup::new(110, 10);
    let mut task = setup.task(config).await;
    relay_up_to(&mut task, 110).await;
    // Remembers 107 to 110, 107 stays canonical.
    setup.source.reorg(108, 1);
    setup.source.extend_to(111);

    assert_eq!(
        task.relay(111.into()).await.unwrap(),
        RelayOutcome::RolledBack
    );
    assert_eq!(task.relayed(), 107.into());
}

#[tokio::test(start_paused = true)]
async fn relay__reorg_deeper_than_the_history_is_fatal() {
    let config = Config {
        max_reorg_depth: 3,
        ..config()
    };
    let setup = Setup::new(110, 10);
    let mut task = setup.task(config).await;
    relay_up_to(&mut task, 110).await;
    setup.source.reorg(105, 1);
    setup.source.extend_to(111);

    let err = task.relay(111.into()).await.unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(
        err,
        RelayError::ReorgDepthExceeded {
            max_reorg_depth: 3,
            ..
        }
    ));
    assert_eq!(task.relayed(), 110.into());
}

#[tokio::test(start_paused = true)]
async fn relay__header_that_links_nowhere_is_inconsistent() {
    let setup = Setup::new(110, 10);
    let mut task = setup.task(config()).await;
    relay_up_to(&mut task, 110).await;
    setup.source.extend_to(111);
    setup.source.update_data(|data| {
        data.headers.get_mut(&111).unwrap().prev_hash = Bytes32::zeroed();
    });

    let result = task.relay(111.into()).await;

    assert!(matches!(result, Err(RelayError::InconsistentSource(_))));
    assert_eq!(task.relayed(), 110.into());
}

#[tokio::test(start_paused = true)]
async fn relay__rejected_header_is_retried_unless_skipping() {
    let setup = Setup::new(105, 10);
    setup.target.update_data(|data| {
        data.rejections.push_back("invalid signatures".to_string());
    });
    let mut task = setup.task(config()).await;
    task.prepare().await.unwrap();

    let result = task.relay(101.into()).await;

    assert!(matches!(
        result,
        Err(RelayError::Submission(SubmissionError::Rejected { .. }))
    ));
    assert_eq!(task.relayed(), 100.into());
    assert_eq!(task.relay(101.into()).await.unwrap(), RelayOutcome::Relayed);
}

#[tokio::test(start_paused = true)]
async fn relay__rejected_header_is_skipped_when_configured() {
    let setup = Setup::new(105, 10);
    setup.target.update_data(|data| {
        data.rejections.push_back("invalid signatures".to_string());
    });
    let config = Config {
        skip_on_rejection: true,
        ..config()
    };
    let mut task = setup.task(config).await;
    task.prepare().await.unwrap();

    let outcome = task.relay(101.into()).await.unwrap();

    assert_eq!(outcome, RelayOutcome::Skipped);
    let checkpoint = setup.store.get().unwrap();
    assert_eq!(checkpoint.last_relayed_height, 101.into());
    assert_eq!(checkpoint.last_submission_sequence, None);
}

#[tokio::test(start_paused = true)]
async fn relay__timed_out_header_that_lands_later_is_relayed_once() {
    let setup = Setup::new(105, 10);
    setup.target.update_data(|data| data.hold = true);
    let config = Config {
        replace_by_fee: false,
        ..config()
    };
    let mut task = setup.task(config).await;
    task.prepare().await.unwrap();

    let result = task.relay(101.into()).await;
    assert!(matches!(
        result,
        Err(RelayError::Submission(SubmissionError::Timeout(_)))
    ));
    assert_eq!(task.relayed(), 100.into());
    let in_flight = setup.store.get().unwrap().in_flight.unwrap();
    assert_eq!(in_flight.height(), 101.into());
    setup.target.update_data(|data| data.hold = false);
    setup.target.include_pending();

    assert_eq!(task.relay(101.into()).await.unwrap(), RelayOutcome::Relayed);
    assert_eq!(task.relay(102.into()).await.unwrap(), RelayOutcome::Relayed);

    let broadcasts: Vec<_> = setup
        .target
        .broadcasts()
        .iter()
        .map(|b| (*b.height, b.sequence))
        .collect();
    assert_eq!(broadcasts, vec![(101, 0), (102, 1)]);
    assert_eq!(setup.target.relayed(), vec![101, 102]);
    let checkpoint = setup.store.get().unwrap();
    assert_eq!(checkpoint.last_submission_sequence, Some(1));
    assert_eq!(checkpoint.in_flight, None);
}

#[tokio::test(start_paused = true)]
async fn prepare__keeps_a_pending_submission_in_flight() {
    let setup = Setup::new(105, 10);
    setup.target.update_data(|data| data.hold = true);
    let mut task = setup.task(config()).await;
    task.prepare().await.unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(1), task.relay(101.into())).await;
    drop(task);

    let mut restarted = setup.task(config()).await;
    restarted.prepare().await.unwrap();

    let in_flight = setup.store.get().unwrap().in_flight;
    assert_eq!(in_flight.map(|s| s.height()), Some(101.into()));
    setup.target.include_pending();
    setup.target.update_data(|data| data.hold = false);
    assert_eq!(restarted.relay(101.into()).await.unwrap(), RelayOutcome::Relayed);
    assert_eq!(setup.target.broadcasts().len(), 1);
    assert_eq!(setup.target.relayed(), vec![101]);
}

#[tokio::test(start_paused = true)]
async fn prepare__confirms_the_submission_in_flight_before_a_restart() {
    let setup = Setup::new(105, 10);
    setup.target.update_data(|data| data.hold = true);
    let mut task = setup.task(config()).await;
    task.prepare().await.unwrap();
    // Interrupted while waiting for the confirmation.
    let _ = tokio::time::timeout(Duration::from_secs(1), task.relay(101.into())).await;
    drop(task);
    let in_flight = setup.store.get().unwrap().in_flight.unwrap();
    assert_eq!(in_flight.height(), 101.into());
    setup.target.update_data(|data| data.hold = false);
    setup.target.include_pending();

    let mut restarted = setup.task(config()).await;
    restarted.prepare().await.unwrap();

    let checkpoint = setup.store.get().unwrap();
    assert_eq!(checkpoint.last_relayed_height, 101.into());
    assert_eq!(checkpoint.in_flight, None);
    assert_eq!(setup.target.broadcasts().len(), 1);

    relay_up_to(&mut restarted, 102).await;
    assert_eq!(setup.target.broadcasts()[1].sequence, 1);
}

#[tokio::test(start_paused = true)]
async fn prepare__releases_a_sequence_the_chain_moved_past() {
    let setup = Setup::new(105, 10);
    let mut checkpoint = RelayCheckpoint::starting_at(&setup.source.header_at(100));
    checkpoint.in_flight = Some(InFlightSubmission {
        header: (&setup.source.header_at(101)).into(),
        sequence: 0,
        payload_hash: Bytes32::zeroed(),
        tx_hashes: vec![Bytes32::new([3; 32])],
        fee: 100,
    });
    setup.store.clone().save(&checkpoint).unwrap();
    setup.target.update_data(|data| {
        data.sequences.insert("relayer.test".to_string(), 2);
    });
    let mut task = setup.task(config()).await;

    task.prepare().await.unwrap();

    assert_eq!(setup.store.get().unwrap().in_flight, None);
    assert_eq!(task.relayed(), 100.into());
    relay_up_to(&mut task, 101).await;
    assert_eq!(setup.target.broadcasts()[0].sequence, 2);
}
