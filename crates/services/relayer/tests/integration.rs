#![cfg(feature = "test-helpers")]

use lightbridge_client::RpcError;
use lightbridge_relayer::{
    Config,
    RelayState,
    new_service_test,
    ports::CheckpointStore,
    storage::{
        FileCheckpointStore,
        InMemoryCheckpointStore,
    },
    test_helpers::{
        FakeSigner,
        FakeSourceChain,
        FakeTargetChain,
    },
};
use lightbridge_types::EpochId;
use std::time::Duration;

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

fn chains(tip: u64, epoch_length: u64) -> (FakeSourceChain, FakeTargetChain) {
    let source = FakeSourceChain::new(100..=tip, epoch_length);
    let target = FakeTargetChain::new(&source.header_at(100));
    (source, target)
}

#[tokio::test(start_paused = true)]
async fn relays_new_headers_in_order() {
    let (source, target) = chains(105, 100);
    let store = InMemoryCheckpointStore::default();
    let relayer = new_service_test(
        source.clone(),
        target.clone(),
        FakeSigner::default(),
        store.clone(),
        None,
        config(),
    );
    relayer.start_and_await().await.unwrap();

    relayer.shared.await_ready().await.unwrap();
    relayer.shared.await_relayed(105.into()).await.unwrap();

    assert_eq!(target.relayed(), vec![101, 102, 103, 104, 105]);
    let sequences: Vec<_> = target
        .broadcasts()
        .into_iter()
        .map(|broadcast| broadcast.sequence)
        .collect();
    assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
    let checkpoint = store.get().unwrap();
    assert_eq!(checkpoint.last_relayed_hash, source.header_at(105).hash);
    assert_eq!(checkpoint.last_submission_sequence, Some(4));

    // New headers are picked up by the next poll.
    source.extend_to(107);
    relayer.shared.await_relayed(107.into()).await.unwrap();
    assert_eq!(target.relayed(), vec![101, 102, 103, 104, 105, 106, 107]);

    relayer.stop_and_await().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn starts_from_the_light_client_head() {
    let source = FakeSourceChain::new(100..=105, 100);
    // Another relayer brought the light client to 103 already.
    let target = FakeTargetChain::new(&source.header_at(103));
    let relayer = new_service_test(
        source,
        target.clone(),
        FakeSigner::default(),
        InMemoryCheckpointStore::default(),
        None,
        config(),
    );
    relayer.start_and_await().await.unwrap();

    relayer.shared.await_relayed(105.into()).await.unwrap();

    assert_eq!(target.relayed(), vec![104, 105]);
    relayer.stop_and_await().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn retries_with_a_higher_fee_after_an_insufficient_fee() {
    let (source, target) = chains(101, 100);
    target.update_data(|data| data.min_fee = 110);
    let store = InMemoryCheckpointStore::default();
    let relayer = new_service_test(
        source,
        target.clone(),
        FakeSigner::default(),
        store.clone(),
        None,
        config(),
    );
    relayer.start_and_await().await.unwrap();

    relayer.shared.await_state(RelayState::ErrorBackoff).await.unwrap();
    assert_eq!(relayer.shared.relayed_height(), Some(100.into()));
    assert_eq!(relayer.shared.status().consecutive_failures, 1);

    relayer.shared.await_relayed(101.into()).await.unwrap();
    let broadcasts = target.broadcasts();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0].fee, 110);
    assert_eq!(broadcasts[0].sequence, 0);
    assert_eq!(store.get().unwrap().last_submission_sequence, Some(0));

    relayer.stop_and_await().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn recovers_from_source_failures() {
    let (source, target) = chains(103, 100);
    source.fail_next(RpcError::RateLimited);
    source.fail_next(RpcError::RateLimited);
    let relayer = new_service_test(
        source,
        target.clone(),
        FakeSigner::default(),
        InMemoryCheckpointStore::default(),
        None,
        config(),
    );
    relayer.start_and_await().await.unwrap();

    relayer.shared.await_relayed(103.into()).await.unwrap();

    assert_eq!(target.relayed(), vec![101, 102, 103]);
    assert_eq!(relayer.shared.status().consecutive_failures, 0);
    relayer.stop_and_await().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn follows_a_reorganization_of_the_source() {
    let (source, target) = chains(110, 100);
    let store = InMemoryCheckpointStore::default();
    let relayer = new_service_test(
        source.clone(),
        target.clone(),
        FakeSigner::default(),
        store.clone(),
        None,
        config(),
    );
    relayer.start_and_await().await.unwrap();
    relayer.shared.await_relayed(110.into()).await.unwrap();

    source.reorg(106, 1);
    source.extend_to(112);

    relayer.shared.await_relayed(112.into()).await.unwrap();
    assert_eq!(store.get().unwrap().last_relayed_hash, source.header_at(112).hash);
    assert_eq!(
        target.relayed(),
        vec![
            101, 102, 103, 104, 105, 106, 107, 108, 109, 110, 106, 107, 108, 109, 110,
            111, 112
        ]
    );

    relayer.stop_and_await().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn halts_on_a_reorganization_deeper_than_the_history() {
    let (source, target) = chains(110, 100);
    let config = Config {
        max_reorg_depth: 3,
        ..config()
    };
    let relayer = new_service_test(
        source.clone(),
        target.clone(),
        FakeSigner::default(),
        InMemoryCheckpointStore::default(),
        None,
        config,
    );
    relayer.start_and_await().await.unwrap();
    relayer.shared.await_relayed(110.into()).await.unwrap();

    source.reorg(105, 1);
    source.extend_to(111);

    relayer.shared.await_state(RelayState::Halted).await.unwrap();
    assert_eq!(relayer.shared.relayed_height(), Some(110.into()));
    relayer.await_stop().await.unwrap();
    assert_eq!(target.broadcasts().len(), 10);
}

#[tokio::test(start_paused = true)]
async fn attaches_validator_sets_at_epoch_boundaries() {
    let (source, target) = chains(111, 5);
    let relayer = new_service_test(
        source,
        target.clone(),
        FakeSigner::default(),
        InMemoryCheckpointStore::default(),
        None,
        config(),
    );
    relayer.start_and_await().await.unwrap();

    relayer.shared.await_relayed(111.into()).await.unwrap();

    let epochs: Vec<_> = target
        .payloads()
        .into_iter()
        .filter_map(|payload| {
            payload
                .validator_set
                .map(|set| (*payload.header.height, set.epoch))
        })
        .collect();
    assert_eq!(epochs, vec![(105, EpochId::new(21)), (110, EpochId::new(22))]);
    relayer.stop_and_await().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn restart_settles_the_submission_in_flight_without_rebroadcasting() {
    let (source, target) = chains(103, 100);
    target.update_data(|data| data.hold = true);
    let store = InMemoryCheckpointStore::default();
    let relayer = new_service_test(
        source.clone(),
        target.clone(),
        FakeSigner::default(),
        store.clone(),
        None,
        config(),
    );
    relayer.start_and_await().await.unwrap();
    relayer.shared.await_state(RelayState::Confirming).await.unwrap();
    relayer.stop_and_await().await.unwrap();

    let in_flight = store.get().unwrap().in_flight.unwrap();
    assert_eq!(*in_flight.height(), 101);
    // Included while the relayer was down.
    target.update_data(|data| data.hold = false);
    target.include_pending();

    let restarted = new_service_test(
        source,
        target.clone(),
        FakeSigner::default(),
        store.clone(),
        None,
        config(),
    );
    restarted.start_and_await().await.unwrap();
    restarted.shared.await_relayed(103.into()).await.unwrap();

    let heights: Vec<_> = target
        .broadcasts()
        .into_iter()
        .map(|broadcast| *broadcast.height)
        .collect();
    assert_eq!(heights, vec![101, 102, 103]);
    assert_eq!(target.relayed(), vec![101, 102, 103]);
    restarted.stop_and_await().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn resumes_from_the_checkpoint_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let (source, target) = chains(103, 100);
    let relayer = new_service_test(
        source.clone(),
        target.clone(),
        FakeSigner::default(),
        FileCheckpointStore::new(dir.path(), &config.direction),
        None,
        config.clone(),
    );
    relayer.start_and_await().await.unwrap();
    relayer.shared.await_relayed(103.into()).await.unwrap();
    relayer.stop_and_await().await.unwrap();

    let stored = FileCheckpointStore::new(dir.path(), &config.direction)
        .load()
        .unwrap()
        .unwrap();
    assert_eq!(*stored.last_relayed_height, 103);

    source.extend_to(105);
    let restarted = new_service_test(
        source,
        target.clone(),
        FakeSigner::default(),
        FileCheckpointStore::new(dir.path(), &config.direction),
        None,
        config,
    );
    restarted.start_and_await().await.unwrap();
    restarted.shared.await_relayed(105.into()).await.unwrap();

    assert_eq!(target.relayed(), vec![101, 102, 103, 104, 105]);
    restarted.stop_and_await().await.unwrap();
}
