//! This module drives the relay of source-chain headers to the light client
//! on the target chain.

use crate::{
    Config,
    RelayError,
    RelayPayload,
    ports::{
        CheckpointStore,
        ProofBuilder,
        SourceChain,
        TargetChain,
        TransactionSigner,
    },
    submission::{
        Reconciliation,
        SubmissionError,
        SubmissionJournal,
        SubmissionManager,
        SubmissionRequest,
    },
};
use async_trait::async_trait;
use core::{
    future::Future,
    time::Duration,
};
use anyhow::Context;
use lightbridge_client::{
    BackoffMaker,
    RobustClient,
};
use lightbridge_services::{
    RunnableService,
    RunnableTask,
    ServiceRunner,
    StateWatcher,
    TaskNextAction,
};
use lightbridge_types::{
    BlockHeight,
    blockchain::header::BlockHeader,
    entities::{
        InFlightSubmission,
        RelayCheckpoint,
        RelayedHeader,
    },
};
use std::sync::Arc;
use tokio::{
    sync::watch,
    time::Sleep,
};
use tower::retry::backoff::{
    Backoff as _,
    ExponentialBackoff,
};

use self::run::{
    CycleOutcome,
    RelayOutcome,
    RelayerData,
};

mod run;
mod state;

#[cfg(test)]
mod test;

/// What the relay engine is doing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Waiting for the source chain to produce new headers.
    #[default]
    Idle,
    /// Reading the source chain.
    Fetching,
    /// Building the payload of a header.
    Encoding,
    /// Signing and broadcasting a payload.
    Submitting,
    /// Waiting for the broadcast payload to be included.
    Confirming,
    /// Persisting the progress.
    Checkpointing,
    /// Waiting after a failed cycle.
    ErrorBackoff,
    /// Stopped on an error that retrying cannot fix.
    Halted,
}

/// Everything other components can observe about a relay direction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayStatus {
    /// What the engine is doing.
    pub state: RelayState,
    /// The engine looked at the source chain at least once.
    pub ready: bool,
    /// The persisted progress, `None` until loaded.
    pub checkpoint: Option<RelayCheckpoint>,
    /// Failed cycles since the last successful one.
    pub consecutive_failures: u32,
}

type Status = watch::Receiver<RelayStatus>;
type NotifyStatus = watch::Sender<RelayStatus>;

/// The alias of the runnable relayer service over JSON-RPC chains.
pub type Service<G, C> = CustomizableService<RobustClient, RobustClient, G, C>;
type CustomizableService<S, T, G, C> = ServiceRunner<NotInitializedTask<S, T, G, C>>;

/// The shared state of the relayer task.
#[derive(Clone)]
pub struct SharedState {
    status: Status,
}

/// Not initialized version of the [`Task`].
pub struct NotInitializedTask<S, T, G, C> {
    status: NotifyStatus,
    source: S,
    submission: SubmissionManager<T, G>,
    proof_builder: Option<Arc<dyn ProofBuilder>>,
    store: C,
    config: Config,
}

/// The relay task of one direction.
pub struct Task<S, T, G, C> {
    /// Publishes the status of the relayer.
    status: NotifyStatus,
    /// The chain headers are read from.
    source: S,
    /// Submits payloads to the chain of the light client.
    submission: SubmissionManager<T, G>,
    /// Builds the proof attached to each header, if configured.
    proof_builder: Option<Arc<dyn ProofBuilder>>,
    /// Durable home of the checkpoint.
    store: C,
    /// The checkpoint, loaded by the first cycle.
    checkpoint: Option<RelayCheckpoint>,
    /// Configuration settings.
    config: Config,
    /// The watcher used to track the state of the service. Every wait of the
    /// task is raced against it.
    shutdown: StateWatcher,
    /// Failed cycles since the last successful one.
    consecutive_failures: u32,
    /// Starts the delays after failed cycles.
    error_backoff: BackoffMaker,
    /// Delays of the current run of failed cycles.
    backoff: Option<ExponentialBackoff>,
}

impl<S, T, G, C> NotInitializedTask<S, T, G, C>
where
    S: SourceChain,
    T: TargetChain,
    G: TransactionSigner,
    C: CheckpointStore,
{
    /// Create a new relayer task.
    fn new(
        source: S,
        target: T,
        signer: G,
        store: C,
        proof_builder: Option<Arc<dyn ProofBuilder>>,
        config: Config,
    ) -> Self {
        let submission = SubmissionManager::new(target, signer, (&config).into());
        let (status, _) = watch::channel(RelayStatus::default());

        Self {
            status,
            source,
            submission,
            proof_builder,
            store,
            config,
        }
    }
}

/// Resolves `future` unless the service is asked to stop first.
async fn until_stopped<F, R, E>(shutdown: &StateWatcher, future: F) -> Result<R, RelayError>
where
    F: Future<Output = Result<R, E>>,
    E: Into<RelayError>,
{
    let mut shutdown = shutdown.clone();
    tokio::select! {
        biased;
        _ = shutdown.while_started() => Err(RelayError::Stopped),
        result = future => result.map_err(Into::into),
    }
}

/// Journals submissions into the `in_flight` slot of the checkpoint.
struct CheckpointJournal<'a, C> {
    store: &'a mut C,
    checkpoint: &'a mut RelayCheckpoint,
    status: &'a NotifyStatus,
}

impl<C> SubmissionJournal for CheckpointJournal<'_, C>
where
    C: CheckpointStore,
{
    fn record(&mut self, submission: &InFlightSubmission) -> anyhow::Result<()> {
        self.checkpoint.in_flight = Some(submission.clone());
        self.store.save(self.checkpoint)?;
        Ok(())
    }

    fn broadcasted(&mut self, _: &InFlightSubmission) {
        set_state(self.status, RelayState::Confirming);
    }
}

fn set_state(status: &NotifyStatus, state: RelayState) {
    status.send_if_modified(|status| {
        if status.state != state {
            status.state = state;
            true
        } else {
            false
        }
    });
}

impl<S, T, G, C> Task<S, T, G, C>
where
    S: SourceChain,
    T: TargetChain,
    G: TransactionSigner,
    C: CheckpointStore,
{
    fn checkpoint(&self) -> Result<RelayCheckpoint, RelayError> {
        self.checkpoint
            .clone()
            .ok_or_else(|| RelayError::Storage("the checkpoint is not loaded".to_string()))
    }

    /// Persists `checkpoint` and publishes it.
    fn commit(&mut self, checkpoint: RelayCheckpoint) -> Result<(), RelayError> {
        self.store.save(&checkpoint)?;
        self.publish(checkpoint);
        Ok(())
    }

    fn publish(&mut self, checkpoint: RelayCheckpoint) {
        self.status.send_modify(|status| {
            status.checkpoint = Some(checkpoint.clone());
        });
        self.checkpoint = Some(checkpoint);
    }

    /// Sleeps for `duration`. Returns `false` if the service was stopped
    /// meanwhile.
    async fn sleep(&self, duration: Duration) -> bool {
        self.wait(tokio::time::sleep(duration)).await
    }

    async fn wait(&self, sleep: Sleep) -> bool {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            biased;
            _ = shutdown.while_started() => false,
            _ = sleep => true,
        }
    }

    async fn load_or_bootstrap(&mut self) -> Result<RelayCheckpoint, RelayError> {
        if let Some(checkpoint) = self.store.load()? {
            tracing::info!(
                direction = %self.config.direction,
                height = %checkpoint.last_relayed_height,
                "Resuming from the checkpoint"
            );
            return Ok(checkpoint)
        }

        // The light client may already be ahead of the configured height.
        let head =
            until_stopped(&self.shutdown, self.submission.target().light_client_head())
                .await?;
        let start = match head {
            Some(head) if head > self.config.start_height => head,
            _ => self.config.start_height,
        };
        let header = until_stopped(&self.shutdown, self.source.header(start)).await?;
        let known = until_stopped(
            &self.shutdown,
            self.submission.target().is_known_header(&header.hash),
        )
        .await?;
        if !known {
            return Err(RelayError::UnknownStartHeader {
                height: header.height,
                hash: header.hash,
            })
        }

        let checkpoint = RelayCheckpoint::starting_at(&header);
        self.store.save(&checkpoint)?;
        tracing::info!(
            direction = %self.config.direction,
            height = %header.height,
            hash = %header.hash,
            light_client_head = ?head,
            "Initialized the checkpoint"
        );
        Ok(checkpoint)
    }

    /// Settles the submission that was in flight when the relayer stopped.
    async fn reconcile(
        &mut self,
        mut checkpoint: RelayCheckpoint,
    ) -> Result<RelayCheckpoint, RelayError> {
        let Some(in_flight) = checkpoint.in_flight.clone() else {
            return Ok(checkpoint)
        };

        let reconciliation =
            until_stopped(&self.shutdown, self.submission.reconcile(&in_flight)).await?;
        let extends = Some(in_flight.height()) == checkpoint.last_relayed_height.succ();

        match reconciliation {
            Reconciliation::Confirmed(receipt) if receipt.is_success() && extends => {
                checkpoint.advance(
                    in_flight.header,
                    Some(in_flight.sequence),
                    self.config.history_len(),
                );
                tracing::info!(
                    height = %in_flight.height(),
                    tx_hash = %receipt.tx_hash,
                    "The submission in flight before the restart is confirmed"
                );
            }
            // Still pending, the next submission of its height resumes it.
            Reconciliation::Reusable => {
                tracing::info!(
                    height = %in_flight.height(),
                    sequence = in_flight.sequence,
                    "The submission in flight before the restart is still pending"
                );
            }
            reconciliation => {
                checkpoint.in_flight = None;
                tracing::info!(
                    height = %in_flight.height(),
                    sequence = in_flight.sequence,
                    "Reconciled the submission in flight before the restart: {reconciliation:?}"
                );
            }
        }
        self.store.save(&checkpoint)?;
        Ok(checkpoint)
    }

    async fn is_canonical(&self, header: &RelayedHeader) -> Result<bool, RelayError> {
        let canonical = until_stopped(&self.shutdown, self.source.header(header.height)).await?;
        Ok(canonical.hash == header.hash)
    }

    /// Rolls the checkpoint back to the newest relayed header that is still
    /// canonical. `tip` is the header that does not extend the checkpoint.
    async fn roll_back(&mut self, tip: &BlockHeader) -> Result<RelayOutcome, RelayError> {
        let mut checkpoint = self.checkpoint()?;
        tracing::warn!(
            height = %tip.height,
            "Reorganization detected: the header does not extend the last relayed header"
        );

        let recent = checkpoint.recent.clone();
        let window_start = recent.len().saturating_sub(self.config.history_len());
        let window = &recent[window_start..];
        let (Some(oldest), Some(newest)) = (window.first(), window.last()) else {
            return Err(RelayError::CheckpointCorrupted(
                "the checkpoint has no relayed headers".to_string(),
            ))
        };

        if !self.is_canonical(oldest).await? {
            return Err(RelayError::ReorgDepthExceeded {
                oldest_known: oldest.height,
                max_reorg_depth: self.config.max_reorg_depth,
            })
        }
        if self.is_canonical(newest).await? {
            return Err(RelayError::InconsistentSource(format!(
                "header {} does not extend the canonical header {}",
                tip.height, newest.height
            )))
        }

        // `window[low]` is canonical and `window[high]` is not.
        let mut low = 0usize;
        let mut high = window.len().saturating_sub(1);
        while high.saturating_sub(low) > 1 {
            let middle = low.saturating_add(high.saturating_sub(low) / 2);
            if self.is_canonical(&window[middle]).await? {
                low = middle;
            } else {
                high = middle;
            }
        }

        let fork_point = checkpoint
            .roll_back_to(window_start.saturating_add(low))
            .ok_or_else(|| {
                RelayError::CheckpointCorrupted("fork point outside the history".to_string())
            })?;
        self.set_state(RelayState::Checkpointing);
        self.commit(checkpoint)?;
        tracing::warn!(
            height = %fork_point.height,
            hash = %fork_point.hash,
            "Rolled the checkpoint back to the fork point"
        );
        Ok(RelayOutcome::RolledBack)
    }
}

impl<S, T, G, C> RelayerData for Task<S, T, G, C>
where
    S: SourceChain,
    T: TargetChain,
    G: TransactionSigner,
    C: CheckpointStore,
{
    async fn prepare(&mut self) -> Result<(), RelayError> {
        if self.checkpoint.is_some() {
            return Ok(())
        }
        let checkpoint = self.load_or_bootstrap().await?;
        let checkpoint = self.reconcile(checkpoint).await?;
        self.publish(checkpoint);
        Ok(())
    }

    async fn relay(&mut self, height: BlockHeight) -> Result<RelayOutcome, RelayError> {
        let mut checkpoint = self.checkpoint()?;
        let last = checkpoint.last_relayed();
        if Some(height) != last.height.succ() {
            return Err(RelayError::InconsistentSource(format!(
                "asked to relay {height} while the checkpoint is at {}",
                last.height
            )))
        }

        self.set_state(RelayState::Fetching);
        let header = until_stopped(&self.shutdown, self.source.header(height)).await?;
        if header.prev_hash != last.hash {
            return self.roll_back(&header).await
        }

        let relayed = RelayedHeader::from(&header);
        let resuming = checkpoint
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.header == relayed);
        if !resuming
            && until_stopped(
                &self.shutdown,
                self.submission.target().is_known_header(&header.hash),
            )
            .await?
        {
            self.set_state(RelayState::Checkpointing);
            checkpoint.advance(relayed, None, self.config.history_len());
            self.commit(checkpoint)?;
            tracing::info!(
                direction = %self.config.direction,
                height = %height,
                "The light client already knows the header"
            );
            return Ok(RelayOutcome::AlreadyKnown)
        }

        self.set_state(RelayState::Encoding);
        let validator_set = if header.epoch != last.epoch {
            let set =
                until_stopped(&self.shutdown, self.source.validator_set(header.epoch))
                    .await?;
            if set.epoch != header.epoch {
                return Err(RelayError::InconsistentSource(format!(
                    "asked for the validator set of epoch {}, got epoch {}",
                    header.epoch, set.epoch
                )))
            }
            tracing::info!(
                epoch = %header.epoch,
                validators = set.len(),
                "Attaching the validator set of the new epoch"
            );
            Some(set)
        } else {
            None
        };
        let proof = match &self.proof_builder {
            Some(builder) => {
                Some(until_stopped(&self.shutdown, builder.build_proof(height)).await?)
            }
            None => None,
        };
        let payload = RelayPayload {
            header,
            validator_set,
            proof,
        };
        let request = SubmissionRequest::new(relayed, lightbridge_codec::encode(&payload)?);

        self.set_state(RelayState::Submitting);
        let mut journal = CheckpointJournal {
            store: &mut self.store,
            checkpoint: &mut checkpoint,
            status: &self.status,
        };
        let result = until_stopped(
            &self.shutdown,
            self.submission.submit(request, &mut journal),
        )
        .await;

        match result {
            Ok(receipt) => {
                self.set_state(RelayState::Checkpointing);
                checkpoint.advance(
                    relayed,
                    Some(receipt.sequence),
                    self.config.history_len(),
                );
                self.commit(checkpoint)?;
                tracing::info!(
                    direction = %self.config.direction,
                    height = %height,
                    tx_hash = %receipt.tx_hash,
                    sequence = receipt.sequence,
                    fee = receipt.fee,
                    "Relayed the header"
                );
                Ok(RelayOutcome::Relayed)
            }
            Err(RelayError::Submission(SubmissionError::Rejected { reason, .. }))
                if self.config.skip_on_rejection =>
            {
                tracing::warn!(
                    direction = %self.config.direction,
                    height = %height,
                    "The light client rejected the header, skipping it: {reason}"
                );
                self.set_state(RelayState::Checkpointing);
                checkpoint.advance(relayed, None, self.config.history_len());
                self.commit(checkpoint)?;
                Ok(RelayOutcome::Skipped)
            }
            Err(err) => {
                self.publish(checkpoint);
                Err(err)
            }
        }
    }

    fn set_state(&self, state: RelayState) {
        set_state(&self.status, state);
    }

    fn mark_ready(&self) {
        self.status.send_if_modified(|status| {
            let changed = !status.ready;
            status.ready = true;
            changed
        });
    }

    fn max_heights_per_cycle(&self) -> u64 {
        self.config.max_heights_per_cycle
    }
}

#[async_trait]
impl<S, T, G, C> state::SourceRemote for Task<S, T, G, C>
where
    S: SourceChain,
    T: TargetChain,
    G: TransactionSigner,
    C: CheckpointStore,
{
    async fn latest(&self) -> Result<BlockHeight, RelayError> {
        until_stopped(&self.shutdown, self.source.latest_height()).await
    }
}

impl<S, T, G, C> state::RelayLocal for Task<S, T, G, C> {
    fn relayed(&self) -> BlockHeight {
        self.checkpoint
            .as_ref()
            .map(|checkpoint| checkpoint.last_relayed_height)
            .unwrap_or(self.config.start_height)
    }
}

#[async_trait]
impl<S, T, G, C> RunnableService for NotInitializedTask<S, T, G, C>
where
    S: SourceChain + 'static,
    T: TargetChain + 'static,
    G: TransactionSigner + 'static,
    C: CheckpointStore + 'static,
{
    const NAME: &'static str = "Relayer";

    type SharedData = SharedState;
    type Task = Task<S, T, G, C>;
    type TaskParams = ();

    fn shared_data(&self) -> Self::SharedData {
        let status = self.status.subscribe();

        SharedState { status }
    }

    async fn into_task(
        self,
        watcher: &StateWatcher,
        _: Self::TaskParams,
    ) -> anyhow::Result<Self::Task> {
        let shutdown = watcher.clone();
        let NotInitializedTask {
            status,
            source,
            submission,
            proof_builder,
            store,
            config,
        } = self;
        let error_backoff = config
            .error_backoff
            .maker()
            .context("Invalid error backoff of the relayer")?;
        let task = Task {
            status,
            source,
            submission,
            proof_builder,
            store,
            checkpoint: None,
            config,
            shutdown,
            consecutive_failures: 0,
            error_backoff,
            backoff: None,
        };

        Ok(task)
    }
}

impl<S, T, G, C> RunnableTask for Task<S, T, G, C>
where
    S: SourceChain + 'static,
    T: TargetChain + 'static,
    G: TransactionSigner + 'static,
    C: CheckpointStore + 'static,
{
    async fn run(&mut self, _: &mut StateWatcher) -> TaskNextAction {
        let result = run::run(self).await;

        match result {
            Ok(outcome) => {
                self.backoff = None;
                if self.consecutive_failures > 0 {
                    self.consecutive_failures = 0;
                    self.status
                        .send_modify(|status| status.consecutive_failures = 0);
                }
                if outcome == CycleOutcome::CaughtUp
                    && !self.sleep(self.config.polling_interval).await
                {
                    return TaskNextAction::Stop
                }
                TaskNextAction::Continue
            }
            Err(RelayError::Stopped) => TaskNextAction::Stop,
            Err(err) if err.is_fatal() => {
                tracing::error!(
                    direction = %self.config.direction,
                    "Halting the relayer: {err}"
                );
                self.set_state(RelayState::Halted);
                TaskNextAction::Stop
            }
            Err(err) => {
                let delay = self
                    .backoff
                    .get_or_insert_with(|| self.error_backoff.start())
                    .next_backoff();
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                let failures = self.consecutive_failures;
                self.status.send_modify(|status| {
                    status.state = RelayState::ErrorBackoff;
                    status.consecutive_failures = failures;
                });
                let retry_in = delay
                    .deadline()
                    .saturating_duration_since(tokio::time::Instant::now());
                tracing::warn!(
                    direction = %self.config.direction,
                    failures,
                    ?retry_in,
                    "Relay cycle failed, backing off: {err}"
                );
                if !self.wait(delay).await {
                    return TaskNextAction::Stop
                }
                TaskNextAction::Continue
            }
        }
    }

    async fn shutdown(self) -> anyhow::Result<()> {
        // Progress is saved by every step, there is nothing left to flush.
        Ok(())
    }
}

impl SharedState {
    /// Wait for the relayer to look at the source chain for the first time.
    pub async fn await_ready(&self) -> anyhow::Result<()> {
        self.await_status(|status| status.ready).await
    }

    /// Wait until at least the given height is relayed.
    pub async fn await_relayed(&self, height: BlockHeight) -> anyhow::Result<()> {
        self.await_status(|status| {
            status
                .checkpoint
                .as_ref()
                .is_some_and(|checkpoint| checkpoint.last_relayed_height >= height)
        })
        .await
    }

    /// Wait until the relayer enters `state`.
    pub async fn await_state(&self, state: RelayState) -> anyhow::Result<()> {
        self.await_status(|status| status.state == state).await
    }

    async fn await_status<F>(&self, mut condition: F) -> anyhow::Result<()>
    where
        F: FnMut(&RelayStatus) -> bool,
    {
        let mut rx = self.status.clone();
        loop {
            if condition(&rx.borrow_and_update()) {
                break;
            }

            rx.changed().await?;
        }

        Ok(())
    }

    /// The last relayed height, `None` until the checkpoint is loaded.
    pub fn relayed_height(&self) -> Option<BlockHeight> {
        self.status
            .borrow()
            .checkpoint
            .as_ref()
            .map(|checkpoint| checkpoint.last_relayed_height)
    }

    /// The persisted progress, `None` until loaded.
    pub fn checkpoint(&self) -> Option<RelayCheckpoint> {
        self.status.borrow().checkpoint.clone()
    }

    /// What the relayer is doing.
    pub fn state(&self) -> RelayState {
        self.status.borrow().state
    }

    /// The whole status.
    pub fn status(&self) -> RelayStatus {
        self.status.borrow().clone()
    }
}

/// Creates an instance of runnable relayer service.
pub fn new_service<G, C>(
    config: Config,
    signer: G,
    store: C,
    proof_builder: Option<Arc<dyn ProofBuilder>>,
) -> anyhow::Result<Service<G, C>>
where
    G: TransactionSigner + 'static,
    C: CheckpointStore + 'static,
{
    if !config.signer_account_id.is_empty() && config.signer_account_id != signer.identity()
    {
        anyhow::bail!(
            "The relayer of `{}` is configured for the account `{}` but the key belongs to `{}`",
            config.direction,
            config.signer_account_id,
            signer.identity()
        );
    }
    let source = RobustClient::new(config.source.clone())?;
    let target = RobustClient::new(config.target.clone())?;
    Ok(new_service_internal(
        source,
        target,
        signer,
        store,
        proof_builder,
        config,
    ))
}

#[cfg(any(test, feature = "test-helpers"))]
/// Start a test relayer.
pub fn new_service_test<S, T, G, C>(
    source: S,
    target: T,
    signer: G,
    store: C,
    proof_builder: Option<Arc<dyn ProofBuilder>>,
    config: Config,
) -> CustomizableService<S, T, G, C>
where
    S: SourceChain + 'static,
    T: TargetChain + 'static,
    G: TransactionSigner + 'static,
    C: CheckpointStore + 'static,
{
    new_service_internal(source, target, signer, store, proof_builder, config)
}

fn new_service_internal<S, T, G, C>(
    source: S,
    target: T,
    signer: G,
    store: C,
    proof_builder: Option<Arc<dyn ProofBuilder>>,
    config: Config,
) -> CustomizableService<S, T, G, C>
where
    S: SourceChain + 'static,
    T: TargetChain + 'static,
    G: TransactionSigner + 'static,
    C: CheckpointStore + 'static,
{
    let task = NotInitializedTask::new(source, target, signer, store, proof_builder, config);

    CustomizableService::new(task)
}
