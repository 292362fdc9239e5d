use crate::{
    State,
    StateWatcher,
};
use futures::FutureExt;
use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::Arc,
};
use tokio::sync::watch;
use tracing::Instrument;


/// Alias for `Arc<T>`
pub type Shared<T> = Arc<T>;

/// What the runner does after an iteration of [`RunnableTask::run`].
#[derive(Debug)]
pub enum TaskNextAction {
    /// Run the next iteration.
    Continue,
    /// Stop the task.
    Stop,
    /// Log the error and run the next iteration.
    ErrorContinue(anyhow::Error),
}

impl TaskNextAction {
    /// `Continue` on success, `ErrorContinue` on failure.
    pub fn always_continue<T, E: Into<anyhow::Error>>(result: Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::Continue,
            Err(err) => Self::ErrorContinue(err.into()),
        }
    }
}

/// A service that is not running yet.
#[async_trait::async_trait]
pub trait RunnableService: Send {
    /// Name used in logs.
    const NAME: &'static str;

    /// Handle other components use to observe the service.
    type SharedData: Clone + Send + Sync;

    /// The running form of the service.
    type Task: RunnableTask;

    /// Parameters passed when the task is created.
    type TaskParams: Send;

    /// The shared data, available before the service starts.
    fn shared_data(&self) -> Self::SharedData;

    /// Builds the task. Called once, when the runner is started.
    async fn into_task(
        self,
        state_watcher: &StateWatcher,
        params: Self::TaskParams,
    ) -> anyhow::Result<Self::Task>;
}

/// The running form of a service.
pub trait RunnableTask: Send {
    /// One iteration of the task. Long waits inside must race `watcher` so
    /// stop requests are observed promptly.
    fn run(
        &mut self,
        watcher: &mut StateWatcher,
    ) -> impl core::future::Future<Output = TaskNextAction> + Send;

    /// Releases the resources of the task after the last iteration.
    fn shutdown(self) -> impl core::future::Future<Output = anyhow::Result<()>> + Send;
}

/// Owns a service and drives it on its own tokio task.
pub struct ServiceRunner<S>
where
    S: RunnableService + 'static,
{
    /// The shared data of the service.
    pub shared: S::SharedData,
    state: Shared<watch::Sender<State>>,
}

impl<S> Clone for ServiceRunner<S>
where
    S: RunnableService + 'static,
{
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            state: self.state.clone(),
        }
    }
}

impl<S> ServiceRunner<S>
where
    S: RunnableService + 'static,
    S::TaskParams: Default,
{
    /// Spawns the service in the `NotStarted` state.
    pub fn new(service: S) -> Self {
        Self::new_with_params(service, S::TaskParams::default())
    }
}

impl<S> ServiceRunner<S>
where
    S: RunnableService + 'static,
{
    /// Spawns the service in the `NotStarted` state with task parameters.
    pub fn new_with_params(service: S, params: S::TaskParams) -> Self {
        let shared = service.shared_data();
        let (sender, _) = watch::channel(State::NotStarted);
        let state = Arc::new(sender);
        let span = tracing::info_span!("service", name = S::NAME);
        tokio::spawn(initialize_loop(service, params, state.clone()).instrument(span));
        Self { shared, state }
    }

    /// The current state.
    pub fn state(&self) -> State {
        self.state.borrow().clone()
    }

    /// A watcher of the state.
    pub fn state_watcher(&self) -> StateWatcher {
        self.state.subscribe().into()
    }

    /// Asks the service to start. Errors if it was already started.
    pub fn start(&self) -> anyhow::Result<()> {
        let started = self.state.send_if_modified(|state| {
            if state.not_started() {
                *state = State::Starting;
                true
            } else {
                false
            }
        });
        if started {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "The service `{}` already has been started.",
                S::NAME
            ))
        }
    }

    /// Starts the service and waits until it runs or stops.
    pub async fn start_and_await(&self) -> anyhow::Result<State> {
        let mut watcher = self.state_watcher();
        self.start()?;
        loop {
            let state = watcher.borrow_and_update().clone();
            if !state.starting() {
                return Ok(state)
            }
            watcher.changed().await?;
        }
    }

    /// Asks the service to stop. Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.not_started() || state.starting() || state.started() {
                *state = State::Stopping;
                true
            } else {
                false
            }
        })
    }

    /// Stops the service and waits until it stopped.
    pub async fn stop_and_await(&self) -> anyhow::Result<State> {
        self.stop();
        self.await_stop().await
    }

    /// Waits until the service stopped, either on request or by itself.
    pub async fn await_stop(&self) -> anyhow::Result<State> {
        let mut watcher = self.state_watcher();
        loop {
            let state = watcher.borrow_and_update().clone();
            if state.stopped() {
                return Ok(state)
            }
            watcher.changed().await?;
        }
    }
}

fn panic_to_string(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}

async fn initialize_loop<S>(
    service: S,
    params: S::TaskParams,
    sender: Shared<watch::Sender<State>>,
) where
    S: RunnableService + 'static,
{
    let mut watcher: StateWatcher = sender.subscribe().into();

    loop {
        let state = watcher.borrow_and_update().clone();
        if state.starting() {
            break
        }
        if !state.not_started() {
            sender.send_replace(State::Stopped);
            return
        }
        if watcher.changed().await.is_err() {
            return
        }
    }

    let task = match AssertUnwindSafe(service.into_task(&watcher, params))
        .catch_unwind()
        .await
    {
        Ok(Ok(task)) => task,
        Ok(Err(err)) => {
            tracing::error!("Failed to initialize the service: {err:?}");
            sender.send_replace(State::StoppedWithError(err.to_string()));
            return
        }
        Err(panic) => {
            let message = panic_to_string(panic);
            tracing::error!("The service panicked during initialization: {message}");
            sender.send_replace(State::StoppedWithError(message));
            return
        }
    };

    sender.send_if_modified(|state| {
        if state.starting() {
            *state = State::Started;
            true
        } else {
            false
        }
    });
    tracing::info!("The service is started");

    let stopped = run_loop(task, watcher).await;
    tracing::info!("The service is stopped: {stopped:?}");
    sender.send_replace(stopped);
}

async fn run_loop<T>(mut task: T, mut watcher: StateWatcher) -> State
where
    T: RunnableTask,
{
    loop {
        if !watcher.borrow_and_update().started() {
            break
        }

        let action = AssertUnwindSafe(task.run(&mut watcher))
            .catch_unwind()
            .await;

        match action {
            Ok(TaskNextAction::Continue) => {}
            Ok(TaskNextAction::Stop) => break,
            Ok(TaskNextAction::ErrorContinue(err)) => {
                tracing::error!("The iteration of the service failed: {err:?}");
            }
            Err(panic) => {
                let message = panic_to_string(panic);
                tracing::error!("The service panicked: {message}");
                return State::StoppedWithError(message)
            }
        }
    }

    match task.shutdown().await {
        Ok(()) => State::Stopped,
        Err(err) => {
            tracing::error!("Failed to shut down the service: {err:?}");
            State::StoppedWithError(err.to_string())
        }
    }
}
