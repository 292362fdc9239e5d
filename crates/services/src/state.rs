//! Lifecycle states and the watcher tasks use to observe them

use core::ops::{
    Deref,
    DerefMut,
};
use std::sync::Arc;
use tokio::sync::watch;

/// State of a [`ServiceRunner`](crate::ServiceRunner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// Created, `start` was not called yet.
    NotStarted,
    /// `start` was called, the task is being built.
    Starting,
    /// The task is running.
    Started,
    /// `stop` was called, the task is finishing its current iteration.
    Stopping,
    /// The task finished.
    Stopped,
    /// The task finished because of an error or a panic.
    StoppedWithError(String),
}

impl State {
    pub fn not_started(&self) -> bool {
        self == &State::NotStarted
    }

    pub fn starting(&self) -> bool {
        self == &State::Starting
    }

    pub fn started(&self) -> bool {
        self == &State::Started
    }

    pub fn stopping(&self) -> bool {
        self == &State::Stopping
    }

    pub fn stopped(&self) -> bool {
        matches!(self, State::Stopped | State::StoppedWithError(_))
    }
}

/// Read side of the service state, handed to the task.
#[derive(Clone)]
pub struct StateWatcher {
    receiver: watch::Receiver<State>,
    // Keeps standalone watchers from observing a closed channel.
    _sender: Option<Arc<watch::Sender<State>>>,
}

impl StateWatcher {
    /// A watcher that stays in `Started` forever. Used to drive a task by
    /// hand in tests.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn started() -> Self {
        Self::standalone(State::Started)
    }

    /// A watcher that stays in `Starting` forever.
    #[cfg(any(test, feature = "test-helpers"))]
    pub fn starting() -> Self {
        Self::standalone(State::Starting)
    }

    #[cfg(any(test, feature = "test-helpers"))]
    fn standalone(state: State) -> Self {
        let (sender, receiver) = watch::channel(state);
        Self {
            receiver,
            _sender: Some(Arc::new(sender)),
        }
    }

    /// Resolves once the service leaves the `Starting`/`Started` states and
    /// returns the new state. Errors if the runner is gone.
    pub async fn while_started(&mut self) -> anyhow::Result<State> {
        loop {
            let state = self.receiver.borrow_and_update().clone();
            if !state.started() && !state.starting() {
                return Ok(state)
            }
            self.receiver.changed().await?;
        }
    }
}

impl From<watch::Receiver<State>> for StateWatcher {
    fn from(receiver: watch::Receiver<State>) -> Self {
        Self {
            receiver,
            _sender: None,
        }
    }
}

impl Deref for StateWatcher {
    type Target = watch::Receiver<State>;

    fn deref(&self) -> &Self::Target {
        &self.receiver
    }
}

impl DerefMut for StateWatcher {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.receiver
    }
}
