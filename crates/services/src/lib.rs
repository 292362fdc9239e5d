//! Start/stop lifecycle shared by every long running task of the relayer.
//!
//! A [`RunnableService`] is turned into its [`RunnableTask`] once the
//! [`ServiceRunner`] is started. The task's `run` is then called in a loop
//! until it asks to stop or the runner is stopped. Tasks observe stop
//! requests through the [`StateWatcher`] they are handed.

#![deny(clippy::arithmetic_side_effects)]
#![deny(clippy::cast_possible_truncation)]

mod service;
mod state;

pub use service::{
    RunnableService,
    RunnableTask,
    ServiceRunner,
    Shared,
    TaskNextAction,
};
pub use state::{
    State,
    StateWatcher,
};
