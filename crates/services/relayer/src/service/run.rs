//! # run
//! This module handles the logic of a single relay cycle.

use super::{
    RelayState,
    state,
    state::{
        RelayLocal,
        SourceRemote,
    },
};
use crate::RelayError;
use lightbridge_types::BlockHeight;


/// What became of a single height.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The light client accepted the header.
    Relayed,
    /// The light client rejected the header and the relayer moved past it.
    Skipped,
    /// The light client got the header from elsewhere.
    AlreadyKnown,
    /// The header revealed a reorganization and the checkpoint was rolled back.
    RolledBack,
}

/// What a cycle achieved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The light client is up to date with the source chain.
    CaughtUp,
    /// Some heights were processed, more may be waiting.
    Progressed,
}

pub trait RelayerData: SourceRemote + RelayLocal {
    /// Loads the checkpoint and settles what was in flight before a restart.
    /// Does nothing once the checkpoint is loaded.
    fn prepare(
        &mut self,
    ) -> impl core::future::Future<Output = Result<(), RelayError>> + Send;

    /// Relays the header right above the checkpoint, at `height`.
    fn relay(
        &mut self,
        height: BlockHeight,
    ) -> impl core::future::Future<Output = Result<RelayOutcome, RelayError>> + Send;

    /// Publishes the state of the engine.
    fn set_state(&self, state: RelayState);

    /// Marks the relayer as ready after its first look at the source chain.
    fn mark_ready(&self);

    /// Heights relayed per cycle.
    fn max_heights_per_cycle(&self) -> u64;
}

/// A single iteration of the relay loop.
pub async fn run<R>(relayer: &mut R) -> Result<CycleOutcome, RelayError>
where
    R: RelayerData + Sync,
{
    relayer.prepare().await?;

    relayer.set_state(RelayState::Fetching);
    let state = state::build(relayer).await?;
    relayer.mark_ready();

    let Some(gap) = state.needs_to_relay() else {
        relayer.set_state(RelayState::Idle);
        return Ok(CycleOutcome::CaughtUp)
    };

    let page = gap
        .page(relayer.max_heights_per_cycle().max(1))
        .unwrap_or(gap);
    for height in page.heights() {
        // Heights above a rollback are fetched again in the next cycle.
        if relayer.relay(height).await? == RelayOutcome::RolledBack {
            break
        }
    }

    relayer.set_state(RelayState::Idle);
    Ok(CycleOutcome::Progressed)
}
