//! Relay progress as seen at the start of a cycle

use crate::RelayError;
use async_trait::async_trait;
use core::ops::RangeInclusive;
use lightbridge_types::BlockHeight;

#[cfg(test)]
mod test;

/// The source chain as seen by the relayer.
#[async_trait]
pub trait SourceRemote {
    /// The latest height of the source chain.
    async fn latest(&self) -> Result<BlockHeight, RelayError>;
}

/// What the light client already has.
pub trait RelayLocal {
    /// The last height relayed to the light client.
    fn relayed(&self) -> BlockHeight;
}

/// Heights of the source chain and of the light client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceState {
    remote: BlockHeight,
    local: BlockHeight,
}

/// Heights that are on the source chain but not relayed yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayGap(RangeInclusive<u64>);

impl SourceState {
    /// The heights to relay, `None` when the light client is up to date.
    pub fn needs_to_relay(&self) -> Option<RelayGap> {
        let oldest = self.local.succ()?;
        (oldest <= self.remote).then(|| RelayGap::new(*oldest, *self.remote))
    }
}

impl RelayGap {
    /// The gap from `oldest` to `latest`, both included.
    pub fn new(oldest: u64, latest: u64) -> Self {
        Self(oldest..=latest)
    }

    /// The oldest height to relay.
    pub fn oldest(&self) -> u64 {
        *self.0.start()
    }

    /// The latest height to relay.
    pub fn latest(&self) -> u64 {
        *self.0.end()
    }

    /// The first `size` heights of the gap.
    pub fn page(&self, size: u64) -> Option<Self> {
        let last = self
            .oldest()
            .saturating_add(size.checked_sub(1)?)
            .min(self.latest());
        Some(Self::new(self.oldest(), last))
    }

    /// The heights of the gap, oldest first.
    pub fn heights(&self) -> impl Iterator<Item = BlockHeight> {
        self.0.clone().map(BlockHeight::new)
    }
}

impl From<RelayGap> for RangeInclusive<u64> {
    fn from(gap: RelayGap) -> Self {
        gap.0
    }
}

/// Builds the state of the source chain and the light client.
pub async fn build<T>(t: &T) -> Result<SourceState, RelayError>
where
    T: SourceRemote + RelayLocal + ?Sized + Sync,
{
    Ok(SourceState {
        remote: t.latest().await?,
        local: t.relayed(),
    })
}
