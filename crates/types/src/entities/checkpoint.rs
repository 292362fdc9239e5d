//! Durable relay progress

use crate::{
    BlockHeight,
    Bytes32,
    EpochId,
    blockchain::header::BlockHeader,
};
use core::fmt;

/// Name of a relay direction, for example `source-to-target`.
///
/// Each direction keeps its own checkpoint, keyed by this name.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelayDirection(String);

impl RelayDirection {
    /// Creates a new direction name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RelayDirection {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for RelayDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A source-chain header that reached the light client.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelayedHeader {
    /// Height of the header.
    pub height: BlockHeight,
    /// Hash of the header.
    pub hash: Bytes32,
    /// Epoch of the header.
    pub epoch: EpochId,
}

impl From<&BlockHeader> for RelayedHeader {
    fn from(header: &BlockHeader) -> Self {
        Self {
            height: header.height,
            hash: header.hash,
            epoch: header.epoch,
        }
    }
}

/// A submission whose sequence number was journaled before the broadcast.
///
/// After a restart the relayer reconciles it against the target chain
/// before allocating any new sequence number.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InFlightSubmission {
    /// The header being relayed.
    pub header: RelayedHeader,
    /// Sequence number the submission consumes.
    pub sequence: u64,
    /// Hash of the encoded relay payload.
    pub payload_hash: Bytes32,
    /// Hashes of every transaction broadcast for the submission so far.
    pub tx_hashes: Vec<Bytes32>,
    /// Fee offered by the latest transaction in `tx_hashes`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub fee: u128,
}

impl InFlightSubmission {
    /// Height being relayed.
    pub fn height(&self) -> BlockHeight {
        self.header.height
    }
}

/// Persistent progress of one relay direction.
///
/// `last_relayed_height` only moves forward through [`RelayCheckpoint::advance`].
/// The only way back is [`RelayCheckpoint::roll_back_to`], used after a
/// source-chain reorganization was detected.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayCheckpoint {
    /// Height of the last header the light client accepted.
    pub last_relayed_height: BlockHeight,
    /// Hash of the last header the light client accepted.
    pub last_relayed_hash: Bytes32,
    /// Epoch of the last header the light client accepted.
    pub last_relayed_epoch: EpochId,
    /// Sequence number consumed by the last confirmed submission.
    pub last_submission_sequence: Option<u64>,
    /// Most recent relayed headers, oldest first. The last entry always
    /// matches the `last_relayed_*` fields.
    pub recent: Vec<RelayedHeader>,
    /// Submission journaled but not yet known to be terminal.
    pub in_flight: Option<InFlightSubmission>,
}

impl RelayCheckpoint {
    /// A checkpoint positioned at `header`, which the light client is
    /// assumed to already know.
    pub fn starting_at(header: &BlockHeader) -> Self {
        let relayed = RelayedHeader::from(header);
        Self {
            last_relayed_height: relayed.height,
            last_relayed_hash: relayed.hash,
            last_relayed_epoch: relayed.epoch,
            last_submission_sequence: None,
            recent: vec![relayed],
            in_flight: None,
        }
    }

    /// The last relayed header.
    pub fn last_relayed(&self) -> RelayedHeader {
        RelayedHeader {
            height: self.last_relayed_height,
            hash: self.last_relayed_hash,
            epoch: self.last_relayed_epoch,
        }
    }

    /// Records `header` as relayed, keeping at most `history` entries in
    /// [`RelayCheckpoint::recent`] and clearing the in-flight slot.
    ///
    /// Returns `false` and leaves the checkpoint untouched if `header` is not
    /// above the last relayed height.
    pub fn advance(
        &mut self,
        header: RelayedHeader,
        sequence: Option<u64>,
        history: usize,
    ) -> bool {
        if header.height <= self.last_relayed_height {
            return false
        }
        self.last_relayed_height = header.height;
        self.last_relayed_hash = header.hash;
        self.last_relayed_epoch = header.epoch;
        if sequence.is_some() {
            self.last_submission_sequence = sequence;
        }
        self.recent.push(header);
        let history = history.max(1);
        if self.recent.len() > history {
            let excess = self.recent.len().saturating_sub(history);
            self.recent.drain(..excess);
        }
        self.in_flight = None;
        true
    }

    /// Rolls the checkpoint back to the entry of [`RelayCheckpoint::recent`]
    /// at `index`, discarding every later entry.
    ///
    /// Returns the header the checkpoint now points at, or `None` if the
    /// index is out of range.
    pub fn roll_back_to(&mut self, index: usize) -> Option<RelayedHeader> {
        let header = *self.recent.get(index)?;
        self.recent.truncate(index.saturating_add(1));
        self.last_relayed_height = header.height;
        self.last_relayed_hash = header.hash;
        self.last_relayed_epoch = header.epoch;
        self.in_flight = None;
        Some(header)
    }
}
