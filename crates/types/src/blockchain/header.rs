//! Source-chain block headers

use super::primitives::{
    BlockHeight,
    Bytes32,
    EpochId,
};

/// A block header observed on the source chain.
///
/// Headers are immutable once observed. Two headers are the same block
/// only when both the height and the hash agree, see [`BlockHeader::id`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockHeader {
    /// Height of the block.
    pub height: BlockHeight,
    /// Hash of the block.
    pub hash: Bytes32,
    /// Hash of the parent block.
    pub prev_hash: Bytes32,
    /// Unix timestamp of the block, in seconds.
    pub timestamp: u64,
    /// Validator-set epoch the block was produced in.
    pub epoch: EpochId,
    /// Identity of the block producer.
    #[cfg_attr(feature = "serde", serde(with = "hex::serde"))]
    pub producer: Vec<u8>,
    /// Signatures approving the block.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_helpers::hex_vec"))]
    pub signatures: Vec<Vec<u8>>,
}

impl BlockHeader {
    /// The identity of the block.
    pub fn id(&self) -> (BlockHeight, Bytes32) {
        (self.height, self.hash)
    }

    /// Returns `true` if `self` directly extends a block with the given hash.
    pub fn extends(&self, hash: &Bytes32) -> bool {
        &self.prev_hash == hash
    }
}
