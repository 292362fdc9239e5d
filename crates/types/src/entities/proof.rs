//! Opaque proofs attached to relayed headers

use crate::BlockHeight;

/// What a [`Proof`] attests to.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
#[cfg_attr(feature = "borsh", borsh(use_discriminant = true))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProofKind {
    /// Proof of a block header.
    Header = 0,
    /// Proof of a validator-set transition.
    ValidatorSet = 1,
    /// Proof of inclusion of some item in a block.
    Inclusion = 2,
}

impl ProofKind {
    /// The tag of the kind on the wire.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ProofKind {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::Header),
            1 => Ok(Self::ValidatorSet),
            2 => Ok(Self::Inclusion),
            other => Err(other),
        }
    }
}

/// A proof produced by a proof builder. The payload is never interpreted
/// by the relayer.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof {
    /// What the proof attests to.
    pub kind: ProofKind,
    /// Height of the block the proof is about.
    pub subject_height: BlockHeight,
    /// The proof bytes.
    #[cfg_attr(feature = "serde", serde(with = "hex::serde"))]
    pub payload: Vec<u8>,
}
