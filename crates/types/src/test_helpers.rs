//! Builders for test data

#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::cast_possible_truncation)]

use crate::{
    BlockHeight,
    Bytes32,
    EpochId,
    blockchain::{
        header::BlockHeader,
        validators::{
            Validator,
            ValidatorSet,
        },
    },
};

/// Deterministic hash of a header at `height` on the fork named by `salt`.
pub fn header_hash(height: u64, salt: u8) -> Bytes32 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&height.to_le_bytes());
    bytes[8] = salt;
    bytes[31] = 0xbb;
    Bytes32::new(bytes)
}

/// A chain of linked headers covering `heights`, where every epoch spans
/// `epoch_length` heights and `salt` distinguishes competing forks.
///
/// The first header links to the hash `header_hash(start - 1, salt)`.
pub fn header_chain(
    heights: core::ops::RangeInclusive<u64>,
    epoch_length: u64,
    salt: u8,
) -> Vec<BlockHeader> {
    heights
        .map(|height| header(height, epoch_length, salt))
        .collect()
}

/// A single header, linked to `header_hash(height - 1, salt)`.
pub fn header(height: u64, epoch_length: u64, salt: u8) -> BlockHeader {
    BlockHeader {
        height: BlockHeight::new(height),
        hash: header_hash(height, salt),
        prev_hash: header_hash(height.saturating_sub(1), salt),
        timestamp: 1_600_000_000 + height,
        epoch: epoch_of(height, epoch_length),
        producer: vec![salt, height as u8],
        signatures: vec![vec![0x51; 4], vec![height as u8; 4]],
    }
}

/// The epoch `height` falls in.
pub fn epoch_of(height: u64, epoch_length: u64) -> EpochId {
    EpochId::new(height / epoch_length.max(1))
}

/// A validator set for `epoch` with `size` members.
pub fn validator_set(epoch: EpochId, size: u8) -> ValidatorSet {
    ValidatorSet {
        epoch,
        validators: (0..size)
            .map(|i| Validator {
                public_key: vec![i; 32],
                voting_stake: u128::from(i) * 1_000 + u128::from(*epoch),
            })
            .collect(),
    }
}
