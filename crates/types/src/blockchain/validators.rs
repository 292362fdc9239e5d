//! Validator sets

use super::primitives::EpochId;

/// A single member of a validator set.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Validator {
    /// Public key of the validator.
    #[cfg_attr(feature = "serde", serde(with = "hex::serde"))]
    pub public_key: Vec<u8>,
    /// Voting stake of the validator.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_helpers::u128_string"))]
    pub voting_stake: u128,
}

/// The validators of one epoch, in the order the source chain reports them.
///
/// The order is significant: the light client verifies signatures against
/// the set exactly as encoded, so it must never be sorted or deduplicated.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatorSet {
    /// Epoch the set is active in.
    pub epoch: EpochId,
    /// Members of the set.
    pub validators: Vec<Validator>,
}

impl ValidatorSet {
    /// Sum of the voting stake of all members, saturating at `u128::MAX`.
    pub fn total_stake(&self) -> u128 {
        self.validators
            .iter()
            .fold(0u128, |acc, v| acc.saturating_add(v.voting_stake))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Returns `true` if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_stake_saturates() {
        let set = ValidatorSet {
            epoch: EpochId::new(1),
            validators: vec![
                Validator {
                    public_key: vec![1],
                    voting_stake: u128::MAX,
                },
                Validator {
                    public_key: vec![2],
                    voting_stake: 5,
                },
            ],
        };
        assert_eq!(set.total_stake(), u128::MAX);
    }
}
