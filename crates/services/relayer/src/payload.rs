use borsh::{
    BorshDeserialize,
    BorshSerialize,
};
use lightbridge_types::{
    blockchain::{
        header::BlockHeader,
        validators::ValidatorSet,
    },
    entities::Proof,
};

/// What a single relay transaction carries to the light client.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RelayPayload {
    /// The relayed header.
    pub header: BlockHeader,
    /// The validator set of the header's epoch, attached when the epoch
    /// differs from the one of the previously relayed header.
    pub validator_set: Option<ValidatorSet>,
    /// Proof of the header, when a proof builder is configured.
    pub proof: Option<Proof>,
}
