//! Bookkeeping of submitted transactions

use crate::{
    BlockHeight,
    Bytes32,
};

/// Lifecycle of a single broadcast.
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubmissionStatus {
    /// Broadcast, waiting for a receipt.
    Pending,
    /// Included and executed successfully.
    Confirmed,
    /// Rejected, reverted or timed out.
    Failed,
    /// Replaced by a broadcast with the same sequence and a higher fee.
    Superseded,
}

/// A broadcast made by the submission manager. Records are transient and
/// live only for the duration of one submission.
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionRecord {
    /// Sequence number the transaction consumes.
    pub sequence: u64,
    /// Hash of the relay payload carried by the transaction.
    pub payload_hash: Bytes32,
    /// Hash of the broadcast transaction.
    pub tx_hash: Bytes32,
    /// Fee offered.
    pub fee: u128,
    /// Current status.
    pub status: SubmissionStatus,
    /// How many broadcasts preceded this one for the same payload.
    pub retry_count: u32,
}

/// Result of executing a transaction on the target chain.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "status", rename_all = "snake_case"))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// The transaction executed successfully.
    Success,
    /// The transaction was included but reverted.
    Reverted {
        /// Reason reported by the chain.
        reason: String,
    },
}

/// Receipt reported by the target chain for an included transaction.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionReceipt {
    /// Hash of the transaction.
    pub tx_hash: Bytes32,
    /// Target-chain height the transaction was included at.
    pub block_height: u64,
    /// Execution outcome.
    pub outcome: TransactionOutcome,
}

impl TransactionReceipt {
    /// Returns `true` if the transaction executed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TransactionOutcome::Success)
    }
}

/// Proof that a relay submission was confirmed on the target chain.
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshSerialize, borsh::BorshDeserialize)
)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    /// Hash of the confirmed transaction.
    pub tx_hash: Bytes32,
    /// Target-chain height the transaction was included at.
    pub block_height: u64,
    /// Sequence number the transaction consumed.
    pub sequence: u64,
    /// Fee offered by the confirmed transaction.
    pub fee: u128,
    /// Source-chain height that was relayed.
    pub relayed_height: BlockHeight,
}
