//! Ports used by the relayer to access the outside world

use async_trait::async_trait;
use lightbridge_client::RpcError;
use lightbridge_types::{
    BlockHeight,
    Bytes32,
    EpochId,
    blockchain::{
        header::BlockHeader,
        validators::ValidatorSet,
    },
    entities::{
        Proof,
        RelayCheckpoint,
        SignedTransaction,
        TransactionReceipt,
        UnsignedTransaction,
    },
};

/// Read access to the chain headers are relayed from.
#[cfg_attr(any(test, feature = "test-helpers"), mockall::automock)]
#[async_trait]
pub trait SourceChain: Send + Sync {
    /// The latest height of the chain.
    async fn latest_height(&self) -> Result<BlockHeight, RpcError>;

    /// The canonical header at `height`.
    async fn header(&self, height: BlockHeight) -> Result<BlockHeader, RpcError>;

    /// The validator set active in `epoch`, in chain order.
    async fn validator_set(&self, epoch: EpochId) -> Result<ValidatorSet, RpcError>;
}

/// Why the target chain refused to accept a transaction into its pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastError {
    /// The sequence number was already used or is ahead of the account.
    #[error("sequence number conflict: {0}")]
    SequenceConflict(String),
    /// The transaction is invalid, for example because the fee is too low.
    #[error("transaction rejected: {0}")]
    Rejected(String),
    /// The chain could not be reached.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Write access to the chain hosting the light client.
#[cfg_attr(any(test, feature = "test-helpers"), mockall::automock)]
#[async_trait]
pub trait TargetChain: Send + Sync {
    /// The next sequence number `identity` may use.
    async fn sequence(&self, identity: &str) -> Result<u64, RpcError>;

    /// The fee the chain currently asks for a payload of `payload_len` bytes.
    async fn estimate_fee(&self, payload_len: u64) -> Result<u128, RpcError>;

    /// Hands a signed transaction to the chain and returns its hash.
    async fn broadcast(&self, tx: &SignedTransaction) -> Result<Bytes32, BroadcastError>;

    /// The receipt of an included transaction, `None` while not included.
    async fn receipt(
        &self,
        tx_hash: &Bytes32,
    ) -> Result<Option<TransactionReceipt>, RpcError>;

    /// Height of the newest header the light client accepted, `None` while
    /// it is not initialized.
    async fn light_client_head(&self) -> Result<Option<BlockHeight>, RpcError>;

    /// Whether the light client accepted the header with `hash`.
    async fn is_known_header(&self, hash: &Bytes32) -> Result<bool, RpcError>;
}

/// A proof of `height` cannot be built yet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("proof of height {height} is unavailable: {reason}")]
pub struct ProofUnavailable {
    /// Height the proof was requested for.
    pub height: BlockHeight,
    /// Why it is unavailable.
    pub reason: String,
}

/// Builds the proof attached to a relayed header.
#[cfg_attr(any(test, feature = "test-helpers"), mockall::automock)]
#[async_trait]
pub trait ProofBuilder: Send + Sync {
    /// Builds the proof of the header at `height`.
    async fn build_proof(&self, height: BlockHeight) -> Result<Proof, ProofUnavailable>;
}

/// Why the checkpoint could not be loaded or saved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The stored bytes are not a checkpoint. Never recovered automatically.
    #[error("stored checkpoint is corrupted: {0}")]
    Corrupted(String),
    /// The storage itself failed.
    #[error("checkpoint storage failed: {0}")]
    Io(String),
}

/// Durable home of the checkpoint of one relay direction.
#[cfg_attr(any(test, feature = "test-helpers"), mockall::automock)]
pub trait CheckpointStore: Send + Sync {
    /// The stored checkpoint, `None` before the first save.
    fn load(&self) -> Result<Option<RelayCheckpoint>, StorageError>;

    /// Replaces the stored checkpoint. When this returns the checkpoint
    /// survives a crash.
    fn save(&mut self, checkpoint: &RelayCheckpoint) -> Result<(), StorageError>;
}

/// Signs transactions for the relayer's account on the target chain.
#[cfg_attr(any(test, feature = "test-helpers"), mockall::automock)]
pub trait TransactionSigner: Send + Sync {
    /// Account the signer signs for.
    fn identity(&self) -> &str;

    /// Signs `tx`.
    fn sign(&self, tx: &UnsignedTransaction) -> anyhow::Result<SignedTransaction>;
}
