use crate::{
    ports::{
        ProofUnavailable,
        StorageError,
    },
    submission::SubmissionError,
};
use lightbridge_client::RpcError;
use lightbridge_codec::CodecError;
use lightbridge_types::{
    BlockHeight,
    Bytes32,
};

/// Why a relay cycle failed.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The source chain replaced more relayed headers than the relayer keeps.
    #[error(
        "source chain reorganized below height {oldest_known}, deeper than the \
         maximum of {max_reorg_depth} heights"
    )]
    ReorgDepthExceeded {
        /// Oldest height still in the checkpoint history.
        oldest_known: BlockHeight,
        /// The configured maximum depth.
        max_reorg_depth: u64,
    },
    /// The stored checkpoint cannot be decoded.
    #[error("checkpoint is corrupted: {0}")]
    CheckpointCorrupted(String),
    /// The source chain answered with data that contradicts itself.
    #[error("inconsistent source chain: {0}")]
    InconsistentSource(String),
    /// The light client does not know the header the relay would start from.
    #[error("the light client does not know header {hash} at height {height}")]
    UnknownStartHeader {
        /// Height of the header.
        height: BlockHeight,
        /// Hash of the header on the source chain.
        hash: Bytes32,
    },
    /// The payload of a header has no encoding.
    #[error("payload cannot be encoded: {0}")]
    Codec(#[from] CodecError),
    /// A chain could not be queried.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// The submission of a payload failed.
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    /// The proof of a header is not available yet.
    #[error(transparent)]
    Proof(#[from] ProofUnavailable),
    /// The checkpoint could not be saved or loaded.
    #[error("checkpoint storage failed: {0}")]
    Storage(String),
    /// The service is stopping.
    #[error("the relayer got a stop signal")]
    Stopped,
}

impl RelayError {
    /// Returns `true` if retrying cannot fix the failure and the relayer
    /// must halt.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ReorgDepthExceeded { .. }
                | Self::CheckpointCorrupted(_)
                | Self::Codec(_)
        )
    }
}

impl From<StorageError> for RelayError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Corrupted(reason) => Self::CheckpointCorrupted(reason),
            StorageError::Io(reason) => Self::Storage(reason),
        }
    }
}
