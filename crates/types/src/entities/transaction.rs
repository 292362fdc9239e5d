//! Target-chain transactions produced by the relayer

use crate::Bytes32;

/// A transaction before it is signed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedTransaction {
    /// Account that signs and pays for the transaction.
    pub signer: String,
    /// Sequence number (nonce) of the signer the transaction consumes.
    pub sequence: u64,
    /// Fee offered for the transaction.
    pub fee: u128,
    /// Encoded relay payload.
    pub payload: Vec<u8>,
}

/// A signed transaction ready to broadcast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Hash the target chain will index the transaction under.
    pub hash: Bytes32,
    /// Raw bytes to broadcast.
    pub raw: Vec<u8>,
}
