use lightbridge_types::Bytes32;
use sha2::{
    Digest,
    Sha256,
};

/// SHA-256 of an encoded payload. Used to identify a submission independently
/// of the transaction that carries it.
pub fn payload_hash(bytes: &[u8]) -> Bytes32 {
    let digest: [u8; 32] = Sha256::digest(bytes).into();
    Bytes32::new(digest)
}
