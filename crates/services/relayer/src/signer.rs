//! Ed25519 transaction signing

use crate::ports::TransactionSigner;
use anyhow::Context;
use borsh::BorshSerialize;
use ed25519_dalek::{
    Signer,
    SigningKey,
};
use lightbridge_types::entities::{
    SignedTransaction,
    UnsignedTransaction,
};
use std::path::Path;

/// The signed part of a transaction.
#[derive(BorshSerialize)]
struct TransactionBody {
    signer: String,
    public_key: [u8; 32],
    sequence: u64,
    fee: u128,
    payload: Vec<u8>,
}

/// Signs with an ed25519 key.
///
/// The raw transaction is the encoded body followed by the 64 byte signature
/// of it. The transaction hash is the SHA-256 of the body.
pub struct Ed25519Signer {
    account_id: String,
    key: SigningKey,
}

impl Ed25519Signer {
    /// A signer for `account_id` holding `key`.
    pub fn new(account_id: impl Into<String>, key: SigningKey) -> Self {
        Self {
            account_id: account_id.into(),
            key,
        }
    }

    /// Reads the 32 byte secret key from hex, with or without `0x`.
    pub fn from_secret_hex(
        account_id: impl Into<String>,
        secret: &str,
    ) -> anyhow::Result<Self> {
        let secret = secret.trim();
        let bytes = hex::decode(secret.strip_prefix("0x").unwrap_or(secret))
            .context("The secret key is not hex")?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            anyhow::anyhow!("The secret key has {} bytes instead of 32", bytes.len())
        })?;
        Ok(Self::new(account_id, SigningKey::from_bytes(&bytes)))
    }

    /// Reads the hex secret key from a file.
    pub fn from_file(
        account_id: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let secret = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read the key file {}", path.display()))?;
        Self::from_secret_hex(account_id, &secret)
    }

    /// The public key, hex encoded.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().to_bytes())
    }
}

impl TransactionSigner for Ed25519Signer {
    fn identity(&self) -> &str {
        &self.account_id
    }

    fn sign(&self, tx: &UnsignedTransaction) -> anyhow::Result<SignedTransaction> {
        if tx.signer != self.account_id {
            anyhow::bail!(
                "Asked to sign for `{}` with the key of `{}`",
                tx.signer,
                self.account_id
            );
        }
        let body = TransactionBody {
            signer: tx.signer.clone(),
            public_key: self.key.verifying_key().to_bytes(),
            sequence: tx.sequence,
            fee: tx.fee,
            payload: tx.payload.clone(),
        };
        let mut raw = lightbridge_codec::encode(&body)?;
        let hash = lightbridge_codec::payload_hash(&raw);
        let signature = self.key.sign(&raw);
        raw.extend_from_slice(&signature.to_bytes());
        Ok(SignedTransaction { hash, raw })
    }
}
