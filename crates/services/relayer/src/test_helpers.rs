#![allow(clippy::arithmetic_side_effects)]
#![allow(missing_docs)]

//! In-memory chains for tests of the relayer.

use crate::{
    RelayPayload,
    ports::{
        BroadcastError,
        SourceChain,
        TargetChain,
        TransactionSigner,
    },
};
use async_trait::async_trait;
use borsh::{
    BorshDeserialize,
    BorshSerialize,
};
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
        SignedTransaction,
        TransactionOutcome,
        TransactionReceipt,
        UnsignedTransaction,
    },
    test_helpers::{
        header,
        header_chain,
        validator_set,
    },
};
use parking_lot::Mutex;
use std::{
    collections::{
        BTreeMap,
        HashMap,
        HashSet,
        VecDeque,
    },
    ops::RangeInclusive,
    sync::Arc,
};

/// Validators per epoch of [`FakeSourceChain`].
pub const VALIDATORS_PER_EPOCH: u8 = 4;

#[derive(Debug, Default)]
pub struct SourceData {
    pub headers: BTreeMap<u64, BlockHeader>,
    pub epoch_length: u64,
    /// Salt of the fork new headers are built on.
    pub salt: u8,
    /// Errors returned by the next calls, one per call.
    pub failures: VecDeque<RpcError>,
    pub header_requests: Vec<u64>,
    pub validator_set_requests: Vec<EpochId>,
}

/// A source chain whose headers are [`header_chain`] forks.
#[derive(Clone, Debug, Default)]
pub struct FakeSourceChain {
    data: Arc<Mutex<SourceData>>,
}

impl FakeSourceChain {
    pub fn new(heights: RangeInclusive<u64>, epoch_length: u64) -> Self {
        let headers = header_chain(heights, epoch_length, 0)
            .into_iter()
            .map(|header| (*header.height, header))
            .collect();
        Self {
            data: Arc::new(Mutex::new(SourceData {
                headers,
                epoch_length,
                ..Default::default()
            })),
        }
    }

    pub fn update_data<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut SourceData) -> R,
    {
        f(&mut self.data.lock())
    }

    pub fn header_at(&self, height: u64) -> BlockHeader {
        self.data.lock().headers[&height].clone()
    }

    pub fn tip(&self) -> u64 {
        self.data.lock().headers.keys().last().copied().unwrap_or_default()
    }

    /// Appends headers on the current fork up to `height`.
    pub fn extend_to(&self, height: u64) {
        let mut data = self.data.lock();
        let tip = data.headers.keys().last().copied().unwrap_or_default();
        for next in tip + 1..=height {
            let prev_hash = data.headers[&(next - 1)].hash;
            let mut header = header(next, data.epoch_length, data.salt);
            header.prev_hash = prev_hash;
            data.headers.insert(next, header);
        }
    }

    /// Replaces every header from `from` up to the tip with a fork named by
    /// `salt`.
    pub fn reorg(&self, from: u64, salt: u8) {
        let tip = self.tip();
        {
            let mut data = self.data.lock();
            data.salt = salt;
            data.headers.retain(|height, _| *height < from);
        }
        self.extend_to(tip);
    }

    pub fn fail_next(&self, err: RpcError) {
        self.data.lock().failures.push_back(err);
    }

    pub fn header_requests(&self) -> Vec<u64> {
        self.data.lock().header_requests.clone()
    }

    fn failure(&self) -> Result<(), RpcError> {
        match self.data.lock().failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SourceChain for FakeSourceChain {
    async fn latest_height(&self) -> Result<BlockHeight, RpcError> {
        self.failure()?;
        Ok(self.tip().into())
    }

    async fn header(&self, height: BlockHeight) -> Result<BlockHeader, RpcError> {
        self.failure()?;
        let mut data = self.data.lock();
        data.header_requests.push(*height);
        data.headers
            .get(&height)
            .cloned()
            .ok_or_else(|| RpcError::InvalidRequest(format!("unknown height {height}")))
    }

    async fn validator_set(&self, epoch: EpochId) -> Result<ValidatorSet, RpcError> {
        self.failure()?;
        self.data.lock().validator_set_requests.push(epoch);
        Ok(validator_set(epoch, VALIDATORS_PER_EPOCH))
    }
}

/// The transaction body produced by [`FakeSigner`].
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FakeTransaction {
    pub signer: String,
    pub sequence: u64,
    pub fee: u128,
    pub payload: Vec<u8>,
}

impl From<&UnsignedTransaction> for FakeTransaction {
    fn from(tx: &UnsignedTransaction) -> Self {
        Self {
            signer: tx.signer.clone(),
            sequence: tx.sequence,
            fee: tx.fee,
            payload: tx.payload.clone(),
        }
    }
}

/// Signs by encoding the transaction.
#[derive(Clone, Debug)]
pub struct FakeSigner {
    identity: String,
}

impl FakeSigner {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
        }
    }
}

impl Default for FakeSigner {
    fn default() -> Self {
        Self::new("relayer.test")
    }
}

impl TransactionSigner for FakeSigner {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn sign(&self, tx: &UnsignedTransaction) -> anyhow::Result<SignedTransaction> {
        let raw = lightbridge_codec::encode(&FakeTransaction::from(tx))?;
        Ok(SignedTransaction {
            hash: lightbridge_codec::payload_hash(&raw),
            raw,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Broadcast {
    pub tx_hash: Bytes32,
    pub sequence: u64,
    pub fee: u128,
    pub height: BlockHeight,
}

#[derive(Debug, Default)]
pub struct TargetData {
    /// Next sequence per identity.
    pub sequences: HashMap<String, u64>,
    pub estimated_fee: u128,
    pub min_fee: u128,
    /// Hashes of the headers the light client accepted.
    pub known_headers: HashSet<Bytes32>,
    /// Heights accepted by the light client, in order.
    pub relayed: Vec<BlockHeight>,
    /// Payloads of included transactions, in order.
    pub payloads: Vec<RelayPayload>,
    pub receipts: HashMap<Bytes32, TransactionReceipt>,
    /// Broadcast but not included transactions.
    pub pending: Vec<(Bytes32, FakeTransaction)>,
    /// Keep broadcasts pending until [`FakeTargetChain::include_pending`].
    pub hold: bool,
    /// Rejection reasons of the next broadcasts, one per broadcast.
    pub rejections: VecDeque<String>,
    pub broadcasts: Vec<Broadcast>,
    /// Errors returned by the next receipt lookups, one per lookup.
    pub receipt_failures: VecDeque<RpcError>,
    /// Height of the last header the light client accepted.
    pub head: Option<BlockHeight>,
    pub block_height: u64,
}

/// A target chain hosting a light client that accepts a header when it
/// extends an accepted one.
#[derive(Clone, Debug, Default)]
pub struct FakeTargetChain {
    data: Arc<Mutex<TargetData>>,
}

impl FakeTargetChain {
    /// A light client initialized with `trusted`.
    pub fn new(trusted: &BlockHeader) -> Self {
        let target = Self::default();
        target.update_data(|data| {
            data.known_headers.insert(trusted.hash);
            data.head = Some(trusted.height);
            data.estimated_fee = 100;
            data.min_fee = 100;
        });
        target
    }

    pub fn update_data<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut TargetData) -> R,
    {
        f(&mut self.data.lock())
    }

    pub fn relayed(&self) -> Vec<u64> {
        self.data.lock().relayed.iter().map(|height| **height).collect()
    }

    pub fn broadcasts(&self) -> Vec<Broadcast> {
        self.data.lock().broadcasts.clone()
    }

    pub fn payloads(&self) -> Vec<RelayPayload> {
        self.data.lock().payloads.clone()
    }

    /// Includes every pending transaction.
    pub fn include_pending(&self) {
        let mut data = self.data.lock();
        let pending = core::mem::take(&mut data.pending);
        for (tx_hash, tx) in pending {
            include(&mut data, tx_hash, tx);
        }
    }
}

fn include(data: &mut TargetData, tx_hash: Bytes32, tx: FakeTransaction) {
    data.block_height += 1;
    data.sequences.insert(tx.signer.clone(), tx.sequence + 1);

    let outcome = match lightbridge_codec::decode::<RelayPayload>(&tx.payload) {
        Ok(payload) if data.known_headers.contains(&payload.header.prev_hash) => {
            data.known_headers.insert(payload.header.hash);
            data.head = Some(payload.header.height);
            data.relayed.push(payload.header.height);
            data.payloads.push(payload);
            TransactionOutcome::Success
        }
        Ok(_) => TransactionOutcome::Reverted {
            reason: "header does not extend a known header".to_string(),
        },
        Err(err) => TransactionOutcome::Reverted {
            reason: format!("malformed payload: {err}"),
        },
    };
    let receipt = TransactionReceipt {
        tx_hash,
        block_height: data.block_height,
        outcome,
    };
    data.receipts.insert(tx_hash, receipt);
}

#[async_trait]
impl TargetChain for FakeTargetChain {
    async fn sequence(&self, identity: &str) -> Result<u64, RpcError> {
        Ok(self
            .data
            .lock()
            .sequences
            .get(identity)
            .copied()
            .unwrap_or_default())
    }

    async fn estimate_fee(&self, _: u64) -> Result<u128, RpcError> {
        Ok(self.data.lock().estimated_fee)
    }

    async fn broadcast(&self, tx: &SignedTransaction) -> Result<Bytes32, BroadcastError> {
        let body: FakeTransaction = lightbridge_codec::decode(&tx.raw)
            .map_err(|err| BroadcastError::Rejected(format!("malformed: {err}")))?;
        let height = lightbridge_codec::decode::<RelayPayload>(&body.payload)
            .map(|payload| payload.header.height)
            .unwrap_or_default();

        let mut data = self.data.lock();
        if let Some(reason) = data.rejections.pop_front() {
            return Err(BroadcastError::Rejected(reason))
        }
        if data.pending.iter().any(|(pending, _)| pending == &tx.hash) {
            return Err(BroadcastError::SequenceConflict(
                "transaction already known".to_string(),
            ))
        }
        let expected = data.sequences.get(&body.signer).copied().unwrap_or_default();
        if body.sequence != expected {
            return Err(BroadcastError::SequenceConflict(format!(
                "invalid nonce: expected {expected}, got {}",
                body.sequence
            )))
        }
        if body.fee < data.min_fee {
            return Err(BroadcastError::Rejected(format!(
                "insufficient fee: {} < {}",
                body.fee, data.min_fee
            )))
        }

        data.broadcasts.push(Broadcast {
            tx_hash: tx.hash,
            sequence: body.sequence,
            fee: body.fee,
            height,
        });
        // A transaction with the same sequence replaces the pending one.
        data.pending
            .retain(|(_, pending)| pending.signer != body.signer || pending.sequence != body.sequence);
        if data.hold {
            data.pending.push((tx.hash, body));
        } else {
            include(&mut data, tx.hash, body);
        }
        Ok(tx.hash)
    }

    async fn receipt(
        &self,
        tx_hash: &Bytes32,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        let mut data = self.data.lock();
        if let Some(err) = data.receipt_failures.pop_front() {
            return Err(err)
        }
        Ok(data.receipts.get(tx_hash).cloned())
    }

    async fn light_client_head(&self) -> Result<Option<BlockHeight>, RpcError> {
        Ok(self.data.lock().head)
    }

    async fn is_known_header(&self, hash: &Bytes32) -> Result<bool, RpcError> {
        Ok(self.data.lock().known_headers.contains(hash))
    }
}

/// The encoded payload relaying `header` alone.
pub fn header_payload(header: &BlockHeader) -> Vec<u8> {
    lightbridge_codec::encode(&RelayPayload {
        header: header.clone(),
        validator_set: None,
        proof: None,
    })
    .expect("a header always has an encoding")
}
