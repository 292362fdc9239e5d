//! # Submission
//! Turns an encoded payload into a confirmed transaction on the target chain.
//!
//! All submissions of one signing identity go through one
//! [`SubmissionManager`]. It holds the sequence lock for the whole lifetime of
//! a submission, so sequence numbers are allocated and consumed strictly one
//! after the other.

use crate::{
    Config,
    ports::{
        BroadcastError,
        TargetChain,
        TransactionSigner,
    },
};
use core::time::Duration;
use lightbridge_client::RpcError;
use lightbridge_types::{
    BlockHeight,
    Bytes32,
    entities::{
        InFlightSubmission,
        Receipt,
        RelayedHeader,
        SubmissionRecord,
        SubmissionStatus,
        TransactionOutcome,
        TransactionReceipt,
        UnsignedTransaction,
    },
};
use parking_lot::Mutex;
use std::collections::HashSet;
use tokio::time::Instant;


/// How submissions are confirmed and repriced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionConfig {
    /// How long a broadcast may stay unconfirmed before it is repriced or
    /// given up.
    pub confirmation_timeout: Duration,
    /// Wait between two receipt polls.
    pub poll_interval: Duration,
    /// Rebroadcast unconfirmed transactions with a higher fee.
    pub replace_by_fee: bool,
    /// Fee increase of a replacement, in percent.
    pub fee_bump_percent: u32,
    /// Replacements per submission.
    pub max_fee_bumps: u32,
}

impl From<&Config> for SubmissionConfig {
    fn from(config: &Config) -> Self {
        Self {
            confirmation_timeout: config.confirmation_timeout,
            poll_interval: config.confirmation_poll_interval,
            replace_by_fee: config.replace_by_fee,
            fee_bump_percent: config.fee_bump_percent,
            max_fee_bumps: config.max_fee_bumps,
        }
    }
}

/// A payload to put on the target chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionRequest {
    /// The header the payload relays.
    pub header: RelayedHeader,
    /// The encoded payload.
    pub payload: Vec<u8>,
    /// Digest of `payload`.
    pub payload_hash: Bytes32,
}

impl SubmissionRequest {
    /// Creates a request, hashing the payload.
    pub fn new(header: RelayedHeader, payload: Vec<u8>) -> Self {
        let payload_hash = lightbridge_codec::payload_hash(&payload);
        Self {
            header,
            payload,
            payload_hash,
        }
    }
}

/// Why a payload did not make it onto the target chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    /// The same payload for the same height is being submitted already.
    #[error("payload {payload_hash} of height {height} is already in flight")]
    AlreadyInFlight {
        /// Height of the payload.
        height: BlockHeight,
        /// Digest of the payload.
        payload_hash: Bytes32,
    },
    /// No broadcast was confirmed in time.
    #[error("submission was not confirmed within {0:?}")]
    Timeout(Duration),
    /// The target chain refused the transaction or reverted it.
    #[error("submission rejected: {reason}")]
    Rejected {
        /// Reason given by the chain.
        reason: String,
        /// The rejection was caused by a fee below the chain's minimum.
        insufficient_fee: bool,
    },
    /// The target chain could not be reached.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// The transaction could not be signed.
    #[error("failed to sign the transaction: {0}")]
    Signer(String),
    /// The sequence number could not be journaled, so nothing was broadcast.
    #[error("failed to journal the submission: {0}")]
    Journal(String),
}

/// Durable record of a submission's sequence number and transaction hashes.
///
/// [`SubmissionJournal::record`] is called before every broadcast. When it
/// returns, a crash must not lose what it recorded.
pub trait SubmissionJournal: Send {
    /// Records `submission`.
    fn record(&mut self, submission: &InFlightSubmission) -> anyhow::Result<()>;

    /// Called once the last transaction of `submission` entered the pool of
    /// the target chain.
    fn broadcasted(&mut self, _submission: &InFlightSubmission) {}
}

impl<F> SubmissionJournal for F
where
    F: FnMut(&InFlightSubmission) -> anyhow::Result<()> + Send,
{
    fn record(&mut self, submission: &InFlightSubmission) -> anyhow::Result<()> {
        self(submission)
    }
}

/// What became of a submission interrupted by a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// One of its transactions is on chain.
    Confirmed(TransactionReceipt),
    /// The chain moved past its sequence without a known transaction of it
    /// succeeding. The height has to be submitted again.
    Released,
    /// The chain did not consume its sequence. The next submission reuses it.
    Reusable,
}

#[derive(Debug, Default)]
struct Sequencer {
    /// Sequence of the next submission, `None` when it must be read from chain.
    next: Option<u64>,
    /// Broadcast submission whose outcome is not known yet. It is settled
    /// before the next submission picks a sequence.
    unsettled: Option<InFlightSubmission>,
    /// Added to the estimated fee after insufficient fee rejections.
    fee_premium_percent: u32,
}

/// Submits payloads signed by one identity.
pub struct SubmissionManager<T, S> {
    target: T,
    signer: S,
    config: SubmissionConfig,
    sequencer: tokio::sync::Mutex<Sequencer>,
    in_flight: Mutex<HashSet<(BlockHeight, Bytes32)>>,
    records: Mutex<Vec<SubmissionRecord>>,
}

/// Keeps a `(height, payload_hash)` pair in flight until dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<(BlockHeight, Bytes32)>>,
    key: (BlockHeight, Bytes32),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

impl<T, S> SubmissionManager<T, S>
where
    T: TargetChain,
    S: TransactionSigner,
{
    /// Creates a manager. The first submission reads the sequence from chain.
    pub fn new(target: T, signer: S, config: SubmissionConfig) -> Self {
        Self {
            target,
            signer,
            config,
            sequencer: tokio::sync::Mutex::new(Sequencer::default()),
            in_flight: Mutex::new(HashSet::new()),
            records: Mutex::new(Vec::new()),
        }
    }

    /// The chain submissions go to.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Transactions broadcast by the last finished submission.
    pub fn last_records(&self) -> Vec<SubmissionRecord> {
        self.records.lock().clone()
    }

    /// The current fee premium, in percent of the estimated fee.
    pub async fn fee_premium_percent(&self) -> u32 {
        self.sequencer.lock().await.fee_premium_percent
    }

    /// Signs, broadcasts and confirms `request`.
    ///
    /// The sequence number and the hash of every signed transaction are handed
    /// to `journal` before the transaction is broadcast.
    pub async fn submit<J>(
        &self,
        request: SubmissionRequest,
        journal: &mut J,
    ) -> Result<Receipt, SubmissionError>
    where
        J: SubmissionJournal,
    {
        let _guard = self.enter(&request)?;
        let mut sequencer = self.sequencer.lock().await;

        let mut records = Vec::new();
        let result = self
            .submit_locked(&mut sequencer, &request, journal, &mut records)
            .await;

        match &result {
            Ok(_) => sequencer.fee_premium_percent = 0,
            Err(SubmissionError::Rejected {
                insufficient_fee: true,
                ..
            }) => {
                sequencer.fee_premium_percent = sequencer
                    .fee_premium_percent
                    .saturating_add(self.config.fee_bump_percent);
                tracing::info!(
                    premium = sequencer.fee_premium_percent,
                    "Raised the fee premium after an insufficient fee rejection"
                );
            }
            Err(_) => {}
        }
        *self.records.lock() = records;
        result
    }

    /// Settles a submission that was in flight when the relayer stopped and
    /// decides the sequence of the next submission.
    ///
    /// A [`Reconciliation::Reusable`] submission stays pending: the next
    /// submission first looks for its receipt again.
    pub async fn reconcile(
        &self,
        in_flight: &InFlightSubmission,
    ) -> Result<Reconciliation, SubmissionError> {
        let mut sequencer = self.sequencer.lock().await;
        let (reconciliation, next) = self.settle_sequence(in_flight).await?;
        sequencer.next = Some(next);
        sequencer.unsettled = match reconciliation {
            Reconciliation::Reusable => Some(in_flight.clone()),
            _ => None,
        };
        Ok(reconciliation)
    }

    /// Looks up what became of `in_flight` and returns the sequence the next
    /// transaction has to use.
    async fn settle_sequence(
        &self,
        in_flight: &InFlightSubmission,
    ) -> Result<(Reconciliation, u64), SubmissionError> {
        if let Some(receipt) = self.find_receipt(&in_flight.tx_hashes).await? {
            let next = in_flight.sequence.saturating_add(1);
            return Ok((Reconciliation::Confirmed(receipt), next))
        }

        let on_chain = self.target.sequence(self.signer.identity()).await?;
        if on_chain > in_flight.sequence {
            Ok((Reconciliation::Released, on_chain))
        } else {
            Ok((Reconciliation::Reusable, in_flight.sequence))
        }
    }

    fn enter(
        &self,
        request: &SubmissionRequest,
    ) -> Result<InFlightGuard<'_>, SubmissionError> {
        let key = (request.header.height, request.payload_hash);
        if !self.in_flight.lock().insert(key) {
            return Err(SubmissionError::AlreadyInFlight {
                height: key.0,
                payload_hash: key.1,
            })
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            key,
        })
    }

    async fn submit_locked<J>(
        &self,
        sequencer: &mut Sequencer,
        request: &SubmissionRequest,
        journal: &mut J,
        records: &mut Vec<SubmissionRecord>,
    ) -> Result<Receipt, SubmissionError>
    where
        J: SubmissionJournal,
    {
        let identity = self.signer.identity().to_string();
        let mut resumed = None;
        if let Some(previous) = sequencer.unsettled.take() {
            let (reconciliation, next) = match self.settle_sequence(&previous).await {
                Ok(settled) => settled,
                Err(err) => {
                    sequencer.unsettled = Some(previous);
                    return Err(err)
                }
            };
            sequencer.next = Some(next);
            let same_request = previous.header == request.header
                && previous.payload_hash == request.payload_hash;
            match reconciliation {
                Reconciliation::Confirmed(receipt) if same_request => {
                    records.extend(pending_records(&previous));
                    return self.settle(sequencer, request, records, receipt)
                }
                Reconciliation::Confirmed(receipt) => {
                    tracing::warn!(
                        height = %previous.height(),
                        tx_hash = %receipt.tx_hash,
                        "An unconfirmed submission of another header landed"
                    );
                }
                Reconciliation::Released => {}
                Reconciliation::Reusable => resumed = Some((previous, same_request)),
            }
        }

        // Until the outcome is known the sequence must be read from chain
        // again. This also covers a submission dropped midway.
        let mut sequence = match sequencer.next.take() {
            Some(sequence) => sequence,
            None => self.target.sequence(&identity).await?,
        };

        let payload_len = u64::try_from(request.payload.len()).unwrap_or(u64::MAX);
        let estimated = self.target.estimate_fee(payload_len).await?;
        let mut fee = with_premium(estimated, sequencer.fee_premium_percent);

        let mut in_flight = InFlightSubmission {
            header: request.header,
            sequence,
            payload_hash: request.payload_hash,
            tx_hashes: Vec::new(),
            fee,
        };
        match resumed {
            // Its transactions are still pending, keep watching them.
            Some((previous, true)) => {
                fee = fee.max(previous.fee);
                records.extend(pending_records(&previous));
                in_flight.tx_hashes = previous.tx_hashes;
                tracing::debug!(
                    height = %request.header.height,
                    sequence,
                    "Resuming the unconfirmed submission"
                );
            }
            // Another payload holds the sequence in the pool and has to be
            // outbid.
            Some((previous, false)) => {
                fee = fee.max(bumped(previous.fee, self.config.fee_bump_percent));
            }
            None => {}
        }
        let mut retries = u32::try_from(records.len()).unwrap_or(u32::MAX);
        let mut bumps: u32 = 0;
        let mut resynced = false;

        loop {
            let tx = UnsignedTransaction {
                signer: identity.clone(),
                sequence,
                fee,
                payload: request.payload.clone(),
            };
            let signed = self
                .signer
                .sign(&tx)
                .map_err(|err| SubmissionError::Signer(err.to_string()))?;

            // Signing a resumed transaction again yields the same hash.
            let fresh = in_flight.tx_hashes.last() != Some(&signed.hash);
            in_flight.sequence = sequence;
            in_flight.fee = fee;
            if fresh {
                in_flight.tx_hashes.push(signed.hash);
            }
            if let Err(err) = journal.record(&in_flight) {
                if fresh {
                    in_flight.tx_hashes.pop();
                }
                return Err(SubmissionError::Journal(err.to_string()))
            }
            if fresh {
                records.push(SubmissionRecord {
                    sequence,
                    payload_hash: request.payload_hash,
                    tx_hash: signed.hash,
                    fee,
                    status: SubmissionStatus::Pending,
                    retry_count: retries,
                });
                retries = retries.saturating_add(1);
            }

            tracing::debug!(
                height = %request.header.height,
                sequence,
                fee,
                tx_hash = %signed.hash,
                "Broadcasting the relay transaction"
            );
            match self.target.broadcast(&signed).await {
                Ok(_) => {}
                Err(BroadcastError::SequenceConflict(reason)) if is_already_known(&reason) => {
                    tracing::debug!(
                        tx_hash = %signed.hash,
                        "The transaction is already in the pool"
                    );
                }
                Err(BroadcastError::SequenceConflict(reason)) => {
                    set_status(records, &signed.hash, SubmissionStatus::Failed);
                    if fresh {
                        in_flight.tx_hashes.pop();
                    }
                    // A replaced transaction of this sequence may have landed.
                    if let Some(receipt) = self.find_receipt(&in_flight.tx_hashes).await?
                    {
                        return self.settle(sequencer, request, records, receipt)
                    }
                    if resynced {
                        return Err(SubmissionError::Rejected {
                            reason,
                            insufficient_fee: false,
                        })
                    }
                    resynced = true;
                    sequence = self.target.sequence(&identity).await?;
                    in_flight.tx_hashes.clear();
                    sequencer.unsettled = None;
                    tracing::warn!(
                        sequence,
                        "Sequence conflict ({reason}), retrying with the on-chain sequence"
                    );
                    continue
                }
                Err(BroadcastError::Rejected(reason)) => {
                    set_status(records, &signed.hash, SubmissionStatus::Failed);
                    if fresh {
                        in_flight.tx_hashes.pop();
                    }
                    if in_flight.tx_hashes.is_empty() {
                        sequencer.next = Some(sequence);
                    }
                    return Err(SubmissionError::Rejected {
                        insufficient_fee: is_insufficient_fee(&reason),
                        reason,
                    })
                }
                Err(BroadcastError::Rpc(err)) => {
                    // The transaction may have reached the pool anyway.
                    sequencer.unsettled = Some(in_flight);
                    return Err(err.into())
                }
            }
            sequencer.unsettled = Some(in_flight.clone());
            journal.broadcasted(&in_flight);

            if let Some(receipt) = self.await_receipt(&in_flight.tx_hashes).await? {
                return self.settle(sequencer, request, records, receipt)
            }

            if self.config.replace_by_fee && bumps < self.config.max_fee_bumps {
                set_status(records, &signed.hash, SubmissionStatus::Superseded);
                bumps = bumps.saturating_add(1);
                fee = bumped(fee, self.config.fee_bump_percent);
                tracing::warn!(
                    height = %request.header.height,
                    sequence,
                    fee,
                    "Transaction is not confirmed in time, replacing it with a higher fee"
                );
                continue
            }

            tracing::warn!(
                height = %request.header.height,
                sequence,
                "Transaction is not confirmed in time, it stays pending"
            );
            return Err(SubmissionError::Timeout(self.config.confirmation_timeout))
        }
    }

    fn settle(
        &self,
        sequencer: &mut Sequencer,
        request: &SubmissionRequest,
        records: &mut [SubmissionRecord],
        receipt: TransactionReceipt,
    ) -> Result<Receipt, SubmissionError> {
        let Some(record) = records.iter().find(|r| r.tx_hash == receipt.tx_hash).cloned()
        else {
            return Err(SubmissionError::Rpc(RpcError::Decode(format!(
                "receipt of unknown transaction {}",
                receipt.tx_hash
            ))))
        };
        sequencer.next = Some(record.sequence.saturating_add(1));
        sequencer.unsettled = None;
        for other in records.iter_mut() {
            if other.status == SubmissionStatus::Pending {
                other.status = SubmissionStatus::Superseded;
            }
        }

        match receipt.outcome {
            TransactionOutcome::Success => {
                set_status(records, &receipt.tx_hash, SubmissionStatus::Confirmed);
                Ok(Receipt {
                    tx_hash: receipt.tx_hash,
                    block_height: receipt.block_height,
                    sequence: record.sequence,
                    fee: record.fee,
                    relayed_height: request.header.height,
                })
            }
            TransactionOutcome::Reverted { reason } => {
                set_status(records, &receipt.tx_hash, SubmissionStatus::Failed);
                Err(SubmissionError::Rejected {
                    insufficient_fee: is_insufficient_fee(&reason),
                    reason,
                })
            }
        }
    }

    /// Polls until one of `tx_hashes` has a receipt or the confirmation
    /// timeout passes.
    async fn await_receipt(
        &self,
        tx_hashes: &[Bytes32],
    ) -> Result<Option<TransactionReceipt>, SubmissionError> {
        let deadline = Instant::now()
            .checked_add(self.config.confirmation_timeout)
            .unwrap_or_else(Instant::now);
        loop {
            match self.find_receipt(tx_hashes).await {
                Ok(Some(receipt)) => return Ok(Some(receipt)),
                Ok(None) => {}
                Err(SubmissionError::Rpc(err)) if err.is_transient() => {
                    tracing::debug!("Failed to poll the receipt: {err}");
                }
                Err(err) => return Err(err),
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None)
            }
            let wait = self
                .config
                .poll_interval
                .min(deadline.saturating_duration_since(now));
            tokio::time::sleep(wait).await;
        }
    }

    async fn find_receipt(
        &self,
        tx_hashes: &[Bytes32],
    ) -> Result<Option<TransactionReceipt>, SubmissionError> {
        for tx_hash in tx_hashes.iter().rev() {
            if let Some(receipt) = self.target.receipt(tx_hash).await? {
                return Ok(Some(receipt))
            }
        }
        Ok(None)
    }
}

/// Records of the transactions an unsettled submission broadcast so far.
fn pending_records(in_flight: &InFlightSubmission) -> Vec<SubmissionRecord> {
    in_flight
        .tx_hashes
        .iter()
        .zip(0u32..)
        .map(|(tx_hash, retry_count)| SubmissionRecord {
            sequence: in_flight.sequence,
            payload_hash: in_flight.payload_hash,
            tx_hash: *tx_hash,
            fee: in_flight.fee,
            status: SubmissionStatus::Pending,
            retry_count,
        })
        .collect()
}

fn set_status(records: &mut [SubmissionRecord], tx_hash: &Bytes32, status: SubmissionStatus) {
    if let Some(record) = records.iter_mut().find(|r| &r.tx_hash == tx_hash) {
        record.status = status;
    }
}

/// `fee` plus `percent` percent of it.
fn with_premium(fee: u128, percent: u32) -> u128 {
    let extra = fee
        .saturating_mul(u128::from(percent))
        .saturating_div(100);
    fee.saturating_add(extra)
}

/// The fee of a replacement, always above `fee`.
fn bumped(fee: u128, percent: u32) -> u128 {
    with_premium(fee, percent).max(fee.saturating_add(1))
}

/// Whether the chain refused the transaction because its fee is too low.
pub fn is_insufficient_fee(reason: &str) -> bool {
    const MARKERS: [&str; 4] = [
        "insufficient fee",
        "fee too low",
        "underpriced",
        "not enough fee",
    ];
    let reason = reason.to_lowercase();
    MARKERS.iter().any(|marker| reason.contains(marker))
}

/// Whether the chain refused the transaction because it already holds it.
pub fn is_already_known(reason: &str) -> bool {
    const MARKERS: [&str; 3] = ["already known", "already imported", "known transaction"];
    let reason = reason.to_lowercase();
    MARKERS.iter().any(|marker| reason.contains(marker))
}
