//! The retrying, failing over client

use crate::{
    BackoffMaker,
    HttpTransport,
    RpcConfig,
    RpcError,
    Transport,
};
use anyhow::Context;
use core::sync::atomic::{
    AtomicUsize,
    Ordering,
};
use lightbridge_types::{
    BlockHeight,
    Bytes32,
    EpochId,
    blockchain::{
        header::BlockHeader,
        validators::ValidatorSet,
    },
    entities::TransactionReceipt,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{
    Value,
    json,
};
use std::collections::BTreeMap;
use tokio::time::Instant;
use tower::retry::backoff::Backoff as _;
use url::Url;


/// A single logical JSON-RPC endpoint backed by an ordered list of real ones.
///
/// A call starts at the endpoint that answered last. Retryable failures are
/// retried up to `max_attempts` times per endpoint with backoff in between,
/// then the call fails over to the next endpoint. Each endpoint is visited at
/// most once per call. Failures that cannot be fixed by retrying are returned
/// immediately.
pub struct RobustClient<T = HttpTransport> {
    transport: T,
    config: RpcConfig,
    cursor: AtomicUsize,
    backoff: BackoffMaker,
    validator_sets: Mutex<BTreeMap<EpochId, ValidatorSet>>,
    latest_height: Mutex<Option<(Instant, BlockHeight)>>,
}

impl RobustClient<HttpTransport> {
    /// Creates a client speaking JSON-RPC over HTTP.
    pub fn new(config: RpcConfig) -> anyhow::Result<Self> {
        Self::with_transport(config, HttpTransport::new()?)
    }
}

impl<T> RobustClient<T>
where
    T: Transport,
{
    /// Creates a client on top of a custom transport.
    pub fn with_transport(config: RpcConfig, transport: T) -> anyhow::Result<Self> {
        if config.urls.is_empty() {
            anyhow::bail!("At least one RPC endpoint url is required");
        }
        let backoff = config
            .backoff
            .maker()
            .context("Invalid backoff of the RPC client")?;
        Ok(Self {
            transport,
            config,
            cursor: AtomicUsize::new(0),
            backoff,
            validator_sets: Mutex::new(BTreeMap::new()),
            latest_height: Mutex::new(None),
        })
    }

    /// The configuration of the client.
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// The endpoint the next call starts at.
    pub fn current_endpoint(&self) -> &Url {
        let index = self.cursor.load(Ordering::Relaxed);
        self.config
            .urls
            .get(index)
            .unwrap_or(&self.config.urls[0])
    }

    /// Calls `method` with `params`, retrying and failing over as configured.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let endpoints = self.config.urls.len();
        let start = self.cursor.load(Ordering::Relaxed);
        let max_attempts = self.config.max_attempts.max(1);
        let call_timeout = self.config.call_timeout;

        let mut attempts: u32 = 0;
        let mut last = None;
        let order = self
            .config
            .urls
            .iter()
            .enumerate()
            .cycle()
            .skip(start)
            .take(endpoints);

        for (index, url) in order {
            let mut backoff = self.backoff.start();
            for attempt in 0..max_attempts {
                if attempt > 0 {
                    backoff.next_backoff().await;
                }
                attempts = attempts.saturating_add(1);

                let result = tokio::time::timeout(
                    call_timeout,
                    self.transport.request(url, method, &params),
                )
                .await
                .unwrap_or(Err(RpcError::Timeout(call_timeout)));

                match result {
                    Ok(value) => {
                        if index != start {
                            self.cursor.store(index, Ordering::Relaxed);
                        }
                        return Ok(value)
                    }
                    Err(err) if err.is_retryable() => {
                        tracing::debug!(
                            %url,
                            method,
                            attempt,
                            "Retryable RPC failure: {err}"
                        );
                        last = Some(err);
                    }
                    Err(err) => return Err(err),
                }
            }
            if endpoints > 1 {
                tracing::warn!(
                    %url,
                    method,
                    "Endpoint failed {max_attempts} times in a row, failing over"
                );
            }
        }

        Err(RpcError::Exhausted {
            attempts,
            last: Box::new(last.unwrap_or(RpcError::InvalidRequest(
                "no endpoint was tried".to_string(),
            ))),
        })
    }

    /// Like [`RobustClient::call`], deserializing the result.
    pub async fn call_typed<R>(&self, method: &str, params: Value) -> Result<R, RpcError>
    where
        R: DeserializeOwned,
    {
        let value = self.call(method, params).await?;
        serde_json::from_value(value).map_err(|err| RpcError::Decode(err.to_string()))
    }

    /// The latest height of the chain. Cached for `height_cache_ttl`.
    pub async fn latest_height(&self) -> Result<BlockHeight, RpcError> {
        let ttl = self.config.height_cache_ttl;
        if !ttl.is_zero() {
            if let Some((at, height)) = *self.latest_height.lock() {
                if at.elapsed() < ttl {
                    return Ok(height)
                }
            }
        }

        let height: BlockHeight = self
            .call_typed(&self.config.methods.latest_height, json!([]))
            .await?;

        if !ttl.is_zero() {
            *self.latest_height.lock() = Some((Instant::now(), height));
        }
        Ok(height)
    }

    /// The canonical header at `height`.
    pub async fn header(&self, height: BlockHeight) -> Result<BlockHeader, RpcError> {
        let header: BlockHeader = self
            .call_typed(&self.config.methods.header, json!([*height]))
            .await?;
        if header.height != height {
            return Err(RpcError::Decode(format!(
                "asked for header {height}, got header {}",
                header.height
            )))
        }
        Ok(header)
    }

    /// The validator set of `epoch`. Validator sets never change once an
    /// epoch started, so they are cached forever.
    pub async fn validator_set(&self, epoch: EpochId) -> Result<ValidatorSet, RpcError> {
        if let Some(set) = self.validator_sets.lock().get(&epoch) {
            return Ok(set.clone())
        }

        let set: ValidatorSet = self
            .call_typed(&self.config.methods.validator_set, json!([*epoch]))
            .await?;

        self.cache_validator_set(epoch, &set);
        Ok(set)
    }

    fn cache_validator_set(&self, epoch: EpochId, set: &ValidatorSet) {
        let capacity = self.config.validator_set_cache_epochs;
        if capacity == 0 {
            return
        }
        let mut cache = self.validator_sets.lock();
        cache.insert(epoch, set.clone());
        while cache.len() > capacity {
            cache.pop_first();
        }
    }

    /// The next sequence number of `identity`.
    pub async fn sequence(&self, identity: &str) -> Result<u64, RpcError> {
        self.call_typed(&self.config.methods.sequence, json!([identity]))
            .await
    }

    /// Fee the chain currently asks for a transaction carrying
    /// `payload_len` bytes.
    pub async fn estimate_fee(&self, payload_len: u64) -> Result<u128, RpcError> {
        #[derive(serde::Deserialize)]
        struct Fee(#[serde(with = "lightbridge_types::serde_helpers::u128_string")] u128);

        let Fee(fee): Fee = self
            .call_typed(&self.config.methods.estimate_fee, json!([payload_len]))
            .await?;
        Ok(fee)
    }

    /// Broadcasts a signed transaction and returns its hash.
    pub async fn broadcast_transaction(&self, raw: &[u8]) -> Result<Bytes32, RpcError> {
        let raw = format!("0x{}", hex::encode(raw));
        self.call_typed(&self.config.methods.broadcast, json!([raw]))
            .await
    }

    /// The receipt of `tx_hash`, or `None` while it is not included.
    pub async fn receipt(
        &self,
        tx_hash: &Bytes32,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        self.call_typed(&self.config.methods.receipt, json!([tx_hash]))
            .await
    }

    /// Height of the newest header the light client accepted, `None` while
    /// it is not initialized.
    pub async fn light_client_head(&self) -> Result<Option<BlockHeight>, RpcError> {
        self.call_typed(&self.config.methods.light_client_head, json!([]))
            .await
    }

    /// Whether the light client accepted the header with `hash`.
    pub async fn is_known_header(&self, hash: &Bytes32) -> Result<bool, RpcError> {
        self.call_typed(&self.config.methods.known_header, json!([hash]))
            .await
    }
}
