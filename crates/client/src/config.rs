//! Endpoint configuration

use crate::Backoff;
use core::time::Duration;
use url::Url;

/// Names of the JSON-RPC methods of a chain.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ChainMethods {
    pub latest_height: String,
    pub header: String,
    pub validator_set: String,
    pub sequence: String,
    pub estimate_fee: String,
    pub broadcast: String,
    pub receipt: String,
    pub light_client_head: String,
    pub known_header: String,
}

impl Default for ChainMethods {
    fn default() -> Self {
        Self {
            latest_height: "chain_latestHeight".to_string(),
            header: "chain_header".to_string(),
            validator_set: "chain_validatorSet".to_string(),
            sequence: "account_sequence".to_string(),
            estimate_fee: "tx_estimateFee".to_string(),
            broadcast: "tx_broadcast".to_string(),
            receipt: "tx_receipt".to_string(),
            light_client_head: "lightClient_head".to_string(),
            known_header: "lightClient_isKnownHeader".to_string(),
        }
    }
}

/// Configuration of a [`RobustClient`](crate::RobustClient).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Endpoints in order of preference.
    pub urls: Vec<Url>,
    /// Attempts per endpoint before failing over.
    pub max_attempts: u32,
    /// Delay between attempts on the same endpoint.
    pub backoff: Backoff,
    /// Bound of a single attempt.
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
    /// How long the latest height stays cached. Zero disables the cache.
    #[serde(with = "humantime_serde")]
    pub height_cache_ttl: Duration,
    /// Number of epochs whose validator sets stay cached. Only the latest
    /// epochs are kept. Zero disables the cache.
    pub validator_set_cache_epochs: usize,
    /// Method names of the chain.
    pub methods: ChainMethods,
}

#[allow(missing_docs)]
impl RpcConfig {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_HEIGHT_CACHE_TTL: Duration = Duration::ZERO;
    pub const DEFAULT_VALIDATOR_SET_CACHE_EPOCHS: usize = 16;

    /// Default configuration for the given endpoints.
    pub fn with_urls(urls: Vec<Url>) -> Self {
        Self {
            urls,
            ..Default::default()
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            urls: vec![],
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
            call_timeout: Self::DEFAULT_CALL_TIMEOUT,
            height_cache_ttl: Self::DEFAULT_HEIGHT_CACHE_TTL,
            validator_set_cache_epochs: Self::DEFAULT_VALIDATOR_SET_CACHE_EPOCHS,
            methods: ChainMethods::default(),
        }
    }
}
