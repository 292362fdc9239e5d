use core::time::Duration;
use lightbridge_client::{
    Backoff,
    RpcConfig,
};
use lightbridge_types::{
    BlockHeight,
    entities::RelayDirection,
};
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
/// Configuration settings of one relay direction.
pub struct Config {
    /// Name of the direction. Keys the checkpoint.
    pub direction: RelayDirection,
    /// Endpoints of the chain headers are read from.
    pub source: RpcConfig,
    /// Endpoints of the chain hosting the light client.
    pub target: RpcConfig,
    /// Account on the target chain that signs and pays for submissions.
    pub signer_account_id: String,
    /// Height the light client was initialized with. Relaying starts right
    /// above it when no checkpoint exists yet.
    pub start_height: BlockHeight,
    /// Wait between polls of the source chain once caught up.
    #[serde(with = "humantime_serde")]
    pub polling_interval: Duration,
    /// Deepest source-chain reorganization the relayer recovers from.
    pub max_reorg_depth: u64,
    /// How long a broadcast may stay unconfirmed.
    #[serde(with = "humantime_serde")]
    pub confirmation_timeout: Duration,
    /// Wait between two receipt polls.
    #[serde(with = "humantime_serde")]
    pub confirmation_poll_interval: Duration,
    /// Wait after failed cycles, growing with consecutive failures.
    pub error_backoff: Backoff,
    /// Move past a height the light client rejects instead of retrying it.
    pub skip_on_rejection: bool,
    /// Rebroadcast unconfirmed transactions with a higher fee.
    pub replace_by_fee: bool,
    /// Fee increase of a replacement, and of the retry after an insufficient
    /// fee rejection, in percent.
    pub fee_bump_percent: u32,
    /// Replacements per submission before giving up.
    pub max_fee_bumps: u32,
    /// Heights submitted per cycle before the source chain is polled again.
    pub max_heights_per_cycle: u64,
    /// Directory of the checkpoint files.
    pub checkpoint_dir: PathBuf,
}

#[allow(missing_docs)]
impl Config {
    pub const DEFAULT_DIRECTION: &'static str = "source-to-target";
    pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(6);
    pub const DEFAULT_MAX_REORG_DEPTH: u64 = 64;
    pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_secs(2);
    pub const DEFAULT_ERROR_BACKOFF: Backoff = Backoff {
        initial: Duration::from_secs(1),
        max: Duration::from_secs(60),
        jitter_percent: 10,
    };
    pub const DEFAULT_FEE_BUMP_PERCENT: u32 = 10;
    pub const DEFAULT_MAX_FEE_BUMPS: u32 = 3;
    pub const DEFAULT_MAX_HEIGHTS_PER_CYCLE: u64 = 32;
    pub const DEFAULT_CHECKPOINT_DIR: &'static str = "checkpoints";

    /// Number of relayed headers the checkpoint remembers, enough to find the
    /// fork point of the deepest recoverable reorganization.
    pub fn history_len(&self) -> usize {
        usize::try_from(self.max_reorg_depth)
            .unwrap_or(usize::MAX)
            .saturating_add(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            direction: RelayDirection::new(Self::DEFAULT_DIRECTION),
            source: RpcConfig::default(),
            target: RpcConfig::default(),
            signer_account_id: String::new(),
            start_height: BlockHeight::default(),
            polling_interval: Self::DEFAULT_POLLING_INTERVAL,
            max_reorg_depth: Self::DEFAULT_MAX_REORG_DEPTH,
            confirmation_timeout: Self::DEFAULT_CONFIRMATION_TIMEOUT,
            confirmation_poll_interval: Self::DEFAULT_CONFIRMATION_POLL_INTERVAL,
            error_backoff: Self::DEFAULT_ERROR_BACKOFF,
            skip_on_rejection: false,
            replace_by_fee: true,
            fee_bump_percent: Self::DEFAULT_FEE_BUMP_PERCENT,
            max_fee_bumps: Self::DEFAULT_MAX_FEE_BUMPS,
            max_heights_per_cycle: Self::DEFAULT_MAX_HEIGHTS_PER_CYCLE,
            checkpoint_dir: PathBuf::from(Self::DEFAULT_CHECKPOINT_DIR),
        }
    }
}
