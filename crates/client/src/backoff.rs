//! Exponential backoff policy

use core::time::Duration;
use tower::{
    retry::backoff::{
        ExponentialBackoff,
        ExponentialBackoffMaker,
        InvalidBackoff,
        MakeBackoff,
    },
    util::rng::HasherRng,
};

/// Exponential backoff: the first delay is `initial`, every next one doubles
/// up to `max`. Each delay is stretched by a random share of up to
/// `jitter_percent` percent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Backoff {
    /// Delay before the first retry.
    #[serde(with = "humantime_serde")]
    pub initial: Duration,
    /// Upper bound of the delay before jitter.
    #[serde(with = "humantime_serde")]
    pub max: Duration,
    /// Random extra delay, in percent of the delay.
    #[serde(default)]
    pub jitter_percent: u32,
}

#[allow(missing_docs)]
impl Backoff {
    pub const DEFAULT_INITIAL: Duration = Duration::from_millis(200);
    pub const DEFAULT_MAX: Duration = Duration::from_secs(30);
    pub const DEFAULT_JITTER_PERCENT: u32 = 10;

    /// Builds the backoffs of this policy. Fails if `initial` is above
    /// `max`, `max` is zero or the jitter is above 100 percent.
    pub fn maker(&self) -> Result<BackoffMaker, InvalidBackoff> {
        let jitter = f64::from(self.jitter_percent) / 100.0;
        let maker =
            ExponentialBackoffMaker::new(self.initial, self.max, jitter, HasherRng::default())?;
        Ok(BackoffMaker(maker))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Self::DEFAULT_INITIAL,
            max: Self::DEFAULT_MAX,
            jitter_percent: Self::DEFAULT_JITTER_PERCENT,
        }
    }
}

/// A validated [`Backoff`] that hands out fresh backoff sequences.
#[derive(Clone, Debug)]
pub struct BackoffMaker(ExponentialBackoffMaker);

impl BackoffMaker {
    /// A sequence of delays starting over at the initial one.
    pub fn start(&self) -> ExponentialBackoff {
        self.0.clone().make_backoff()
    }
}
