use anyhow::Context;
use clap::{
    Args,
    ValueEnum,
};
use tracing_subscriber::{
    EnvFilter,
    Layer,
    layer::SubscriberExt,
};

/// How log lines are rendered on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Colored lines for a terminal.
    Pretty,
    /// One JSON object per line.
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct LogArgs {
    /// Directives selecting the logged targets and levels.
    #[arg(long = "log-filter", env = "RUST_LOG", default_value = "info", global = true)]
    pub filter: String,

    /// Rendering of the log lines.
    #[arg(
        long = "log-format",
        env = "LIGHTBRIDGE_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Pretty,
        global = true
    )]
    pub format: LogFormat,
}

impl LogArgs {
    pub fn env_filter(&self) -> anyhow::Result<EnvFilter> {
        EnvFilter::try_new(&self.filter)
            .with_context(|| format!("Invalid log filter `{}`", self.filter))
    }

    /// Installs the global subscriber.
    pub fn init(&self) -> anyhow::Result<()> {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_level(true)
            .with_target(true);
        let layer = match self.format {
            LogFormat::Pretty => layer.with_ansi(true).boxed(),
            LogFormat::Json => layer.with_ansi(false).json().boxed(),
        };
        let subscriber = tracing_subscriber::registry()
            .with(self.env_filter()?)
            .with(layer);
        tracing::subscriber::set_global_default(subscriber)
            .context("A global tracing subscriber is already installed")
    }
}
