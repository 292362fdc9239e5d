use clap::{
    Parser,
    Subcommand,
};

pub mod logging;
pub mod run;


/// Relays block headers between chains to on-chain light clients.
#[derive(Debug, Parser)]
#[command(name = "lightbridge", version, rename_all = "kebab-case")]
pub struct Opt {
    #[command(flatten)]
    pub logging: logging::LogArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the configured relay directions until interrupted.
    Run(run::Command),
}

/// Loads `.env` when the `env` feature is on. Runs before the arguments are
/// parsed so that its variables fill in the `env` fallbacks of the flags.
fn load_dotenv() -> Option<std::path::PathBuf> {
    #[cfg(feature = "env")]
    {
        dotenvy::dotenv().ok()
    }
    #[cfg(not(feature = "env"))]
    {
        None
    }
}

pub async fn run_cli() -> anyhow::Result<()> {
    let dotenv = load_dotenv();
    let opt = Opt::parse();
    opt.logging.init()?;
    if let Some(path) = dotenv {
        tracing::info!(path = %path.display(), "Loaded environment variables");
    }

    match opt.command {
        Command::Run(command) => run::exec(command).await,
    }
}
