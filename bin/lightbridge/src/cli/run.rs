use anyhow::Context;
use clap::Parser;
use futures::future::select_all;
use lightbridge_relayer::{
    Config,
    Service,
    signer::Ed25519Signer,
    storage::FileCheckpointStore,
};
use std::path::{
    Path,
    PathBuf,
};
use tracing::{
    info,
    warn,
};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Parser)]
pub struct Command {
    /// Path to the TOML file describing the relay directions.
    #[arg(long = "config", short = 'c', env = "LIGHTBRIDGE_CONFIG")]
    pub config: PathBuf,

    /// Directions to run, all configured ones if empty.
    #[arg(long = "relay", value_delimiter = ',', env = "LIGHTBRIDGE_RELAYS")]
    pub relays: Vec<String>,
}

/// The configuration file: one `[[relay]]` table per direction.
#[derive(Debug, Default, serde::Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub relay: Vec<RelayEntry>,
}

#[derive(Debug, serde::Deserialize)]
pub struct RelayEntry {
    /// File holding the hex ed25519 secret key of the signer account.
    pub signer_secret_key_path: PathBuf,
    #[serde(flatten)]
    pub config: Config,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read the config {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse the config {}", path.display()))
    }

    /// The entries of `relays`, or every entry if `relays` is empty.
    pub fn select(self, relays: &[String]) -> anyhow::Result<Vec<RelayEntry>> {
        let mut directions = Vec::with_capacity(self.relay.len());
        for entry in &self.relay {
            let direction = entry.config.direction.as_str();
            if directions.contains(&direction) {
                anyhow::bail!("The direction `{direction}` is configured twice");
            }
            directions.push(direction);
        }
        if let Some(unknown) = relays
            .iter()
            .find(|relay| !directions.contains(&relay.as_str()))
        {
            anyhow::bail!("The direction `{unknown}` is not configured");
        }

        let selected: Vec<_> = self
            .relay
            .into_iter()
            .filter(|entry| {
                relays.is_empty()
                    || relays.iter().any(|relay| relay == entry.config.direction.as_str())
            })
            .collect();
        if selected.is_empty() {
            anyhow::bail!("No relay direction is configured");
        }
        Ok(selected)
    }
}

type RelayService = Service<Ed25519Signer, FileCheckpointStore>;

fn build_service(entry: RelayEntry) -> anyhow::Result<RelayService> {
    let RelayEntry {
        signer_secret_key_path,
        config,
    } = entry;
    let signer =
        Ed25519Signer::from_file(config.signer_account_id.clone(), &signer_secret_key_path)?;
    let store = FileCheckpointStore::new(&config.checkpoint_dir, &config.direction);
    info!(
        direction = %config.direction,
        account = %config.signer_account_id,
        public_key = %signer.public_key_hex(),
        checkpoint = %store.path().display(),
        "Configured the relay direction"
    );
    lightbridge_relayer::new_service(config, signer, store, None)
}

pub async fn exec(command: Command) -> anyhow::Result<()> {
    let entries = FileConfig::load(&command.config)?.select(&command.relays)?;
    let mut services = Vec::with_capacity(entries.len());
    for entry in entries {
        let direction = entry.config.direction.clone();
        services.push((direction, build_service(entry)?));
    }

    for (direction, service) in &services {
        service.start()?;
        let shared = service.shared.clone();
        let direction = direction.clone();
        tokio::spawn(async move {
            if shared.await_ready().await.is_ok() {
                info!(%direction, "The relayer is ready");
            }
        });
    }

    let stopped = select_all(
        services
            .iter()
            .map(|(_, service)| Box::pin(service.await_stop())),
    );
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received Ctrl-C, stopping the relayers");
        }
        (result, index, _) = stopped => {
            if let Some((direction, service)) = services.get(index) {
                warn!(
                    %direction,
                    state = ?service.shared.state(),
                    "The relayer stopped: {result:?}"
                );
            }
        }
    }

    for (_, service) in &services {
        service.stop_and_await().await?;
    }

    Ok(())
}
