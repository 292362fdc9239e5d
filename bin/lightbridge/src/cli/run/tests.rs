use super::*;
use std::time::Duration;

const CONFIG: &str = r#"
[[relay]]
direction = "eth-to-near"
signer_account_id = "relayer.testnet"
signer_secret_key_path = "keys/eth-to-near.key"
start_height = 100
polling_interval = "3s"

[relay.source]
urls = ["http://localhost:8545"]

[relay.target]
urls = ["http://localhost:3030"]

[[relay]]
direction = "near-to-eth"
signer_account_id = "0xrelayer"
signer_secret_key_path = "keys/near-to-eth.key"
max_reorg_depth = 8
"#;

fn file_config() -> FileConfig {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lightbridge.toml");
    std::fs::write(&path, CONFIG).unwrap();
    FileConfig::load(&path).unwrap()
}

#[test]
fn loads_every_direction() {
    let config = file_config();

    assert_eq!(config.relay.len(), 2);
    let eth_to_near = &config.relay[0];
    assert_eq!(eth_to_near.config.direction.as_str(), "eth-to-near");
    assert_eq!(
        eth_to_near.signer_secret_key_path,
        PathBuf::from("keys/eth-to-near.key")
    );
    assert_eq!(eth_to_near.config.polling_interval, Duration::from_secs(3));
    assert_eq!(eth_to_near.config.source.urls.len(), 1);
    let near_to_eth = &config.relay[1];
    assert_eq!(near_to_eth.config.max_reorg_depth, 8);
    assert_eq!(
        near_to_eth.config.polling_interval,
        Config::DEFAULT_POLLING_INTERVAL
    );
}

#[test]
fn selects_all_directions_by_default() {
    let selected = file_config().select(&[]).unwrap();
    assert_eq!(selected.len(), 2);
}

#[test]
fn selects_the_requested_directions() {
    let selected = file_config()
        .select(&["near-to-eth".to_string()])
        .unwrap();

    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].config.direction.as_str(), "near-to-eth");
}

#[test]
fn unknown_direction_is_an_error() {
    assert!(file_config().select(&["btc-to-near".to_string()]).is_err());
}

#[test]
fn empty_config_is_an_error() {
    assert!(FileConfig::default().select(&[]).is_err());
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(FileConfig::load(&dir.path().join("missing.toml")).is_err());
}
