//! Configuration loading tests
//!
//! Only `env_override_wins_over_file` touches the environment, and it uses a
//! key no other test in this binary asserts on.

use compressed_token_builder::addresses::DEFAULT_STATE_TREE;
use compressed_token_builder::config::{AppConfig, NetworkProfile};
use solana_sdk::pubkey::Pubkey;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn toml_file(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let tree = Pubkey::new_unique();
    let queue = Pubkey::new_unique();
    let file = toml_file(&format!(
        r#"
[network]
profile = "local"

[rpc]
rate_limit_rps = 4
commitment = "finalized"

[rpc.retry]
max_attempts = 2

[builder]
compute_unit_limit = 400000
output_state_tree = "{tree}"
nullifier_queue = "{queue}"
guard_reclaim_close = true
"#
    ));

    let config = AppConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.network.profile, NetworkProfile::Local);
    assert_eq!(config.network.endpoint(), "http://localhost:8989/");
    assert_eq!(config.rpc.rate_limit_rps, 4);
    assert_eq!(config.rpc.retry.max_attempts, 2);
    assert_eq!(config.rpc.retry.base_delay_ms, 400);

    let settings = config.builder_settings();
    assert_eq!(settings.compute_unit_limit, 400_000);
    assert_eq!(settings.output_state_tree, tree);
    assert!(settings.guard_reclaim_close);

    let photon = config.to_photon_config().unwrap();
    assert_eq!(photon.endpoint, "http://localhost:8989/");
    assert_eq!(photon.state_trees.len(), 2);
    assert_eq!(photon.state_trees[0].queue, queue);
    assert_eq!(photon.state_trees[1].tree, DEFAULT_STATE_TREE);
}

#[test]
fn test_from_file_matches_load() {
    let file = toml_file("[network]\nrpc_url = \"http://127.0.0.1:8899\"\n");
    let config = AppConfig::from_file(file.path()).unwrap();
    assert_eq!(config.network.endpoint(), "http://127.0.0.1:8899");
    assert_eq!(config.builder.default_decimals, 9);
}

#[test]
fn test_invalid_file_is_rejected() {
    let file = toml_file("[rpc]\ncommitment = \"sometime\"\n");
    assert!(AppConfig::load(Some(file.path())).is_err());
}

#[test]
fn test_same_tree_and_queue_rejected() {
    let key = Pubkey::new_unique();
    let file = toml_file(&format!(
        "[builder]\noutput_state_tree = \"{key}\"\nnullifier_queue = \"{key}\"\n"
    ));
    assert!(AppConfig::from_file(file.path()).is_err());
}

#[test]
fn test_missing_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    assert!(AppConfig::load(Some(&path)).is_err());
}

#[test]
fn env_override_wins_over_file() {
    let file = toml_file("[rpc]\nconfirm_timeout_secs = 10\n");

    std::env::set_var("CTOKEN__RPC__CONFIRM_TIMEOUT_SECS", "25");
    let loaded = AppConfig::load(Some(file.path()));
    std::env::remove_var("CTOKEN__RPC__CONFIRM_TIMEOUT_SECS");

    let config = loaded.unwrap();
    assert_eq!(config.rpc.confirm_timeout_secs, 25);
    assert_eq!(
        config.to_photon_config().unwrap().confirm_timeout,
        Duration::from_secs(25)
    );
}

#[test]
fn test_token_2022_program_from_file() {
    let file = toml_file(&format!(
        "[builder]\ntoken_program = \"{}\"\n",
        spl_token_2022::id()
    ));
    let config = AppConfig::from_file(file.path()).unwrap();
    assert_eq!(config.builder_settings().token_program, spl_token_2022::id());
}

#[test]
fn test_unknown_token_program_rejected() {
    let file = toml_file(&format!(
        "[builder]\ntoken_program = \"{}\"\n",
        Pubkey::new_unique()
    ));
    assert!(AppConfig::from_file(file.path()).is_err());
}
