// crates/dropgate-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing, summaries, and key generation.
// Purpose: Ensure generated secrets are accepted by the config loader.
// Dependencies: dropgate-cli main helpers
// ============================================================================

//! ## Overview
//! Generated secrets must round through the same resolver `serve` uses, and
//! the argument surface must stay stable for scripts.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use clap::Parser;
use dropgate_config::DropgateConfig;
use dropgate_config::ResolvedSecrets;
use dropgate_config::SecretsConfig;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::Cli;
use super::Commands;
use super::ConfigCommand;
use super::GeneratedSecrets;
use super::KeysCommand;
use super::config_summary;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const CONFIG: &str = r#"
[server]
bind = "127.0.0.1:9090"

[secrets]
signing_seed_env = "APP_SEED"

[[identity.principals]]
id = "seller-1"
token_env = "APP_TOKEN_SELLER"
"#;

fn parse_env_lines(lines: &[String]) -> BTreeMap<String, String> {
    lines
        .iter()
        .filter(|line| !line.starts_with('#'))
        .map(|line| {
            let (name, value) = line.split_once('=').expect("NAME=value line");
            (name.to_string(), value.to_string())
        })
        .collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn generated_secrets_resolve_with_configured_names() {
    let config = DropgateConfig::from_toml(CONFIG).expect("config");
    let generated = GeneratedSecrets::generate(&mut StdRng::seed_from_u64(7));
    let lines = generated.env_lines(&config.secrets);
    let mut env = parse_env_lines(&lines);
    assert!(env.contains_key("APP_SEED"));
    assert!(!env.contains_key("DROPGATE_SIGNING_SEED"));
    env.insert("APP_TOKEN_SELLER".to_string(), "token".to_string());

    let secrets = ResolvedSecrets::resolve(&config, |name| env.get(name).cloned())
        .expect("generated secrets resolve");
    assert_eq!(secrets.signing_seed, generated.signing_seed);
    assert_eq!(secrets.envelope_key, generated.envelope_key);
}

#[test]
fn generated_secrets_differ_between_draws() {
    let mut rng = StdRng::seed_from_u64(11);
    let first = GeneratedSecrets::generate(&mut rng);
    let second = GeneratedSecrets::generate(&mut rng);
    assert_ne!(first.signing_seed, second.signing_seed);
    assert_ne!(first.signing_seed, first.envelope_key);
}

#[test]
fn env_lines_lead_with_verifying_key_comment() {
    let generated = GeneratedSecrets::generate(&mut StdRng::seed_from_u64(3));
    let lines = generated.env_lines(&SecretsConfig::default());
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("# token verifying key: "));
    assert!(lines[1].starts_with("DROPGATE_SIGNING_SEED="));
    assert!(lines[3].starts_with("DROPGATE_WEBHOOK_SECRET="));
}

#[test]
fn config_summary_names_backends() {
    let config = DropgateConfig::from_toml(CONFIG).expect("config");
    let summary = config_summary(&config);
    assert_eq!(summary[0], "config ok");
    assert!(summary.contains(&"bind: 127.0.0.1:9090".to_string()));
    assert!(summary.contains(&"public base url: http://127.0.0.1:9090".to_string()));
    assert!(summary.contains(&"store: memory".to_string()));
    assert!(summary.contains(&"payments: mock".to_string()));
    assert!(summary.contains(&"principals: 1".to_string()));
}

#[test]
fn cli_parses_config_check_flags() {
    let cli = Cli::try_parse_from([
        "dropgate",
        "config",
        "check",
        "--config",
        "/etc/dropgate.toml",
        "--skip-secrets",
    ])
    .expect("parse");
    let Some(Commands::Config {
        command: ConfigCommand::Check(command),
    }) = cli.command
    else {
        panic!("expected config check");
    };
    assert!(command.skip_secrets);
    assert_eq!(command.config.as_deref(), Some(std::path::Path::new("/etc/dropgate.toml")));
}

#[test]
fn cli_parses_keys_generate_without_config() {
    let cli = Cli::try_parse_from(["dropgate", "keys", "generate"]).expect("parse");
    let Some(Commands::Keys {
        command: KeysCommand::Generate(command),
    }) = cli.command
    else {
        panic!("expected keys generate");
    };
    assert!(command.config.is_none());
}

#[test]
fn cli_rejects_unknown_subcommand() {
    assert!(Cli::try_parse_from(["dropgate", "launch"]).is_err());
}
