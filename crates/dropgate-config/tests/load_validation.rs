//! Config load validation tests for dropgate-config.
// crates/dropgate-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding, fields).
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use dropgate_config::ConfigError;
use dropgate_config::DEFAULT_CONFIG_PATH;
use dropgate_config::DropgateConfig;
use dropgate_config::StoreBackend;
use dropgate_config::resolve_config_path;
use tempfile::NamedTempFile;

mod common;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<DropgateConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    assert_invalid(
        DropgateConfig::load(Some(Path::new(&long_path))),
        "config path exceeds max length",
    )
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(
        DropgateConfig::load(Some(Path::new(&long_component))),
        "config path component too long",
    )
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    let payload = vec![b'#'; 1_048_577];
    file.write_all(&payload).map_err(|err| err.to_string())?;
    assert_invalid(DropgateConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(DropgateConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_reports_missing_file_as_io() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("absent.toml");
    match DropgateConfig::load(Some(&path)) {
        Err(ConfigError::Io(_)) => Ok(()),
        other => Err(format!("expected io error, got ok={}", other.is_ok())),
    }
}

#[test]
fn load_rejects_unknown_fields() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(b"[server]\nbind = \"127.0.0.1:8080\"\nlisten_backlog = 5\n")
        .map_err(|err| err.to_string())?;
    assert_invalid(DropgateConfig::load(Some(file.path())), "config parse error")
}

#[test]
fn load_accepts_sqlite_config() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let db_path = dir.path().join("dropgate.sqlite");
    let text = format!(
        "[store]\nbackend = \"sqlite\"\n\n[store.sqlite]\npath = \"{}\"\njournal_mode = \
         \"wal\"\nsync_mode = \"normal\"\n\n{}",
        db_path.display(),
        common::MINIMAL_TOML
    );
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(text.as_bytes()).map_err(|err| err.to_string())?;
    let config = DropgateConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.store.backend != StoreBackend::Sqlite {
        return Err("expected sqlite backend".to_string());
    }
    let sqlite = config.store.sqlite.ok_or("missing sqlite section")?;
    if sqlite.path != db_path || sqlite.busy_timeout_ms != 5_000 {
        return Err("sqlite section not parsed".to_string());
    }
    Ok(())
}

#[test]
fn config_path_prefers_explicit_then_env_then_default() -> TestResult {
    let explicit = PathBuf::from("/etc/dropgate/explicit.toml");
    if resolve_config_path(Some(&explicit), Some("/env.toml")) != explicit {
        return Err("explicit path should win".to_string());
    }
    if resolve_config_path(None, Some("/env.toml")) != Path::new("/env.toml") {
        return Err("env path should be used without an explicit path".to_string());
    }
    if resolve_config_path(None, Some("  ")) != Path::new(DEFAULT_CONFIG_PATH) {
        return Err("blank env value should fall back to the default".to_string());
    }
    if resolve_config_path(None, None) != Path::new(DEFAULT_CONFIG_PATH) {
        return Err("default path expected".to_string());
    }
    Ok(())
}
