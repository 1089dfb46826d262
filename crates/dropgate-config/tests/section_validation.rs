//! Section validation tests for dropgate-config.
// crates/dropgate-config/tests/section_validation.rs
// =============================================================================
// Module: Section Validation Tests
// Description: Validate backend, policy, limit, and identity constraints.
// Purpose: Ensure every section fails closed and maps onto engine settings.
// =============================================================================

use std::path::PathBuf;

use dropgate_config::AuditSinkKind;
use dropgate_config::BlobBackend;
use dropgate_config::ConfigError;
use dropgate_config::DropgateConfig;
use dropgate_config::PrincipalConfig;
use dropgate_config::S3BlobConfig;
use dropgate_config::StoreBackend;
use dropgate_core::DeliveryError;
use dropgate_core::ErrorKind;
use dropgate_core::MAX_CHUNK_SIZE_BYTES;
use dropgate_core::Span;
use dropgate_core::StorageType;

mod common;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<(), ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error '{message}' did not contain '{needle}'"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

#[test]
fn defaults_map_onto_engine_settings() -> TestResult {
    let config = common::minimal_config().map_err(|err| err.to_string())?;
    let delivery = config.delivery_config();
    if delivery.key_ttl != Span::days(7)
        || delivery.claim_token_ttl != Span::hours(24)
        || delivery.download_token_ttl != Span::hours(1)
        || delivery.session_ttl != Span::hours(24)
        || delivery.dispute_window != Span::days(30)
    {
        return Err("default lifetimes do not match engine defaults".to_string());
    }
    if delivery.default_currency != "USD" || delivery.allow_unpaid_grant {
        return Err("default transfer policy changed".to_string());
    }
    if delivery.retry.max_attempts != 3 || delivery.retry.base_backoff_ms != 200 {
        return Err("default retry policy changed".to_string());
    }
    if delivery.public_base_url != "http://127.0.0.1:8080" {
        return Err(format!("unexpected base url {}", delivery.public_base_url));
    }
    if delivery.storage_type != StorageType::Memory {
        return Err("memory blobs expected by default".to_string());
    }
    Ok(())
}

#[test]
fn overrides_flow_into_engine_settings() -> TestResult {
    let text = format!(
        "[server]\nbind = \"127.0.0.1:9000\"\nbase_url = \"https://cdn.example.com\"\n\n\
         [transfers]\ndefault_currency = \"eur\"\nallow_unpaid_grant = true\nkey_ttl_secs = \
         3600\n\n[blobs]\nbackend = \"filesystem\"\nroot = \"/var/lib/dropgate/blobs\"\n{}",
        common::MINIMAL_TOML.replace("[server]\nbind = \"127.0.0.1:8080\"\n", "")
    );
    let config = DropgateConfig::from_toml(&text).map_err(|err| err.to_string())?;
    let delivery = config.delivery_config();
    if delivery.default_currency != "EUR" || !delivery.allow_unpaid_grant {
        return Err("transfer overrides ignored".to_string());
    }
    if delivery.key_ttl != Span::hours(1) {
        return Err("key ttl override ignored".to_string());
    }
    if delivery.public_base_url != "https://cdn.example.com" {
        return Err("base url override ignored".to_string());
    }
    if delivery.storage_type != StorageType::Filesystem {
        return Err("filesystem storage type expected".to_string());
    }
    Ok(())
}

#[test]
fn config_errors_surface_as_configuration_errors() -> TestResult {
    let error: DeliveryError = ConfigError::MissingSecret("X is not set".to_string()).into();
    if error.kind() != ErrorKind::ConfigurationError {
        return Err("config errors must map to configuration errors".to_string());
    }
    Ok(())
}

// ============================================================================
// SECTION: Server
// ============================================================================

#[test]
fn server_rejects_unparsable_bind() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.server.bind = "localhost".to_string();
    assert_invalid(config.validate(), "server.bind is not an address")
}

#[test]
fn server_rejects_non_loopback_without_principals() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.server.bind = "0.0.0.0:8080".to_string();
    config.identity.principals.clear();
    assert_invalid(config.validate(), "non-loopback bind disallowed without identity principals")
}

#[test]
fn server_body_limit_must_fit_a_chunk() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.server.max_body_bytes = MAX_CHUNK_SIZE_BYTES - 1;
    assert_invalid(config.validate(), "server.max_body_bytes must be at least")
}

#[test]
fn server_rejects_non_http_base_url() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.server.base_url = Some("ftp://files.example.com".to_string());
    assert_invalid(config.validate(), "server.base_url must use http or https")
}

// ============================================================================
// SECTION: Backends
// ============================================================================

#[test]
fn sqlite_backend_requires_section() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.store.backend = StoreBackend::Sqlite;
    config.store.sqlite = None;
    assert_invalid(config.validate(), "store.sqlite is required")
}

#[test]
fn filesystem_backend_requires_root() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.blobs.backend = BlobBackend::Filesystem;
    config.blobs.root = Some(PathBuf::new());
    assert_invalid(config.validate(), "blobs.root is required")
}

#[test]
fn s3_backend_requires_bucket_and_http_endpoint() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.blobs.backend = BlobBackend::S3;
    assert_invalid(config.validate(), "blobs.s3 is required")?;
    config.blobs.s3 = Some(S3BlobConfig {
        bucket: " ".to_string(),
        prefix: None,
        region: None,
        endpoint: None,
        force_path_style: false,
    });
    assert_invalid(config.validate(), "blobs.s3.bucket must not be empty")?;
    config.blobs.s3 = Some(S3BlobConfig {
        bucket: "dropgate".to_string(),
        prefix: Some("products".to_string()),
        region: Some("us-east-1".to_string()),
        endpoint: Some("s3://minio".to_string()),
        force_path_style: true,
    });
    assert_invalid(config.validate(), "blobs.s3.endpoint must use http or https")
}

#[test]
fn audit_file_sink_requires_path() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.audit.sink = AuditSinkKind::File;
    config.audit.path = None;
    assert_invalid(config.validate(), "audit.path is required")
}

// ============================================================================
// SECTION: Limits
// ============================================================================

#[test]
fn uploads_reject_chunk_ceiling_above_hard_limit() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.uploads.max_chunk_size_bytes = MAX_CHUNK_SIZE_BYTES + 1;
    assert_invalid(config.validate(), "uploads.max_chunk_size_bytes must be between")
}

#[test]
fn uploads_reject_zero_total() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.uploads.max_total_size_bytes = 0;
    assert_invalid(config.validate(), "uploads.max_total_size_bytes must be between")
}

#[test]
fn lifetimes_must_be_positive() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.transfers.download_token_ttl_secs = 0;
    assert_invalid(config.validate(), "transfers.download_token_ttl_secs must be between")
}

#[test]
fn retry_attempts_are_bounded() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.retry.max_attempts = 0;
    assert_invalid(config.validate(), "retry.max_attempts must be between")?;
    config.retry.max_attempts = 11;
    assert_invalid(config.validate(), "retry.max_attempts must be between")
}

#[test]
fn currency_must_be_three_letters() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.transfers.default_currency = "EURO".to_string();
    assert_invalid(config.validate(), "transfers.default_currency")
}

// ============================================================================
// SECTION: Identity
// ============================================================================

#[test]
fn identity_rejects_duplicate_principals() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.identity.principals.push(PrincipalConfig {
        id: "seller-1".to_string(),
        token_env: "DROPGATE_TOKEN_OTHER".to_string(),
    });
    assert_invalid(config.validate(), "duplicate identity principal: seller-1")
}

#[test]
fn identity_rejects_lowercase_token_env() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.identity.principals[0].token_env = "seller_token".to_string();
    assert_invalid(config.validate(), "identity.principals.token_env")
}
