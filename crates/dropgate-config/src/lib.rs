// crates/dropgate-config/src/lib.rs
// ============================================================================
// Module: Dropgate Config
// Description: Canonical configuration model for the dropgate service.
// Purpose: Load, validate, and resolve `dropgate.toml` into runtime settings.
// Dependencies: dropgate-core, dropgate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! [`DropgateConfig`] is the single source of truth for server, backend,
//! policy, and identity settings. Loading is fail-closed: oversized or
//! non-UTF-8 files, unknown fields, and out-of-range values are rejected
//! before any backend is constructed. Secrets never live in the file; the
//! file names environment variables and [`ResolvedSecrets`] reads them.

pub mod config;
pub mod secrets;

pub use config::AuditConfig;
pub use config::AuditSinkKind;
pub use config::BlobBackend;
pub use config::BlobsConfig;
pub use config::CONFIG_ENV_VAR;
pub use config::ConfigError;
pub use config::DEFAULT_CONFIG_PATH;
pub use config::DropgateConfig;
pub use config::IdentityConfig;
pub use config::MAX_CONFIG_FILE_BYTES;
pub use config::PaymentProvider;
pub use config::PaymentsConfig;
pub use config::PrincipalConfig;
pub use config::RetryConfig;
pub use config::S3BlobConfig;
pub use config::SecretsConfig;
pub use config::ServerConfig;
pub use config::StoreBackend;
pub use config::StoreConfig;
pub use config::TransfersConfig;
pub use config::UploadsConfig;
pub use config::resolve_config_path;
pub use secrets::ResolvedPrincipal;
pub use secrets::ResolvedSecrets;
pub use secrets::SECRET_KEY_BYTES;
pub use secrets::encode_key;
