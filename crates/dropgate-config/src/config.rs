// crates/dropgate-config/src/config.rs
// ============================================================================
// Module: Dropgate Config Model
// Description: Configuration sections, loading guards, and validation.
// Purpose: Turn `dropgate.toml` into validated runtime settings, fail-closed.
// Dependencies: dropgate-core, dropgate-store-sqlite, serde, toml, url
// ============================================================================

//! ## Overview
//! The config file is resolved from an explicit path, then the
//! [`CONFIG_ENV_VAR`] environment variable, then [`DEFAULT_CONFIG_PATH`].
//! Loading enforces path length limits, a file size ceiling, and UTF-8
//! before parsing; every section denies unknown fields, and
//! [`DropgateConfig::validate`] checks cross-field rules.
//!
//! Durations are written in whole seconds; backends are chosen by the
//! `backend`/`provider` fields so mock and real collaborators swap by
//! configuration alone.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use dropgate_core::DeliveryConfig;
use dropgate_core::DeliveryError;
use dropgate_core::MAX_CHUNK_SIZE_BYTES;
use dropgate_core::MAX_TOTAL_SIZE_BYTES;
use dropgate_core::RetryPolicy;
use dropgate_core::Span;
use dropgate_core::StorageType;
use dropgate_core::runtime::DEFAULT_CURRENCY;
use dropgate_core::runtime::normalize_currency;
use dropgate_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "DROPGATE_CONFIG";
/// Config file used when neither a path nor the env var is given.
pub const DEFAULT_CONFIG_PATH: &str = "dropgate.toml";
/// Maximum config file size in bytes.
pub const MAX_CONFIG_FILE_BYTES: u64 = 1024 * 1024;
/// Maximum total config path length.
const MAX_PATH_LENGTH: usize = 4096;
/// Maximum length of a single config path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Upper bound for any configured lifetime (one year).
const MAX_LIFETIME_SECS: u64 = 365 * 24 * 60 * 60;
/// Upper bound for retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 10;
/// Upper bound for the retry backoff unit.
const MAX_BACKOFF_MS: u64 = 10_000;
/// Request body headroom above the chunk ceiling.
const BODY_HEADROOM_BYTES: u64 = 64 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Config file is not valid TOML for the model.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Config values violate a validation rule.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// A secret environment variable is unset or malformed.
    #[error("missing secret: {0}")]
    MissingSecret(String),
}

impl From<ConfigError> for DeliveryError {
    fn from(error: ConfigError) -> Self {
        Self::Configuration(error.to_string())
    }
}

// ============================================================================
// SECTION: Root
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DropgateConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Relational store backend.
    #[serde(default)]
    pub store: StoreConfig,
    /// Blob store backend.
    #[serde(default)]
    pub blobs: BlobsConfig,
    /// Payment gateway.
    #[serde(default)]
    pub payments: PaymentsConfig,
    /// Secret environment variable names.
    #[serde(default)]
    pub secrets: SecretsConfig,
    /// Transfer and key policy.
    #[serde(default)]
    pub transfers: TransfersConfig,
    /// Upload limits.
    #[serde(default)]
    pub uploads: UploadsConfig,
    /// Transient store retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Audit sink.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Static caller identities.
    #[serde(default)]
    pub identity: IdentityConfig,
}

impl DropgateConfig {
    /// Loads and validates the config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the path is unsafe, the file cannot be
    /// read, exceeds [`MAX_CONFIG_FILE_BYTES`], is not UTF-8, fails to parse,
    /// or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var(CONFIG_ENV_VAR).ok();
        let path = resolve_config_path(path, env_path.as_deref());
        validate_config_path(&path)?;
        let file = std::fs::File::open(&path)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
        let mut bytes = Vec::new();
        file.take(MAX_CONFIG_FILE_BYTES + 1)
            .read_to_end(&mut bytes)
            .map_err(|err| ConfigError::Io(err.to_string()))?;
        if u64::try_from(bytes.len()).unwrap_or(u64::MAX) > MAX_CONFIG_FILE_BYTES {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let text = String::from_utf8(bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(&text)
    }

    /// Parses and validates config text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for rule violations.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.store.validate()?;
        self.blobs.validate()?;
        self.payments.validate()?;
        self.secrets.validate()?;
        self.transfers.validate()?;
        self.uploads.validate()?;
        self.retry.validate()?;
        self.audit.validate()?;
        self.identity.validate()?;
        if self.server.max_body_bytes < self.uploads.max_chunk_size_bytes {
            return Err(ConfigError::Invalid(
                "server.max_body_bytes must be at least uploads.max_chunk_size_bytes".to_string(),
            ));
        }
        let loopback = self.server.socket_addr()?.ip().is_loopback();
        if !loopback && self.identity.principals.is_empty() {
            return Err(ConfigError::Invalid(
                "non-loopback bind disallowed without identity principals".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the engine tunables.
    #[must_use]
    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            storage_type: self.blobs.backend.storage_type(),
            max_chunk_size_bytes: self.uploads.max_chunk_size_bytes,
            max_total_size_bytes: self.uploads.max_total_size_bytes,
            session_ttl: span_secs(self.uploads.session_ttl_secs),
            key_ttl: span_secs(self.transfers.key_ttl_secs),
            claim_token_ttl: span_secs(self.transfers.claim_token_ttl_secs),
            download_token_ttl: span_secs(self.transfers.download_token_ttl_secs),
            dispute_window: span_secs(self.transfers.dispute_window_secs),
            allow_unpaid_grant: self.transfers.allow_unpaid_grant,
            default_currency: normalize_currency(&self.transfers.default_currency)
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            public_base_url: self.server.public_base_url(),
            retry: RetryPolicy {
                max_attempts: self.retry.max_attempts,
                base_backoff_ms: self.retry.base_backoff_ms,
            },
        }
    }
}

/// Resolves the config path: explicit path, then env value, then default.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>, env_value: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(value) = env_value
        && !value.trim().is_empty()
    {
        return PathBuf::from(value);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// Rejects overlong config paths before touching the filesystem.
fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().len() > MAX_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Converts whole seconds to a span, saturating.
fn span_secs(secs: u64) -> Span {
    Span::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}

/// Rejects zero and over-long lifetimes.
fn validate_lifetime(field: &str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 || secs > MAX_LIFETIME_SECS {
        return Err(ConfigError::Invalid(format!(
            "{field} must be between 1 and {MAX_LIFETIME_SECS} seconds"
        )));
    }
    Ok(())
}

/// Rejects empty environment variable names.
fn validate_env_name(field: &str, name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && name.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_');
    if !valid {
        return Err(ConfigError::Invalid(format!(
            "{field} must be an upper-case environment variable name"
        )));
    }
    Ok(())
}

/// Parses an absolute http(s) URL.
fn parse_http_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|err| ConfigError::Invalid(format!("{field}: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid(format!("{field} must use http or https")));
    }
    Ok(url)
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Externally reachable base URL used in download links.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Request body size ceiling in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            base_url: None,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unparsable addresses.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind.parse().map_err(|_| {
            ConfigError::Invalid(format!("server.bind is not an address: {}", self.bind))
        })
    }

    /// Returns the configured base URL or one derived from the bind address.
    #[must_use]
    pub fn public_base_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| format!("http://{}", self.bind))
    }

    /// Validates server settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if let Some(base_url) = &self.base_url {
            parse_http_url("server.base_url", base_url)?;
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("server.max_body_bytes must be positive".to_string()));
        }
        Ok(())
    }
}

/// Default listen address.
fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Default body ceiling: one maximal chunk plus headroom.
const fn default_max_body_bytes() -> u64 {
    MAX_CHUNK_SIZE_BYTES + BODY_HEADROOM_BYTES
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Relational store backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process-local memory.
    #[default]
    Memory,
    /// `SQLite` database file.
    Sqlite,
}

/// Relational store settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Backend selector.
    #[serde(default)]
    pub backend: StoreBackend,
    /// `SQLite` settings, required for the sqlite backend.
    #[serde(default)]
    pub sqlite: Option<SqliteStoreConfig>,
}

impl StoreConfig {
    /// Validates store settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.backend, &self.sqlite) {
            (StoreBackend::Sqlite, None) => Err(ConfigError::Invalid(
                "store.sqlite is required for the sqlite backend".to_string(),
            )),
            (StoreBackend::Sqlite, Some(sqlite)) if sqlite.path.as_os_str().is_empty() => {
                Err(ConfigError::Invalid("store.sqlite.path must not be empty".to_string()))
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Blobs
// ============================================================================

/// Blob store backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobBackend {
    /// Process-local memory.
    #[default]
    Memory,
    /// Local directory tree.
    Filesystem,
    /// S3-compatible object storage.
    S3,
}

impl BlobBackend {
    /// Returns the storage type recorded on new products.
    #[must_use]
    pub const fn storage_type(self) -> StorageType {
        match self {
            Self::Memory => StorageType::Memory,
            Self::Filesystem => StorageType::Filesystem,
            Self::S3 => StorageType::S3,
        }
    }
}

/// S3 bucket settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3BlobConfig {
    /// Bucket name.
    pub bucket: String,
    /// Key prefix inside the bucket.
    #[serde(default)]
    pub prefix: Option<String>,
    /// AWS region override.
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint override for S3-compatible services.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Use path-style addressing.
    #[serde(default)]
    pub force_path_style: bool,
}

/// Blob store settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlobsConfig {
    /// Backend selector.
    #[serde(default)]
    pub backend: BlobBackend,
    /// Root directory for the filesystem backend.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Bucket settings for the s3 backend.
    #[serde(default)]
    pub s3: Option<S3BlobConfig>,
}

impl BlobsConfig {
    /// Validates blob settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.backend {
            BlobBackend::Memory => Ok(()),
            BlobBackend::Filesystem => match &self.root {
                Some(root) if !root.as_os_str().is_empty() => Ok(()),
                _ => Err(ConfigError::Invalid(
                    "blobs.root is required for the filesystem backend".to_string(),
                )),
            },
            BlobBackend::S3 => {
                let s3 = self.s3.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("blobs.s3 is required for the s3 backend".to_string())
                })?;
                if s3.bucket.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "blobs.s3.bucket must not be empty".to_string(),
                    ));
                }
                if let Some(endpoint) = &s3.endpoint {
                    parse_http_url("blobs.s3.endpoint", endpoint)?;
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// SECTION: Payments
// ============================================================================

/// Payment gateway providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    /// Deterministic mock checkout.
    #[default]
    Mock,
    /// HTTP checkout API.
    Http,
}

/// Payment gateway settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentsConfig {
    /// Provider selector.
    #[serde(default)]
    pub provider: PaymentProvider,
    /// Checkout API base URL (http provider) or mock checkout base.
    #[serde(default = "default_payments_base_url")]
    pub base_url: String,
    /// Request timeout in milliseconds (http provider).
    #[serde(default = "default_payments_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            provider: PaymentProvider::default(),
            base_url: default_payments_base_url(),
            timeout_ms: default_payments_timeout_ms(),
        }
    }
}

impl PaymentsConfig {
    /// Validates payment settings.
    fn validate(&self) -> Result<(), ConfigError> {
        parse_http_url("payments.base_url", &self.base_url)?;
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("payments.timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}

/// Default checkout base URL.
fn default_payments_base_url() -> String {
    "http://127.0.0.1:8080/mock-checkout".to_string()
}

/// Default payment request timeout.
const fn default_payments_timeout_ms() -> u64 {
    10_000
}

// ============================================================================
// SECTION: Secrets
// ============================================================================

/// Names of the environment variables holding secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretsConfig {
    /// Base64 Ed25519 seed for claim and download tokens.
    #[serde(default = "default_signing_seed_env")]
    pub signing_seed_env: String,
    /// Base64 key wrapping content keys in envelopes.
    #[serde(default = "default_envelope_key_env")]
    pub envelope_key_env: String,
    /// Shared secret expected on payment webhooks.
    #[serde(default = "default_webhook_secret_env")]
    pub webhook_secret_env: String,
    /// API key for the http payment provider.
    #[serde(default = "default_payment_api_key_env")]
    pub payment_api_key_env: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            signing_seed_env: default_signing_seed_env(),
            envelope_key_env: default_envelope_key_env(),
            webhook_secret_env: default_webhook_secret_env(),
            payment_api_key_env: default_payment_api_key_env(),
        }
    }
}

impl SecretsConfig {
    /// Validates secret variable names.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_env_name("secrets.signing_seed_env", &self.signing_seed_env)?;
        validate_env_name("secrets.envelope_key_env", &self.envelope_key_env)?;
        validate_env_name("secrets.webhook_secret_env", &self.webhook_secret_env)?;
        validate_env_name("secrets.payment_api_key_env", &self.payment_api_key_env)
    }
}

/// Default signing seed variable.
fn default_signing_seed_env() -> String {
    "DROPGATE_SIGNING_SEED".to_string()
}

/// Default envelope key variable.
fn default_envelope_key_env() -> String {
    "DROPGATE_ENVELOPE_KEY".to_string()
}

/// Default webhook secret variable.
fn default_webhook_secret_env() -> String {
    "DROPGATE_WEBHOOK_SECRET".to_string()
}

/// Default payment API key variable.
fn default_payment_api_key_env() -> String {
    "DROPGATE_PAYMENT_API_KEY".to_string()
}

// ============================================================================
// SECTION: Transfers
// ============================================================================

/// Transfer, key, and token policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransfersConfig {
    /// Currency used when an offer names none.
    #[serde(default = "default_currency")]
    pub default_currency: String,
    /// Permit grant from `invoiced` without payment.
    #[serde(default)]
    pub allow_unpaid_grant: bool,
    /// Key envelope lifetime.
    #[serde(default = "default_key_ttl_secs")]
    pub key_ttl_secs: u64,
    /// Claim token lifetime.
    #[serde(default = "default_claim_token_ttl_secs")]
    pub claim_token_ttl_secs: u64,
    /// Download token lifetime.
    #[serde(default = "default_download_token_ttl_secs")]
    pub download_token_ttl_secs: u64,
    /// Dispute window when a transfer policy sets no deadline.
    #[serde(default = "default_dispute_window_secs")]
    pub dispute_window_secs: u64,
}

impl Default for TransfersConfig {
    fn default() -> Self {
        Self {
            default_currency: default_currency(),
            allow_unpaid_grant: false,
            key_ttl_secs: default_key_ttl_secs(),
            claim_token_ttl_secs: default_claim_token_ttl_secs(),
            download_token_ttl_secs: default_download_token_ttl_secs(),
            dispute_window_secs: default_dispute_window_secs(),
        }
    }
}

impl TransfersConfig {
    /// Validates transfer policy.
    fn validate(&self) -> Result<(), ConfigError> {
        if normalize_currency(&self.default_currency).is_none() {
            return Err(ConfigError::Invalid(
                "transfers.default_currency must be a three-letter code".to_string(),
            ));
        }
        validate_lifetime("transfers.key_ttl_secs", self.key_ttl_secs)?;
        validate_lifetime("transfers.claim_token_ttl_secs", self.claim_token_ttl_secs)?;
        validate_lifetime("transfers.download_token_ttl_secs", self.download_token_ttl_secs)?;
        validate_lifetime("transfers.dispute_window_secs", self.dispute_window_secs)
    }
}

/// Default offer currency.
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

/// Default key lifetime (seven days).
const fn default_key_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

/// Default claim token lifetime (one day).
const fn default_claim_token_ttl_secs() -> u64 {
    24 * 60 * 60
}

/// Default download token lifetime (one hour).
const fn default_download_token_ttl_secs() -> u64 {
    60 * 60
}

/// Default dispute window (thirty days).
const fn default_dispute_window_secs() -> u64 {
    30 * 24 * 60 * 60
}

// ============================================================================
// SECTION: Uploads
// ============================================================================

/// Upload limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadsConfig {
    /// Chunk size ceiling.
    #[serde(default = "default_max_chunk_size_bytes")]
    pub max_chunk_size_bytes: u64,
    /// Total size ceiling.
    #[serde(default = "default_max_total_size_bytes")]
    pub max_total_size_bytes: u64,
    /// Upload session lifetime.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_chunk_size_bytes: default_max_chunk_size_bytes(),
            max_total_size_bytes: default_max_total_size_bytes(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl UploadsConfig {
    /// Validates upload limits against the hard ceilings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chunk_size_bytes == 0 || self.max_chunk_size_bytes > MAX_CHUNK_SIZE_BYTES {
            return Err(ConfigError::Invalid(format!(
                "uploads.max_chunk_size_bytes must be between 1 and {MAX_CHUNK_SIZE_BYTES}"
            )));
        }
        if self.max_total_size_bytes == 0 || self.max_total_size_bytes > MAX_TOTAL_SIZE_BYTES {
            return Err(ConfigError::Invalid(format!(
                "uploads.max_total_size_bytes must be between 1 and {MAX_TOTAL_SIZE_BYTES}"
            )));
        }
        validate_lifetime("uploads.session_ttl_secs", self.session_ttl_secs)
    }
}

/// Default chunk ceiling.
const fn default_max_chunk_size_bytes() -> u64 {
    MAX_CHUNK_SIZE_BYTES
}

/// Default total ceiling.
const fn default_max_total_size_bytes() -> u64 {
    MAX_TOTAL_SIZE_BYTES
}

/// Default upload session lifetime (one day).
const fn default_session_ttl_secs() -> u64 {
    24 * 60 * 60
}

// ============================================================================
// SECTION: Retry
// ============================================================================

/// Transient store retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Linear backoff unit in milliseconds.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

impl RetryConfig {
    /// Validates retry bounds.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 || self.max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(ConfigError::Invalid(format!(
                "retry.max_attempts must be between 1 and {MAX_RETRY_ATTEMPTS}"
            )));
        }
        if self.base_backoff_ms > MAX_BACKOFF_MS {
            return Err(ConfigError::Invalid(format!(
                "retry.base_backoff_ms must be at most {MAX_BACKOFF_MS}"
            )));
        }
        Ok(())
    }
}

/// Default attempt count.
fn default_max_attempts() -> u32 {
    RetryPolicy::default().max_attempts
}

/// Default backoff unit.
fn default_base_backoff_ms() -> u64 {
    RetryPolicy::default().base_backoff_ms
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard events.
    None,
}

/// Audit sink settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink selector.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Also log one event per HTTP request.
    #[serde(default)]
    pub log_requests: bool,
}

impl AuditConfig {
    /// Validates audit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.sink == AuditSinkKind::File && self.path.is_none() {
            return Err(ConfigError::Invalid(
                "audit.path is required for the file sink".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Identity
// ============================================================================

/// One static principal and the variable holding its bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrincipalConfig {
    /// Principal identifier.
    pub id: String,
    /// Environment variable holding the bearer token.
    pub token_env: String,
}

/// Static caller identities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    /// Known principals.
    #[serde(default)]
    pub principals: Vec<PrincipalConfig>,
}

impl IdentityConfig {
    /// Validates principal ids and token variables.
    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for principal in &self.principals {
            if principal.id.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "identity principal id must not be empty".to_string(),
                ));
            }
            if !seen.insert(principal.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate identity principal: {}",
                    principal.id
                )));
            }
            validate_env_name("identity.principals.token_env", &principal.token_env)?;
        }
        Ok(())
    }
}
