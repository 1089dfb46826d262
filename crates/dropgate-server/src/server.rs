// crates/dropgate-server/src/server.rs
// ============================================================================
// Module: Dropgate Server
// Description: Backend wiring and the HTTP listener.
// Purpose: Build the delivery engine from configuration and serve `/v1`.
// Dependencies: axum, dropgate-config, dropgate-core, dropgate-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! [`DropgateServer::from_config`] validates configuration, then builds the
//! relational store, blob store, payment gateway and audit sink the
//! configuration selects, and wraps them in a [`DeliveryEngine`]. Secrets are
//! passed in already resolved so nothing here reads the environment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use dropgate_config::AuditSinkKind;
use dropgate_config::BlobBackend;
use dropgate_config::DropgateConfig;
use dropgate_config::PaymentProvider;
use dropgate_config::ResolvedSecrets;
use dropgate_config::StoreBackend;
use dropgate_core::DeliveryEngine;
use dropgate_core::DeliveryServices;
use dropgate_core::EnvelopeSealer;
use dropgate_core::InMemoryBlobStore;
use dropgate_core::InMemoryDeliveryStore;
use dropgate_core::MockPaymentGateway;
use dropgate_core::NoopAuditSink;
use dropgate_core::NoopNotifier;
use dropgate_core::PaymentGateway;
use dropgate_core::SharedBlobStore;
use dropgate_core::SharedDeliveryStore;
use dropgate_core::SystemClock;
use dropgate_core::TokenSigner;
use dropgate_store_sqlite::SqliteDeliveryStore;
use tokio::net::TcpListener;

use crate::audit::FileAuditSink;
use crate::audit::ServerAuditSink;
use crate::audit::StderrAuditSink;
use crate::auth::BearerAuthenticator;
use crate::blob_fs::FilesystemBlobStore;
use crate::blob_s3::S3BlobStore;
use crate::error::ServerError;
use crate::payments::HttpPaymentGateway;
use crate::routes::AppState;
use crate::routes::router;

// ============================================================================
// SECTION: Server
// ============================================================================

/// Dropgate HTTP server.
pub struct DropgateServer {
    /// Listen address.
    bind: SocketAddr,
    /// Request body ceiling.
    max_body_bytes: usize,
    /// Handler state.
    state: Arc<AppState>,
}

impl DropgateServer {
    /// Builds a server from configuration and resolved secrets.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] for invalid configuration and
    /// [`ServerError::Init`] when a backend cannot be initialized.
    pub fn from_config(
        config: &DropgateConfig,
        secrets: ResolvedSecrets,
    ) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let bind = config.server.socket_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let auth = BearerAuthenticator::new(secrets.principals);
        let audit = build_audit_sink(config)?;
        let services = DeliveryServices {
            store: build_delivery_store(config)?,
            blobs: build_blob_store(config)?,
            clock: Arc::new(SystemClock),
            audit: audit.clone(),
            notifier: Arc::new(NoopNotifier),
            directory: Arc::new(auth.directory()),
            payments: build_payment_gateway(config, secrets.payment_api_key.as_deref())?,
        };
        let sealer = EnvelopeSealer::new(&secrets.envelope_key)
            .map_err(|err| ServerError::Init(err.to_string()))?;
        let engine = DeliveryEngine::new(
            services,
            config.delivery_config(),
            TokenSigner::from_seed(&secrets.signing_seed),
            sealer,
        )
        .map_err(|err| ServerError::Config(err.to_string()))?;
        let state = Arc::new(AppState {
            engine,
            auth,
            webhook_secret: secrets.webhook_secret,
            audit,
            log_requests: config.audit.log_requests,
        });
        Ok(Self {
            bind,
            max_body_bytes: usize::try_from(config.server.max_body_bytes).unwrap_or(usize::MAX),
            state,
        })
    }

    /// Returns the configured listen address.
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        self.bind
    }

    /// Returns the `/v1` router.
    #[must_use]
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.state), self.max_body_bytes)
    }

    /// Binds the configured address and serves until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.bind)
            .await
            .map_err(|err| ServerError::Transport(format!("http bind failed: {err}")))?;
        self.serve_listener(listener).await
    }

    /// Serves on an already-bound listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when serving fails.
    pub async fn serve_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        let app = self.router();
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|err| ServerError::Transport(format!("http server failed: {err}")))
    }
}

// ============================================================================
// SECTION: Backend Builders
// ============================================================================

/// Builds the relational store.
fn build_delivery_store(config: &DropgateConfig) -> Result<SharedDeliveryStore, ServerError> {
    match config.store.backend {
        StoreBackend::Memory => Ok(SharedDeliveryStore::from_store(InMemoryDeliveryStore::new())),
        StoreBackend::Sqlite => {
            let sqlite = config.store.sqlite.clone().ok_or_else(|| {
                ServerError::Config("store.sqlite is required for the sqlite backend".to_string())
            })?;
            let store = SqliteDeliveryStore::new(sqlite)
                .map_err(|err| ServerError::Init(err.to_string()))?;
            Ok(SharedDeliveryStore::from_store(store))
        }
    }
}

/// Builds the blob store.
fn build_blob_store(config: &DropgateConfig) -> Result<SharedBlobStore, ServerError> {
    match config.blobs.backend {
        BlobBackend::Memory => Ok(SharedBlobStore::from_store(InMemoryBlobStore::new())),
        BlobBackend::Filesystem => {
            let root = config.blobs.root.as_deref().ok_or_else(|| {
                ServerError::Config("blobs.root is required for the filesystem backend".to_string())
            })?;
            let store =
                FilesystemBlobStore::open(root).map_err(|err| ServerError::Init(err.to_string()))?;
            Ok(SharedBlobStore::from_store(store))
        }
        BlobBackend::S3 => {
            let s3 = config.blobs.s3.as_ref().ok_or_else(|| {
                ServerError::Config("blobs.s3 is required for the s3 backend".to_string())
            })?;
            let store = S3BlobStore::new(s3).map_err(|err| ServerError::Init(err.to_string()))?;
            Ok(SharedBlobStore::from_store(store))
        }
    }
}

/// Builds the payment gateway.
fn build_payment_gateway(
    config: &DropgateConfig,
    api_key: Option<&str>,
) -> Result<Arc<dyn PaymentGateway + Send + Sync>, ServerError> {
    match config.payments.provider {
        PaymentProvider::Mock => Ok(Arc::new(MockPaymentGateway::new(&config.payments.base_url))),
        PaymentProvider::Http => {
            let api_key = api_key.ok_or_else(|| {
                ServerError::Config("http payment provider requires an api key".to_string())
            })?;
            let gateway = HttpPaymentGateway::new(
                &config.payments.base_url,
                api_key,
                Duration::from_millis(config.payments.timeout_ms),
            )
            .map_err(|err| ServerError::Init(err.to_string()))?;
            Ok(Arc::new(gateway))
        }
    }
}

/// Builds the audit sink.
fn build_audit_sink(config: &DropgateConfig) -> Result<Arc<dyn ServerAuditSink>, ServerError> {
    match config.audit.sink {
        AuditSinkKind::Stderr => Ok(Arc::new(StderrAuditSink)),
        AuditSinkKind::None => Ok(Arc::new(NoopAuditSink)),
        AuditSinkKind::File => {
            let path = config.audit.path.as_deref().ok_or_else(|| {
                ServerError::Config("audit.path is required for the file sink".to_string())
            })?;
            let sink = FileAuditSink::new(path).map_err(|err| {
                ServerError::Init(format!("unable to open audit log {}: {err}", path.display()))
            })?;
            Ok(Arc::new(sink))
        }
    }
}
