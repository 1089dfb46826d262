// crates/dropgate-server/src/routes.rs
// ============================================================================
// Module: HTTP Routes
// Description: `/v1` JSON API over the delivery engine.
// Purpose: Authenticate callers, decode requests, and call the engine.
// Dependencies: axum, dropgate-core, serde, serde_json, tokio
// ============================================================================

//! ## Overview
//! Every handler resolves the caller, decodes its input, and calls the engine
//! through [`run_blocking`]. Inputs are untrusted: bodies are decoded from
//! raw bytes so malformed JSON, paths, and queries all surface as
//! `invalid_input` errors with the standard error body. Download endpoints
//! accept either a bearer credential or a signed download token.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::MatchedPath;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::Request;
use axum::extract::State;
use axum::extract::rejection::PathRejection;
use axum::extract::rejection::QueryRejection;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::header::CONTENT_TYPE;
use axum::middleware;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use dropgate_core::AcknowledgeRequest;
use dropgate_core::ChunkReceipt;
use dropgate_core::ClaimResult;
use dropgate_core::DeliveryEngine;
use dropgate_core::DeliveryStore;
use dropgate_core::DisputeId;
use dropgate_core::DisputeRequest;
use dropgate_core::DownloadCredentials;
use dropgate_core::HashDigest;
use dropgate_core::KeyEnvelope;
use dropgate_core::KeyId;
use dropgate_core::Manifest;
use dropgate_core::NewProduct;
use dropgate_core::OfferRequest;
use dropgate_core::PaymentWebhook;
use dropgate_core::PrincipalId;
use dropgate_core::Product;
use dropgate_core::ProductId;
use dropgate_core::ReceiptId;
use dropgate_core::RequiredInput;
use dropgate_core::RevokeRequest;
use dropgate_core::Timestamp;
use dropgate_core::TransferId;
use dropgate_core::TransferRef;
use dropgate_core::TransferView;
use dropgate_core::UploadId;
use dropgate_core::UploadStatus;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Map;
use serde_json::Value;

use crate::audit::HttpAuditEvent;
use crate::audit::HttpAuditEventParams;
use crate::audit::ServerAuditSink;
use crate::auth::BearerAuthenticator;
use crate::auth::Caller;
use crate::auth::WEBHOOK_SECRET_HEADER;
use crate::auth::webhook_secret_matches;
use crate::blocking::run_blocking;
use crate::error::ApiError;
use crate::error::ErrorLabel;

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared state for request handlers.
pub struct AppState {
    /// Delivery engine.
    pub engine: DeliveryEngine,
    /// Bearer-token authenticator.
    pub auth: BearerAuthenticator,
    /// Expected payment webhook secret.
    pub webhook_secret: String,
    /// Audit sink for request events.
    pub audit: Arc<dyn ServerAuditSink>,
    /// Emit one audit event per request.
    pub log_requests: bool,
}

/// Builds the `/v1` router.
pub fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/uploads", post(start_upload))
        .route("/v1/uploads/{upload_id}", get(upload_status))
        .route("/v1/uploads/{upload_id}/chunks/{index}", put(upload_chunk))
        .route("/v1/uploads/{upload_id}/complete", post(complete_upload))
        .route("/v1/products/{product_id}", get(get_product))
        .route("/v1/products/{product_id}/requirements", post(set_requirements))
        .route("/v1/offer", post(offer))
        .route("/v1/invoice", post(invoice))
        .route("/v1/payments/webhook", post(payment_webhook))
        .route("/v1/requirements/submit", post(submit_requirements))
        .route("/v1/grant", post(grant))
        .route("/v1/claim", get(claim))
        .route("/v1/manifest", get(manifest))
        .route("/v1/chunk", get(chunk))
        .route("/v1/ack", post(acknowledge))
        .route("/v1/dispute", post(dispute))
        .route("/v1/revoke", post(revoke))
        .route("/v1/transfers/{transfer_id}", get(get_transfer))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), log_request))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

// ============================================================================
// SECTION: Request Bodies
// ============================================================================

/// Upload start request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct StartUploadBody {
    /// Display title.
    title: String,
    /// MIME content type.
    content_type: String,
    /// Declared total size.
    total_size: u64,
    /// Chunk size.
    chunk_size: u64,
    /// Declared whole-content digest.
    #[serde(default)]
    content_hash: Option<HashDigest>,
    /// Requested encryption algorithm.
    #[serde(default)]
    encryption_algorithm: Option<String>,
}

/// Upload completion request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CompleteUploadBody {
    /// Client-computed manifest to check against the stored chunks.
    #[serde(default)]
    manifest: Option<Manifest>,
}

/// Requirement declaration request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RequirementsBody {
    /// Buyer inputs the product needs.
    required_inputs: Vec<RequiredInput>,
}

/// Invoice request addressed by transfer id or by product and recipient.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct InvoiceBody {
    /// Transfer to invoice.
    #[serde(default)]
    transfer_id: Option<TransferId>,
    /// Product, with `recipient_id`, when no transfer id is given.
    #[serde(default)]
    product_id: Option<ProductId>,
    /// Recipient, with `product_id`, when no transfer id is given.
    #[serde(default)]
    recipient_id: Option<PrincipalId>,
    /// Buyer inputs merged before the pre-payment check.
    #[serde(default)]
    buyer_inputs: Option<Map<String, Value>>,
}

/// Request naming a transfer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TransferBody {
    /// Transfer identifier.
    transfer_id: TransferId,
}

/// Buyer input submission.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SubmitRequirementsBody {
    /// Transfer identifier.
    transfer_id: TransferId,
    /// Input values.
    buyer_inputs: Map<String, Value>,
}

/// Claim query.
#[derive(Debug, Deserialize)]
struct ClaimQuery {
    /// Claim token.
    claim: String,
}

/// Manifest query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestQuery {
    /// Product to read.
    product_id: ProductId,
    /// Recipient named by the request.
    #[serde(default)]
    recipient_id: Option<PrincipalId>,
    /// Download token.
    #[serde(default)]
    token: Option<String>,
}

/// Chunk query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkQuery {
    /// Product to read.
    product_id: ProductId,
    /// Recipient named by the request.
    #[serde(default)]
    recipient_id: Option<PrincipalId>,
    /// Zero-based chunk index.
    chunk_index: u32,
    /// Download token.
    #[serde(default)]
    token: Option<String>,
}

// ============================================================================
// SECTION: Response Bodies
// ============================================================================

/// Health response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    /// `ok` or `unavailable`.
    status: &'static str,
}

/// Upload start response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartUploadResponse {
    /// Created product.
    product_id: ProductId,
    /// Upload session.
    upload_id: UploadId,
    /// Chunks required.
    expected_chunks: u32,
    /// Chunk size.
    chunk_size: u64,
    /// Session expiry.
    expires_at: Timestamp,
}

/// Upload completion response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteUploadResponse {
    /// Finalized product.
    product_id: ProductId,
    /// Finalized manifest.
    manifest: Manifest,
}

/// Offer response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OfferResponse {
    /// Transfer identifier.
    transfer_id: TransferId,
    /// Transfer status.
    status: &'static str,
    /// True when an active transfer was returned.
    reused: bool,
}

/// Invoice response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceResponse {
    /// Transfer identifier.
    transfer_id: TransferId,
    /// Checkout URL.
    checkout_url: String,
    /// Amount in minor units.
    amount: u64,
    /// Currency code.
    currency: String,
    /// Transfer status.
    status: &'static str,
}

/// Transfer status response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    /// Transfer identifier.
    transfer_id: TransferId,
    /// Transfer status.
    status: &'static str,
}

/// Webhook response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookResponse {
    /// Transfer identifier.
    transfer_id: TransferId,
    /// Transfer status after handling.
    status: &'static str,
    /// False when the event was ignored.
    handled: bool,
}

/// Requirement submission response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequirementsResponse {
    /// Transfer identifier.
    transfer_id: TransferId,
    /// Merged buyer inputs.
    buyer_inputs: Map<String, Value>,
}

/// Grant response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GrantResponse {
    /// Transfer identifier.
    transfer_id: TransferId,
    /// Key identifier.
    key_id: KeyId,
    /// Recipient's key envelope.
    key_envelope: KeyEnvelope,
    /// True when an existing live key was reused.
    key_reused: bool,
    /// Claim token.
    claim_token: String,
    /// Key expiry.
    expires_at: Timestamp,
    /// Claim token expiry.
    claim_expires_at: Timestamp,
    /// Transfer status.
    status: &'static str,
}

/// Acknowledgment response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcknowledgeResponse {
    /// Receipt identifier.
    receipt_id: ReceiptId,
    /// Transfer status.
    status: &'static str,
}

/// Dispute response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DisputeResponse {
    /// Dispute identifier.
    dispute_id: DisputeId,
    /// Transfer status.
    status: &'static str,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Reports store readiness.
async fn health(State(state): State<Arc<AppState>>) -> Response {
    match run_blocking(|| state.engine.context().store().readiness()) {
        Ok(()) => Json(HealthResponse {
            status: "ok",
        })
        .into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unavailable",
            }),
        )
            .into_response(),
    }
}

/// Creates a product and opens its upload session.
async fn start_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StartUploadResponse>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let body: StartUploadBody = parse_json(&body)?;
    let request = NewProduct {
        title: body.title,
        content_type: body.content_type,
        size_bytes: body.total_size,
        content_hash: body.content_hash,
        encryption_algorithm: body.encryption_algorithm,
    };
    let started = run_blocking(|| {
        state.engine.start_upload(&caller.principal, request, body.chunk_size)
    })?;
    Ok(Json(StartUploadResponse {
        product_id: started.product.id,
        upload_id: started.session.upload_id,
        expected_chunks: started.session.expected_chunks,
        chunk_size: started.session.chunk_size,
        expires_at: started.session.expires_at,
    }))
}

/// Stores one chunk.
async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<Path<(UploadId, u32)>, PathRejection>,
    body: Bytes,
) -> Result<Json<ChunkReceipt>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let Path((upload_id, index)) = path.map_err(|err| ApiError::invalid(err.body_text()))?;
    let receipt = run_blocking(|| {
        state.engine.uploads().upload_chunk(&caller.principal, &upload_id, index, &body)
    })?;
    Ok(Json(receipt))
}

/// Reports received and missing chunks.
async fn upload_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<Path<UploadId>, PathRejection>,
) -> Result<Json<UploadStatus>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let Path(upload_id) = path.map_err(|err| ApiError::invalid(err.body_text()))?;
    let status =
        run_blocking(|| state.engine.uploads().upload_status(&caller.principal, &upload_id))?;
    Ok(Json(status))
}

/// Finalizes an upload.
async fn complete_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<Path<UploadId>, PathRejection>,
    body: Bytes,
) -> Result<Json<CompleteUploadResponse>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let Path(upload_id) = path.map_err(|err| ApiError::invalid(err.body_text()))?;
    let body: CompleteUploadBody =
        if body.is_empty() { CompleteUploadBody::default() } else { parse_json(&body)? };
    let completed = run_blocking(|| {
        let entries = body.manifest.as_ref().map(|manifest| manifest.entries.as_slice());
        state.engine.uploads().complete_upload(&caller.principal, &upload_id, entries)
    })?;
    Ok(Json(CompleteUploadResponse {
        product_id: completed.product.id,
        manifest: completed.manifest,
    }))
}

/// Returns product metadata.
async fn get_product(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<Path<ProductId>, PathRejection>,
) -> Result<Json<Product>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let Path(product_id) = path.map_err(|err| ApiError::invalid(err.body_text()))?;
    let product =
        run_blocking(|| state.engine.registry().get_product(&product_id, &caller.principal))?;
    Ok(Json(product))
}

/// Replaces a product's buyer-input declarations.
async fn set_requirements(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<Path<ProductId>, PathRejection>,
    body: Bytes,
) -> Result<Json<Product>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let Path(product_id) = path.map_err(|err| ApiError::invalid(err.body_text()))?;
    let body: RequirementsBody = parse_json(&body)?;
    let product = run_blocking(|| {
        state.engine.registry().set_requirements(
            &product_id,
            &caller.principal,
            body.required_inputs,
        )
    })?;
    Ok(Json(product))
}

/// Offers a product to a recipient.
async fn offer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<OfferResponse>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let request: OfferRequest = parse_json(&body)?;
    let result = run_blocking(|| state.engine.transfers().offer(&caller.principal, request))?;
    Ok(Json(OfferResponse {
        transfer_id: result.transfer.id,
        status: result.transfer.status.as_str(),
        reused: result.reused,
    }))
}

/// Creates (or returns) the payment intent for a transfer.
async fn invoice(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let body: InvoiceBody = parse_json(&body)?;
    let target = match (body.transfer_id, body.product_id, body.recipient_id) {
        (Some(transfer_id), None, None) => TransferRef::Id(transfer_id),
        (None, Some(product_id), Some(recipient_id)) => TransferRef::Pair {
            product_id,
            recipient_id,
        },
        _ => {
            return Err(ApiError::invalid(
                "invoice requires transferId or productId with recipientId",
            ));
        }
    };
    let result = run_blocking(|| {
        state.engine.transfers().invoice(&caller.principal, &target, body.buyer_inputs)
    })?;
    Ok(Json(InvoiceResponse {
        transfer_id: result.transfer.id,
        checkout_url: result.intent.checkout_url,
        amount: result.intent.amount,
        currency: result.intent.currency,
        status: result.transfer.status.as_str(),
    }))
}

/// Applies a payment gateway event.
async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let presented = headers.get(WEBHOOK_SECRET_HEADER).and_then(|value| value.to_str().ok());
    if !webhook_secret_matches(&state.webhook_secret, presented) {
        return Err(ApiError::Unauthenticated("invalid webhook secret".to_string()));
    }
    let webhook: PaymentWebhook = parse_json(&body)?;
    let outcome = run_blocking(|| state.engine.transfers().handle_payment_webhook(&webhook))?;
    Ok(Json(WebhookResponse {
        transfer_id: outcome.transfer_id,
        status: outcome.status.as_str(),
        handled: outcome.handled,
    }))
}

/// Merges buyer inputs into a transfer.
async fn submit_requirements(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SubmitRequirementsResponse>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let body: SubmitRequirementsBody = parse_json(&body)?;
    let transfer = run_blocking(|| {
        state.engine.transfers().submit_requirements(
            &caller.principal,
            &body.transfer_id,
            body.buyer_inputs,
        )
    })?;
    Ok(Json(SubmitRequirementsResponse {
        transfer_id: transfer.id,
        buyer_inputs: transfer.buyer_inputs,
    }))
}

/// Grants access and issues a claim token.
async fn grant(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<GrantResponse>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let body: TransferBody = parse_json(&body)?;
    let result =
        run_blocking(|| state.engine.keys().grant(&caller.principal, &body.transfer_id))?;
    Ok(Json(GrantResponse {
        transfer_id: result.transfer.id,
        key_id: result.key.id,
        key_envelope: result.key.key_envelope,
        key_reused: result.key_reused,
        claim_token: result.claim_token,
        expires_at: result.key.expires_at,
        claim_expires_at: result.claim_expires_at,
        status: result.transfer.status.as_str(),
    }))
}

/// Redeems a claim token. The token is the credential.
async fn claim(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ClaimQuery>, QueryRejection>,
) -> Result<Json<ClaimResult>, ApiError> {
    let Query(query) = query.map_err(|err| ApiError::invalid(err.body_text()))?;
    let result = run_blocking(|| state.engine.keys().claim(&query.claim))?;
    Ok(Json(result))
}

/// Returns a product manifest to an authorized requester.
async fn manifest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<ManifestQuery>, QueryRejection>,
) -> Result<Json<Manifest>, ApiError> {
    let Query(query) = query.map_err(|err| ApiError::invalid(err.body_text()))?;
    let credentials = download_credentials(&state, &headers, query.recipient_id, query.token)?;
    let manifest =
        run_blocking(|| state.engine.gate().get_manifest(&query.product_id, &credentials))?;
    Ok(Json(manifest))
}

/// Returns one chunk to an authorized requester.
async fn chunk(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<ChunkQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|err| ApiError::invalid(err.body_text()))?;
    let credentials = download_credentials(&state, &headers, query.recipient_id, query.token)?;
    let bytes = run_blocking(|| {
        state.engine.gate().download_chunk(&query.product_id, query.chunk_index, &credentials)
    })?;
    Ok(([(CONTENT_TYPE, "application/octet-stream")], bytes).into_response())
}

/// Records a delivery receipt.
async fn acknowledge(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AcknowledgeResponse>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let request: AcknowledgeRequest = parse_json(&body)?;
    let receipt =
        run_blocking(|| state.engine.transfers().acknowledge(&caller.principal, request))?;
    Ok(Json(AcknowledgeResponse {
        receipt_id: receipt.id,
        status: "acknowledged",
    }))
}

/// Opens a dispute.
async fn dispute(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DisputeResponse>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let request: DisputeRequest = parse_json(&body)?;
    let record = run_blocking(|| state.engine.transfers().dispute(&caller.principal, request))?;
    Ok(Json(DisputeResponse {
        dispute_id: record.dispute_id,
        status: "disputed",
    }))
}

/// Revokes access.
async fn revoke(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let request: RevokeRequest = parse_json(&body)?;
    let transfer = run_blocking(|| state.engine.transfers().revoke(&caller.principal, request))?;
    Ok(Json(StatusResponse {
        transfer_id: transfer.id,
        status: transfer.status.as_str(),
    }))
}

/// Returns a transfer with its payment and receipt.
async fn get_transfer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    path: Result<Path<TransferId>, PathRejection>,
) -> Result<Json<TransferView>, ApiError> {
    let caller = authenticate(&state, &headers)?;
    let Path(transfer_id) = path.map_err(|err| ApiError::invalid(err.body_text()))?;
    let view =
        run_blocking(|| state.engine.transfers().get_transfer(&caller.principal, &transfer_id))?;
    Ok(Json(view))
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Records one audit event per request when enabled.
async fn log_request(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    if !state.log_requests {
        return next.run(request).await;
    }
    let method = request.method().to_string();
    let route = request.extensions().get::<MatchedPath>().map_or_else(
        || request.uri().path().to_string(),
        |matched| matched.as_str().to_string(),
    );
    let caller = state.auth.authenticate(authorization(request.headers())).ok();
    let started = Instant::now();
    let response = next.run(request).await;
    let error_kind = response.extensions().get::<ErrorLabel>().map(|label| label.0);
    state.audit.record_request(&HttpAuditEvent::new(HttpAuditEventParams {
        method,
        route,
        status: response.status().as_u16(),
        error_kind,
        latency_ms: started.elapsed().as_millis(),
        caller: caller.as_ref().map(|caller| caller.principal.to_string()),
        token_fingerprint: caller.map(|caller| caller.token_fingerprint),
    }));
    response
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the authorization header value.
fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok())
}

/// Resolves a required bearer caller.
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Caller, ApiError> {
    state
        .auth
        .authenticate(authorization(headers))
        .map_err(|err| ApiError::Unauthenticated(err.to_string()))
}

/// Builds download credentials from an optional bearer and query values.
fn download_credentials(
    state: &AppState,
    headers: &HeaderMap,
    recipient_id: Option<PrincipalId>,
    token: Option<String>,
) -> Result<DownloadCredentials, ApiError> {
    let caller = state
        .auth
        .authenticate_optional(authorization(headers))
        .map_err(|err| ApiError::Unauthenticated(err.to_string()))?;
    Ok(DownloadCredentials {
        caller: caller.map(|caller| caller.principal),
        recipient_id,
        token: token.filter(|token| !token.is_empty()),
    })
}

/// Decodes a JSON request body.
fn parse_json<T: DeserializeOwned>(bytes: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(bytes)
        .map_err(|err| ApiError::invalid(format!("invalid json body: {err}")))
}
