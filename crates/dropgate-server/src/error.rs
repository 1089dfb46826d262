// crates/dropgate-server/src/error.rs
// ============================================================================
// Module: Server Errors
// Description: Startup errors and the HTTP error body.
// Purpose: Map delivery errors onto stable status codes and JSON bodies.
// Dependencies: axum, dropgate-core, serde, thiserror
// ============================================================================

//! ## Overview
//! [`ApiError`] is the single error type returned by request handlers. It
//! renders `{kind, status_class, message, missing_inputs?}` with the HTTP
//! status derived from the delivery error kind, and tags the response with
//! the kind so request logging can report it without parsing the body.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use dropgate_core::DeliveryError;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Server Errors
// ============================================================================

/// Server startup and transport errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Backend initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Listener or transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: API Errors
// ============================================================================

/// Label recorded for requests rejected before reaching the engine.
pub const UNAUTHENTICATED_KIND: &str = "unauthenticated";

/// Error kind label attached to error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorLabel(pub &'static str);

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Stable error kind.
    kind: &'static str,
    /// Caller guidance.
    status_class: &'static str,
    /// Human-readable message.
    message: String,
    /// Missing buyer inputs when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    missing_inputs: Option<Vec<String>>,
}

/// Handler error.
#[derive(Debug)]
pub enum ApiError {
    /// Engine error.
    Delivery(DeliveryError),
    /// Missing or invalid caller credentials.
    Unauthenticated(String),
}

impl ApiError {
    /// Builds an invalid-input error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Delivery(DeliveryError::InvalidInput(message.into()))
    }
}

impl From<DeliveryError> for ApiError {
    fn from(error: DeliveryError) -> Self {
        Self::Delivery(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, label, body) = match self {
            Self::Delivery(error) => {
                let kind = error.kind();
                let status = StatusCode::from_u16(kind.http_status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                let body = ErrorBody {
                    kind: kind.as_str(),
                    status_class: kind.status_class().as_str(),
                    message: error.to_string(),
                    missing_inputs: error.missing_inputs().map(<[String]>::to_vec),
                };
                (status, kind.as_str(), body)
            }
            Self::Unauthenticated(message) => (
                StatusCode::UNAUTHORIZED,
                UNAUTHENTICATED_KIND,
                ErrorBody {
                    kind: UNAUTHENTICATED_KIND,
                    status_class: "fix_request",
                    message,
                    missing_inputs: None,
                },
            ),
        };
        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(ErrorLabel(label));
        response
    }
}
