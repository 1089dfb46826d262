// crates/dropgate-server/src/payments.rs
// ============================================================================
// Module: HTTP Payment Gateway
// Description: Checkout creation against an external payment API.
// Purpose: Provide the production payment gateway behind the engine seam.
// Dependencies: dropgate-core, reqwest, serde, tokio
// ============================================================================

//! ## Overview
//! [`HttpPaymentGateway`] posts the checkout request as JSON to
//! `{base_url}/checkout` with a bearer API key and expects
//! `{checkoutUrl, providerRef?, provider?}` back. Rate limiting, server
//! errors and network failures are reported as unavailable so the engine can
//! surface a retryable error; any other refusal is a rejection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use dropgate_core::CheckoutRequest;
use dropgate_core::CheckoutSession;
use dropgate_core::PaymentError;
use dropgate_core::PaymentGateway;
use reqwest::Client;
use reqwest::StatusCode;
use reqwest::Url;
use serde::Deserialize;
use tokio::runtime::Runtime;

use crate::blocking::block_on_with_runtime;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Provider label used when the API does not name itself.
const DEFAULT_PROVIDER: &str = "http";
/// Connect timeout ceiling.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// SECTION: Types
// ============================================================================

/// Checkout API response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutResponse {
    /// URL the buyer follows to pay.
    checkout_url: String,
    /// Provider reference for the session.
    #[serde(default)]
    provider_ref: Option<String>,
    /// Provider label.
    #[serde(default)]
    provider: Option<String>,
}

/// Payment gateway calling an external checkout API.
pub struct HttpPaymentGateway {
    /// Checkout endpoint.
    endpoint: Url,
    /// Bearer API key.
    api_key: String,
    /// HTTP client configured with timeouts.
    client: Client,
    /// Runtime driving requests outside an ambient runtime.
    runtime: Option<Arc<Runtime>>,
}

impl Drop for HttpPaymentGateway {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            let _ = std::thread::spawn(move || drop(runtime));
        }
    }
}

impl HttpPaymentGateway {
    /// Builds a gateway for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Rejected`] when the URL is invalid and
    /// [`PaymentError::Unavailable`] when the client cannot be built.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PaymentError> {
        let endpoint = Url::parse(&format!("{}/checkout", base_url.trim_end_matches('/')))
            .map_err(|err| PaymentError::Rejected(format!("invalid payments base_url: {err}")))?;
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()
            .map_err(|err| PaymentError::Unavailable(err.to_string()))?;
        let runtime = Runtime::new().map_err(|err| PaymentError::Unavailable(err.to_string()))?;
        Ok(Self {
            endpoint,
            api_key: api_key.into(),
            client,
            runtime: Some(Arc::new(runtime)),
        })
    }

    /// Returns the runtime or an error if shut down.
    fn runtime(&self) -> Result<&Runtime, PaymentError> {
        self.runtime
            .as_ref()
            .map(AsRef::as_ref)
            .ok_or_else(|| PaymentError::Unavailable("payment runtime closed".to_string()))
    }
}

impl PaymentGateway for HttpPaymentGateway {
    fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, PaymentError> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let api_key = self.api_key.clone();
        let request = request.clone();
        block_on_with_runtime(self.runtime()?, async move {
            let response = client
                .post(endpoint)
                .bearer_auth(api_key)
                .json(&request)
                .send()
                .await
                .map_err(|err| {
                    PaymentError::Unavailable(format!("checkout request failed: {err}"))
                })?;
            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                return Err(PaymentError::Unavailable(format!("checkout api status {status}")));
            }
            if !status.is_success() {
                return Err(PaymentError::Rejected(format!("checkout api status {status}")));
            }
            let body: CheckoutResponse = response
                .json()
                .await
                .map_err(|err| {
                    PaymentError::Rejected(format!("invalid checkout response: {err}"))
                })?;
            Url::parse(&body.checkout_url)
                .map_err(|err| PaymentError::Rejected(format!("invalid checkout url: {err}")))?;
            Ok(CheckoutSession {
                provider: body.provider.unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
                provider_ref: body.provider_ref,
                checkout_url: body.checkout_url,
            })
        })
        .map_err(PaymentError::Unavailable)?
    }
}
