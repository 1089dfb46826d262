// crates/dropgate-server/tests/common/mod.rs
// =============================================================================
// Module: Server Test Helpers
// Description: Spawns a dropgate server on an ephemeral port.
// Purpose: Share config, secrets, and HTTP helpers across server tests.
// =============================================================================

//! ## Overview
//! [`spawn_server`] binds `127.0.0.1:0`, builds a config whose bind address
//! matches the listener (so download URLs point back at the test server),
//! and serves it on a background task for the lifetime of [`TestServer`].

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

use std::collections::BTreeMap;

use dropgate_config::DropgateConfig;
use dropgate_config::ResolvedSecrets;
use dropgate_server::DropgateServer;
use reqwest::Client;
use reqwest::Response;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Base64 of 32 bytes of 0x07.
pub const SEED_B64: &str = "BwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwc=";
/// Base64 of 32 bytes of 0x09.
pub const ENVELOPE_B64: &str = "CQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQk=";
/// Webhook secret shared with the payment provider.
pub const WEBHOOK_SECRET: &str = "whsec-test";
/// Seller bearer token.
pub const SELLER_TOKEN: &str = "seller-token";
/// Buyer bearer token.
pub const BUYER_TOKEN: &str = "buyer-token";
/// Bearer token of a principal party to nothing.
pub const STRANGER_TOKEN: &str = "stranger-token";

/// Running server handle.
pub struct TestServer {
    /// `http://127.0.0.1:{port}`.
    pub base_url: String,
    /// HTTP client.
    pub client: Client,
    /// Serving task.
    task: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    /// Returns an absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Sends an authenticated JSON POST.
    pub async fn post_json(&self, path: &str, token: &str, body: &Value) -> Response {
        self.client.post(self.url(path)).bearer_auth(token).json(body).send().await.unwrap()
    }

    /// Sends an authenticated GET.
    pub async fn get(&self, path: &str, token: &str) -> Response {
        self.client.get(self.url(path)).bearer_auth(token).send().await.unwrap()
    }

    /// Delivers a payment webhook with the configured secret.
    pub async fn webhook(&self, body: &Value) -> Response {
        self.client
            .post(self.url("/v1/payments/webhook"))
            .header(dropgate_server::WEBHOOK_SECRET_HEADER, WEBHOOK_SECRET)
            .json(body)
            .send()
            .await
            .unwrap()
    }
}

/// Secret environment for the test principals.
pub fn test_env() -> BTreeMap<String, String> {
    [
        ("DROPGATE_SIGNING_SEED", SEED_B64),
        ("DROPGATE_ENVELOPE_KEY", ENVELOPE_B64),
        ("DROPGATE_WEBHOOK_SECRET", WEBHOOK_SECRET),
        ("DROPGATE_PAYMENT_API_KEY", "sk-test"),
        ("TOKEN_SELLER", SELLER_TOKEN),
        ("TOKEN_BUYER", BUYER_TOKEN),
        ("TOKEN_STRANGER", STRANGER_TOKEN),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}

/// Spawns a server with the memory backends plus `extra_toml`.
pub async fn spawn_server(extra_toml: &str) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let toml = format!(
        r#"
[server]
bind = "{addr}"

[audit]
sink = "none"

[[identity.principals]]
id = "seller-1"
token_env = "TOKEN_SELLER"

[[identity.principals]]
id = "buyer-1"
token_env = "TOKEN_BUYER"

[[identity.principals]]
id = "stranger-1"
token_env = "TOKEN_STRANGER"

{extra_toml}
"#
    );
    let config = DropgateConfig::from_toml(&toml).unwrap();
    let env = test_env();
    let secrets = ResolvedSecrets::resolve(&config, |name| env.get(name).cloned()).unwrap();
    let server = DropgateServer::from_config(&config, secrets).unwrap();
    let task = tokio::spawn(async move {
        let _ = server.serve_listener(listener).await;
    });
    TestServer {
        base_url: format!("http://{addr}"),
        client: Client::new(),
        task,
    }
}

/// Reads a response body as JSON after asserting its status.
pub async fn expect_json(response: Response, status: u16) -> Value {
    let actual = response.status().as_u16();
    let body: Value = response.json().await.unwrap();
    assert_eq!(actual, status, "unexpected status, body: {body}");
    body
}

/// Deterministic content of `len` bytes.
pub fn content(len: usize) -> Vec<u8> {
    (0 .. len).map(|index| u8::try_from(index % 251).unwrap()).collect()
}
