// crates/dropgate-server/tests/http_errors.rs
// =============================================================================
// Module: HTTP Error Tests
// Description: Authentication and input failures on the `/v1` API.
// Purpose: Pin status codes and error bodies for rejected requests.
// =============================================================================

//! ## Overview
//! Requests without credentials, with a forged webhook secret, or with
//! malformed inputs must be rejected with the standard error body and must
//! not reach the engine.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use common::SELLER_TOKEN;
use common::expect_json;
use common::spawn_server;
use serde_json::json;

#[tokio::test(flavor = "multi_thread")]
async fn missing_bearer_is_unauthenticated() {
    let server = spawn_server("").await;
    let response = server
        .client
        .post(server.url("/v1/uploads"))
        .json(&json!({
            "title": "t",
            "contentType": "text/plain",
            "totalSize": 10,
            "chunkSize": 10,
        }))
        .send()
        .await
        .unwrap();
    let body = expect_json(response, 401).await;
    assert_eq!(body["kind"], json!("unauthenticated"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_bearer_is_unauthenticated() {
    let server = spawn_server("").await;
    let body = expect_json(server.get("/v1/transfers/tr-1", "not-a-token").await, 401).await;
    assert_eq!(body["kind"], json!("unauthenticated"));
}

#[tokio::test(flavor = "multi_thread")]
async fn forged_webhook_secret_is_rejected() {
    let server = spawn_server("").await;
    let payload = json!({ "eventType": "payment.succeeded", "transferId": "tr-1" });
    let forged = server
        .client
        .post(server.url("/v1/payments/webhook"))
        .header(dropgate_server::WEBHOOK_SECRET_HEADER, "whsec-wrong")
        .json(&payload)
        .send()
        .await
        .unwrap();
    expect_json(forged, 401).await;
    let missing =
        server.client.post(server.url("/v1/payments/webhook")).json(&payload).send().await.unwrap();
    expect_json(missing, 401).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_bodies_are_invalid_input() {
    let server = spawn_server("").await;
    let response = server
        .client
        .post(server.url("/v1/offer"))
        .bearer_auth(SELLER_TOKEN)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    let body = expect_json(response, 400).await;
    assert_eq!(body["kind"], json!("invalid_input"));
    assert_eq!(body["status_class"], json!("fix_request"));

    let unknown_field = server
        .post_json(
            "/v1/uploads",
            SELLER_TOKEN,
            &json!({
                "title": "t",
                "contentType": "text/plain",
                "totalSize": 10,
                "chunkSize": 10,
                "owner": "someone-else",
            }),
        )
        .await;
    expect_json(unknown_field, 400).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn invoice_requires_a_transfer_reference() {
    let server = spawn_server("").await;
    let body = expect_json(
        server.post_json("/v1/invoice", SELLER_TOKEN, &json!({ "productId": "p-1" })).await,
        400,
    )
    .await;
    assert_eq!(body["kind"], json!("invalid_input"));
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_chunk_size_is_rejected() {
    let server = spawn_server("").await;
    let body = expect_json(
        server
            .post_json(
                "/v1/uploads",
                SELLER_TOKEN,
                &json!({
                    "title": "big",
                    "contentType": "application/octet-stream",
                    "totalSize": 100_000_000,
                    "chunkSize": 64 * 1024 * 1024,
                }),
            )
            .await,
        400,
    )
    .await;
    assert_eq!(body["kind"], json!("invalid_input"));
}

#[tokio::test(flavor = "multi_thread")]
async fn claim_with_garbage_token_is_denied() {
    let server = spawn_server("").await;
    let response =
        server.client.get(server.url("/v1/claim?claim=garbage")).send().await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test(flavor = "multi_thread")]
async fn health_reports_ok_without_credentials() {
    let server = spawn_server("").await;
    let response = server.client.get(server.url("/v1/health")).send().await.unwrap();
    let body = expect_json(response, 200).await;
    assert_eq!(body["status"], json!("ok"));
}
