// crates/dropgate-server/tests/http_lifecycle.rs
// =============================================================================
// Module: HTTP Lifecycle Tests
// Description: End-to-end delivery over the `/v1` API.
// Purpose: Drive upload, sale, grant, claim, download, and revocation.
// =============================================================================

//! ## Overview
//! Runs a complete seller to buyer delivery against a live server with the
//! memory backends and the mock payment gateway, then repeats the upload path
//! with the `SQLite` store and filesystem blobs.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use common::BUYER_TOKEN;
use common::SELLER_TOKEN;
use common::STRANGER_TOKEN;
use common::TestServer;
use common::content;
use common::expect_json;
use common::spawn_server;
use serde_json::Value;
use serde_json::json;

/// Four MiB chunks.
const CHUNK_SIZE: usize = 4 * 1024 * 1024;
/// Nine MiB of content, three chunks.
const TOTAL_SIZE: usize = 9 * 1024 * 1024;

/// Uploads `bytes` as the seller and returns the completed product id.
async fn upload_product(server: &TestServer, bytes: &[u8]) -> String {
    let started = expect_json(
        server
            .post_json(
                "/v1/uploads",
                SELLER_TOKEN,
                &json!({
                    "title": "Field Recordings",
                    "contentType": "application/zip",
                    "totalSize": bytes.len(),
                    "chunkSize": CHUNK_SIZE,
                }),
            )
            .await,
        200,
    )
    .await;
    assert_eq!(started["expectedChunks"], json!(3));
    let product_id = started["productId"].as_str().unwrap().to_string();
    let upload_id = started["uploadId"].as_str().unwrap().to_string();

    for (index, chunk) in bytes.chunks(CHUNK_SIZE).enumerate().rev() {
        let receipt = expect_json(
            server
                .client
                .put(server.url(&format!("/v1/uploads/{upload_id}/chunks/{index}")))
                .bearer_auth(SELLER_TOKEN)
                .body(chunk.to_vec())
                .send()
                .await
                .unwrap(),
            200,
        )
        .await;
        assert_eq!(receipt["size"], json!(chunk.len()));
    }

    let status =
        expect_json(server.get(&format!("/v1/uploads/{upload_id}"), SELLER_TOKEN).await, 200)
            .await;
    assert_eq!(status["uploaded"], json!([0, 1, 2]));
    assert_eq!(status["missing"], json!([]));

    let completed = expect_json(
        server
            .client
            .post(server.url(&format!("/v1/uploads/{upload_id}/complete")))
            .bearer_auth(SELLER_TOKEN)
            .send()
            .await
            .unwrap(),
        200,
    )
    .await;
    assert_eq!(completed["manifest"]["totalChunks"], json!(3));
    assert_eq!(completed["manifest"]["totalSize"], json!(bytes.len()));
    product_id
}

/// Offers, invoices, and pays for `product_id`; returns the transfer id.
async fn sell_product(server: &TestServer, product_id: &str) -> String {
    let offer = expect_json(
        server
            .post_json(
                "/v1/offer",
                SELLER_TOKEN,
                &json!({
                    "productId": product_id,
                    "toRecipientId": "buyer-1",
                    "price": 1500,
                    "currency": "usd",
                }),
            )
            .await,
        200,
    )
    .await;
    assert_eq!(offer["status"], json!("offered"));
    assert_eq!(offer["reused"], json!(false));
    let transfer_id = offer["transferId"].as_str().unwrap().to_string();

    let invoice = expect_json(
        server
            .post_json("/v1/invoice", BUYER_TOKEN, &json!({ "transferId": transfer_id }))
            .await,
        200,
    )
    .await;
    assert_eq!(invoice["status"], json!("invoiced"));
    assert_eq!(invoice["amount"], json!(1500));
    assert_eq!(invoice["currency"], json!("USD"));
    assert!(invoice["checkoutUrl"].as_str().unwrap().ends_with(&transfer_id));

    let paid = expect_json(
        server
            .webhook(&json!({
                "eventType": "payment.succeeded",
                "transferId": transfer_id,
                "paymentRef": "pay_1",
            }))
            .await,
        200,
    )
    .await;
    assert_eq!(paid["status"], json!("paid"));
    assert_eq!(paid["handled"], json!(true));
    transfer_id
}

#[tokio::test(flavor = "multi_thread")]
async fn full_delivery_lifecycle_over_http() {
    let server = spawn_server("").await;
    let bytes = content(TOTAL_SIZE);
    let product_id = upload_product(&server, &bytes).await;

    let hidden = server.get(&format!("/v1/products/{product_id}"), STRANGER_TOKEN).await;
    assert_eq!(hidden.status().as_u16(), 404);
    let denied = expect_json(
        server.get(&format!("/v1/manifest?productId={product_id}"), BUYER_TOKEN).await,
        404,
    )
    .await;
    assert_eq!(denied["kind"], json!("not_found_or_denied"));

    let transfer_id = sell_product(&server, &product_id).await;
    let grant = expect_json(
        server.post_json("/v1/grant", SELLER_TOKEN, &json!({ "transferId": transfer_id })).await,
        200,
    )
    .await;
    assert_eq!(grant["status"], json!("delivered"));
    assert_eq!(grant["keyReused"], json!(false));
    let claim_token = grant["claimToken"].as_str().unwrap().to_string();

    let claim_url = server.url(&format!("/v1/claim?claim={claim_token}"));
    let claim = expect_json(server.client.get(claim_url).send().await.unwrap(), 200).await;
    assert_eq!(claim["status"], json!("ready_for_download"));
    assert_eq!(claim["keyEnvelope"], grant["keyEnvelope"]);
    let download_token = claim["downloadToken"].as_str().unwrap().to_string();
    let urls: Vec<String> = claim["downloadUrls"]
        .as_array()
        .unwrap()
        .iter()
        .map(|url| url.as_str().unwrap().to_string())
        .collect();
    assert_eq!(urls.len(), 3);

    let manifest_url =
        server.url(&format!("/v1/manifest?productId={product_id}&token={download_token}"));
    let manifest = expect_json(server.client.get(manifest_url).send().await.unwrap(), 200).await;
    assert_eq!(manifest["totalChunks"], json!(3));

    let mut downloaded = Vec::with_capacity(TOTAL_SIZE);
    for url in &urls {
        let response = server.client.get(url).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        downloaded.extend_from_slice(&response.bytes().await.unwrap());
    }
    assert_eq!(downloaded, bytes);

    let by_bearer = server
        .get(&format!("/v1/chunk?productId={product_id}&chunkIndex=2"), BUYER_TOKEN)
        .await;
    assert_eq!(by_bearer.status().as_u16(), 200);
    assert_eq!(by_bearer.bytes().await.unwrap().len(), TOTAL_SIZE - 2 * CHUNK_SIZE);

    let ack = expect_json(
        server
            .post_json(
                "/v1/ack",
                BUYER_TOKEN,
                &json!({
                    "transferId": transfer_id,
                    "clientHash": manifest["contentHash"]["value"],
                    "signature": "sig-buyer",
                }),
            )
            .await,
        200,
    )
    .await;
    assert_eq!(ack["status"], json!("acknowledged"));

    let revoked = expect_json(
        server
            .post_json(
                "/v1/revoke",
                SELLER_TOKEN,
                &json!({ "transferId": transfer_id, "reason": "chargeback" }),
            )
            .await,
        200,
    )
    .await;
    assert_eq!(revoked["status"], json!("refunded"));

    let after = server.client.get(&urls[0]).send().await.unwrap();
    assert_eq!(after.status().as_u16(), 404);

    let view = expect_json(
        server.get(&format!("/v1/transfers/{transfer_id}"), BUYER_TOKEN).await,
        200,
    )
    .await;
    assert_eq!(view["transfer"]["status"], json!("refunded"));
    assert!(view["receipt"].is_object());
    assert!(view["payment"].is_object());
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_offer_reuses_the_active_transfer() {
    let server = spawn_server("").await;
    let product_id = upload_product(&server, &content(TOTAL_SIZE)).await;
    let body = json!({ "productId": product_id, "toRecipientId": "buyer-1", "price": 100 });
    let first = expect_json(server.post_json("/v1/offer", SELLER_TOKEN, &body).await, 200).await;
    let second = expect_json(server.post_json("/v1/offer", SELLER_TOKEN, &body).await, 200).await;
    assert_eq!(first["transferId"], second["transferId"]);
    assert_eq!(second["reused"], json!(true));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_pre_payment_inputs_block_the_invoice() {
    let server = spawn_server("").await;
    let product_id = upload_product(&server, &content(TOTAL_SIZE)).await;
    expect_json(
        server
            .post_json(
                &format!("/v1/products/{product_id}/requirements"),
                SELLER_TOKEN,
                &json!({
                    "requiredInputs": [
                        { "name": "email", "type": "email", "timing": "pre_payment" }
                    ]
                }),
            )
            .await,
        200,
    )
    .await;

    let body = json!({ "productId": product_id, "recipientId": "buyer-1" });
    let offer = json!({ "productId": product_id, "toRecipientId": "buyer-1" });
    expect_json(server.post_json("/v1/offer", BUYER_TOKEN, &offer).await, 200).await;
    let missing = expect_json(server.post_json("/v1/invoice", BUYER_TOKEN, &body).await, 422).await;
    assert_eq!(missing["kind"], json!("missing_required_inputs"));
    assert_eq!(missing["missing_inputs"], json!(["email"]));

    let mut with_inputs = body;
    with_inputs["buyerInputs"] = json!({ "email": "buyer@example.com" });
    let invoice = expect_json(server.post_json("/v1/invoice", BUYER_TOKEN, &with_inputs).await, 200)
        .await;
    assert_eq!(invoice["status"], json!("invoiced"));
}

#[tokio::test(flavor = "multi_thread")]
async fn sqlite_store_and_filesystem_blobs_serve_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let extra = format!(
        r"
[store]
backend = 'sqlite'

[store.sqlite]
path = '{}'

[blobs]
backend = 'filesystem'
root = '{}'
",
        dir.path().join("dropgate.db").display(),
        dir.path().join("blobs").display(),
    );
    let server = spawn_server(&extra).await;
    let bytes = content(TOTAL_SIZE);
    let product_id = upload_product(&server, &bytes).await;

    let chunk = server
        .get(&format!("/v1/chunk?productId={product_id}&chunkIndex=1"), SELLER_TOKEN)
        .await;
    assert_eq!(chunk.status().as_u16(), 200);
    assert_eq!(chunk.bytes().await.unwrap().as_ref(), &bytes[CHUNK_SIZE .. 2 * CHUNK_SIZE]);

    let health: Value = expect_json(server.get("/v1/health", SELLER_TOKEN).await, 200).await;
    assert_eq!(health["status"], json!("ok"));
}
