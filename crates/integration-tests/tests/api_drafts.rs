//! Draft, QR and tribute endpoints over HTTP.
//!
//! These tests require:
//! - A running `PostgreSQL` database with migrations applied (dash-cli migrate)
//! - The server running (cargo run -p dash-memories-server)
//!
//! Run with: cargo test -p dash-memories-integration-tests -- --ignored

#![allow(clippy::unwrap_used)]

use dash_memories_integration_tests::{base_url, client};
use reqwest::StatusCode;
use serde_json::{Value, json};

/// Create a draft and return its slug.
async fn create_draft(client: &reqwest::Client) -> String {
    let resp = client
        .post(format!("{}/api/drafts", base_url()))
        .send()
        .await
        .expect("Failed to create draft");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.unwrap();
    body["slug"].as_str().unwrap().to_string()
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_health_and_readiness() {
    let client = client();
    let resp = client
        .get(format!("{}/health", base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");

    let resp = client
        .get(format!("{}/health/ready", base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
}

// ============================================================================
// Drafts
// ============================================================================

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_draft_lifecycle() {
    let client = client();
    let slug = create_draft(&client).await;
    assert_eq!(slug.len(), 6);
    assert!(slug.chars().all(|c| c.is_ascii_digit()));

    let resp = client
        .post(format!("{}/api/drafts/save", base_url()))
        .json(&json!({
            "slug": slug,
            "email": "family@example.com",
            "fullName": "Ada Lovelace",
            "birthDate": "1815-12-10",
            "deathDate": "1852-11-27"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let draft: Value = client
        .get(format!("{}/api/drafts/{slug}", base_url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(draft["status"], "draft");
    assert_eq!(draft["fullName"], "Ada Lovelace");
    assert!(draft.get("checkoutSessionId").is_none());

    let latest: Value = client
        .get(format!(
            "{}/api/drafts/latest?email=family@example.com",
            base_url()
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(latest["success"], true);
    assert_eq!(latest["draft"]["slug"], slug.as_str());
}

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_save_requires_account() {
    let client = client();
    let slug = create_draft(&client).await;
    let resp = client
        .post(format!("{}/api/drafts/save", base_url()))
        .json(&json!({ "slug": slug, "fullName": "No Owner" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Missing account info.");
}

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_unknown_draft_is_not_found() {
    let resp = client()
        .get(format!("{}/api/drafts/999999999", base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// QR
// ============================================================================

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_qr_target_is_fixed_once_set() {
    let client = client();
    let slug = create_draft(&client).await;
    let url = format!("{}/api/drafts/{slug}/qr", base_url());

    let first: Value = client
        .post(&url)
        .json(&json!({ "target": "https://example.com/first" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["target"], "https://example.com/first");
    assert!(first["qrUrl"].as_str().unwrap().contains("/api/qr?data="));

    let second: Value = client
        .post(&url)
        .json(&json!({ "target": "https://example.com/second" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["target"], "https://example.com/first");
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_qr_png() {
    let client = client();
    let resp = client
        .get(format!(
            "{}/api/qr?data=https%3A%2F%2Fdash.gift%2Fh%2F000001&size=240",
            base_url()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "image/png");
    let bytes = resp.bytes().await.unwrap();
    assert!(bytes.starts_with(b"\x89PNG"));

    let resp = client
        .get(format!("{}/api/qr", base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Tribute page
// ============================================================================

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_tribute_page_for_unpaid_draft() {
    let client = client();
    let slug = create_draft(&client).await;
    let resp = client
        .get(format!("{}/h/{slug}", base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let html = resp.text().await.unwrap();
    assert!(html.contains("still being prepared"));
}

#[tokio::test]
#[ignore = "Requires running server and database"]
async fn test_moments_require_sign_in() {
    let client = client();
    let slug = create_draft(&client).await;
    let resp = client
        .post(format!("{}/api/stories/{slug}/moments", base_url()))
        .json(&json!({ "caption": "Sunday dinners" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
