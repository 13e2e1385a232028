mod common;

use common::{TestApp, TEST_KEY_ID};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

async fn expect_order_amount(app: &TestApp, amount_minor: u64) {
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(body_partial_json(json!({ "amount": amount_minor, "currency": "INR" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_abc",
            "amount": amount_minor,
            "currency": "INR",
            "receipt": "rcpt_test",
            "status": "created",
            "created_at": 1700000000
        })))
        .expect(1)
        .mount(&app.razorpay)
        .await;
}

#[tokio::test]
async fn create_order_charges_amount_in_paise() {
    let app = TestApp::spawn().await;
    expect_order_amount(&app, 25_000).await;

    let response = app.post_create_order(json!({ "amount": 250 })).await;

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["key_id"], TEST_KEY_ID);
    assert_eq!(body["order_id"], "order_abc");
    assert_eq!(body["amount"], 25_000);
}

#[tokio::test]
async fn create_order_without_body_uses_default_amount() {
    let app = TestApp::spawn().await;
    expect_order_amount(&app, 10_000).await;

    let response = app
        .client
        .post(format!("{}/api/create-order", app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["amount"], 10_000);
}

#[tokio::test]
async fn non_numeric_amount_uses_default() {
    let app = TestApp::spawn().await;
    expect_order_amount(&app, 10_000).await;

    let response = app.post_create_order(json!({ "amount": "lots" })).await;

    assert_eq!(response.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn numeric_string_amount_is_honoured() {
    let app = TestApp::spawn().await;
    expect_order_amount(&app, 15_000).await;

    let response = app.post_create_order(json!({ "amount": "150" })).await;

    assert_eq!(response.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn receipt_label_is_time_based() {
    let app = TestApp::spawn().await;
    app.mock_order_created("order_abc", 10_000).await;

    app.post_create_order(json!({})).await;

    let requests = app.razorpay.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let receipt = sent["receipt"].as_str().unwrap();
    assert!(receipt.starts_with("rcpt_"));
    assert!(receipt["rcpt_".len()..].parse::<i64>().is_ok());
}

#[tokio::test]
async fn negative_amount_is_rejected_without_gateway_call() {
    let app = TestApp::spawn().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.razorpay)
        .await;

    let response = app.post_create_order(json!({ "amount": -10 })).await;

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Amount must be positive");
}

#[tokio::test]
async fn gateway_failure_is_server_error() {
    let app = TestApp::spawn().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {
                "code": "BAD_REQUEST_ERROR",
                "description": "Authentication failed"
            }
        })))
        .mount(&app.razorpay)
        .await;

    let response = app.post_create_order(json!({ "amount": 100 })).await;

    assert!(response.status().is_server_error());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Failed to create payment order");
}

#[tokio::test]
async fn amount_below_one_paisa_is_rejected_without_gateway_call() {
    let app = TestApp::spawn().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.razorpay)
        .await;

    for amount in [json!(0.001), json!("1e30")] {
        let response = app.post_create_order(json!({ "amount": amount })).await;

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Amount is out of range");
    }
}
