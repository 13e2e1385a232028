mod common;

use common::{sign, TestApp, TEST_EVENT_ID};
use serde_json::json;
use std::collections::BTreeSet;

#[tokio::test]
async fn first_and_second_payments_get_sequential_numbers() {
    let app = TestApp::spawn().await;

    let response = app
        .post_verify_payment(TestApp::checkout_callback(
            "order_abc",
            "pay_1",
            json!({ "name": "Asha", "regno": "21BCE1234" }),
        ))
        .await;

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["participant_no"], 1);
    assert!(body["token"].as_str().unwrap().starts_with("API25-1234-"));

    let response = app
        .post_verify_payment(TestApp::checkout_callback(
            "order_def",
            "pay_2",
            json!({ "name": "Ravi", "regno": "21BCE5678" }),
        ))
        .await;

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["participant_no"], 2);
}

#[tokio::test]
async fn tampered_signature_is_rejected_without_allocation() {
    let app = TestApp::spawn().await;

    let mut callback = TestApp::checkout_callback("order_abc", "pay_1", json!({}));
    callback["razorpay_signature"] = json!(sign("order_abc", "pay_other"));

    let response = app.post_verify_payment(callback).await;

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "ok": false, "error": "Invalid signature" }));
    assert_eq!(app.store.last_participant_no(TEST_EVENT_ID).await.unwrap(), 0);

    let response = app
        .post_verify_payment(TestApp::checkout_callback("order_abc", "pay_1", json!({})))
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["participant_no"], 1);
}

#[tokio::test]
async fn missing_fields_fail_signature_check() {
    let app = TestApp::spawn().await;

    let response = app
        .post_verify_payment(json!({ "razorpay_order_id": "order_abc" }))
        .await;

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "Invalid signature");
}

#[tokio::test]
async fn malformed_json_is_client_error() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(format!("{}/api/verify-payment", app.address))
        .header("content-type", "application/json")
        .body("{\"razorpay_order_id\": ")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn replayed_callback_returns_same_registration() {
    let app = TestApp::spawn().await;
    let callback =
        TestApp::checkout_callback("order_abc", "pay_1", json!({ "regno": "21BCE1234" }));

    let first: serde_json::Value = app
        .post_verify_payment(callback.clone())
        .await
        .json()
        .await
        .unwrap();
    let second: serde_json::Value = app.post_verify_payment(callback).await.json().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(app.store.last_participant_no(TEST_EVENT_ID).await.unwrap(), 1);
}

#[tokio::test]
async fn verified_payment_with_bad_form_fields_is_still_registered() {
    let app = TestApp::spawn().await;

    let response = app
        .post_verify_payment(TestApp::checkout_callback(
            "order_abc",
            "pay_1",
            json!({
                "name": "Asha",
                "email": "not-an-email",
                "team": { "name": "Null Pointers" },
                "college": ["VIT", "Vellore"]
            }),
        ))
        .await;

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["participant_no"], 1);

    let stored = app
        .store
        .find_registration(TEST_EVENT_ID, "pay_1")
        .await
        .unwrap()
        .expect("registration should be stored");
    assert_eq!(stored.form.name.as_deref(), Some("Asha"));
    assert_eq!(stored.form.email, None);
    assert_eq!(stored.form.team, None);
    assert_eq!(stored.form.college, None);
}

#[tokio::test]
async fn non_object_form_data_is_still_registered() {
    let app = TestApp::spawn().await;

    let response = app
        .post_verify_payment(TestApp::checkout_callback(
            "order_abc",
            "pay_1",
            json!("name=Asha"),
        ))
        .await;

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["participant_no"], 1);
}

#[tokio::test]
async fn concurrent_duplicate_callbacks_get_one_number() {
    let app = TestApp::spawn().await;
    let callback =
        TestApp::checkout_callback("order_abc", "pay_1", json!({ "regno": "21BCE1234" }));

    let requests = (0..10).map(|_| app.post_verify_payment(callback.clone()));

    let mut assignments = BTreeSet::new();
    for response in futures::future::join_all(requests).await {
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = response.json().await.unwrap();
        assignments.insert((
            body["participant_no"].as_i64().unwrap(),
            body["token"].as_str().unwrap().to_string(),
        ));
    }

    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments.into_iter().next().unwrap().0, 1);
    assert_eq!(app.store.last_participant_no(TEST_EVENT_ID).await.unwrap(), 1);

    let next: serde_json::Value = app
        .post_verify_payment(TestApp::checkout_callback("order_def", "pay_2", json!({})))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(next["participant_no"], 2);
}

#[tokio::test]
async fn registration_stores_allow_listed_form_fields() {
    let app = TestApp::spawn().await;

    app.post_verify_payment(TestApp::checkout_callback(
        "order_abc",
        "pay_1",
        json!({
            "name": "Asha",
            "email": "asha@example.com",
            "year": 3,
            "participant_no": 999,
            "status": "refunded"
        }),
    ))
    .await;

    let stored = app
        .store
        .find_registration(TEST_EVENT_ID, "pay_1")
        .await
        .unwrap()
        .expect("registration should be stored");

    assert_eq!(stored.participant_no, 1);
    assert_eq!(stored.order_id, "order_abc");
    assert_eq!(stored.signature, sign("order_abc", "pay_1"));
    assert_eq!(stored.amount, 100.0);
    assert_eq!(stored.conv_fee, 2.5);
    assert_eq!(stored.form.name.as_deref(), Some("Asha"));
    assert_eq!(stored.form.email.as_deref(), Some("asha@example.com"));
    assert_eq!(stored.form.year.as_deref(), Some("3"));
    assert_eq!(serde_json::to_value(stored.status).unwrap(), json!("success"));
}

#[tokio::test]
async fn concurrent_payments_get_distinct_dense_numbers() {
    const N: usize = 25;
    let app = TestApp::spawn().await;

    let requests = (0..N).map(|i| {
        app.post_verify_payment(TestApp::checkout_callback(
            &format!("order_{i}"),
            &format!("pay_{i}"),
            json!({}),
        ))
    });

    let mut numbers = BTreeSet::new();
    for response in futures::future::join_all(requests).await {
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["ok"], true);
        numbers.insert(body["participant_no"].as_i64().unwrap());
    }

    assert_eq!(numbers, (1..=N as i64).collect::<BTreeSet<_>>());
}
