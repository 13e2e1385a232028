#![allow(dead_code)]

use hmac::{Hmac, Mac};
use registration_service::config::{
    Config, DatabaseConfig, EventConfig, RazorpayConfig, StorageBackend, StorageConfig,
};
use registration_service::services::RegistrationStore;
use registration_service::startup::Application;
use secrecy::Secret;
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_EVENT_ID: &str = "test-event";
pub const TEST_KEY_ID: &str = "rzp_test_key_id";
pub const TEST_KEY_SECRET: &str = "test_key_secret";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub store: Arc<dyn RegistrationStore>,
    pub razorpay: MockServer,
    pub client: reqwest::Client,
}

pub fn test_config(razorpay_base_url: &str) -> Config {
    Config {
        common: service_core::config::Config {
            port: 0, // Random port
            ..Default::default()
        },
        storage: StorageConfig {
            backend: StorageBackend::Memory,
        },
        database: DatabaseConfig {
            url: Secret::new(
                std::env::var("TEST_MONGODB_URI")
                    .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            ),
            db_name: format!("registration_test_{}", uuid::Uuid::new_v4()),
        },
        razorpay: RazorpayConfig {
            key_id: TEST_KEY_ID.to_string(),
            key_secret: Secret::new(TEST_KEY_SECRET.to_string()),
            api_base_url: razorpay_base_url.to_string(),
            timeout_secs: 5,
        },
        event: EventConfig {
            id: TEST_EVENT_ID.to_string(),
            token_prefix: "API25".to_string(),
            currency: "INR".to_string(),
            default_amount: 100.0,
            registration_amount: 100.0,
            convenience_fee: 2.5,
        },
        service_name: "registration-service-test".to_string(),
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        let razorpay = MockServer::start().await;

        let app = Application::build(test_config(&razorpay.uri()))
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);
        let store = app.store();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            store,
            razorpay,
            client,
        }
    }

    /// Make the mocked gateway answer order creation with `order_id`, echoing
    /// the requested amount.
    pub async fn mock_order_created(&self, order_id: &str, amount_minor: u64) {
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": order_id,
                "entity": "order",
                "amount": amount_minor,
                "amount_paid": 0,
                "amount_due": amount_minor,
                "currency": "INR",
                "receipt": "rcpt_test",
                "status": "created",
                "attempts": 0,
                "notes": [],
                "created_at": 1700000000
            })))
            .mount(&self.razorpay)
            .await;
    }

    pub async fn post_create_order(&self, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}/api/create-order", self.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_verify_payment(&self, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}/api/verify-payment", self.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Verify body exactly as Razorpay checkout would hand it to the frontend.
    pub fn checkout_callback(
        order_id: &str,
        payment_id: &str,
        form_data: serde_json::Value,
    ) -> serde_json::Value {
        json!({
            "razorpay_order_id": order_id,
            "razorpay_payment_id": payment_id,
            "razorpay_signature": sign(order_id, payment_id),
            "formData": form_data
        })
    }
}

/// Razorpay checkout signature, computed independently of the service code.
pub fn sign(order_id: &str, payment_id: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(TEST_KEY_SECRET.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
