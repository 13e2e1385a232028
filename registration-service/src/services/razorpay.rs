//! Razorpay payment provider client.
//!
//! Implements Razorpay's Orders API for payment initiation and checkout
//! signature verification for payment confirmation.

use crate::config::RazorpayConfig;
use anyhow::anyhow;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use service_core::utils::signature::verify_hmac_sha256_hex;
use std::time::Duration;

/// Razorpay client for interacting with the Razorpay API.
#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    config: RazorpayConfig,
}

/// Request to create a Razorpay order.
#[derive(Debug, Serialize)]
pub struct CreateOrderRequest {
    /// Amount in smallest currency unit (paise for INR).
    pub amount: u64,
    /// Currency code (e.g., "INR").
    pub currency: String,
    /// Receipt label for tracking.
    pub receipt: String,
}

/// Response from Razorpay order creation.
#[derive(Debug, Deserialize)]
pub struct RazorpayOrder {
    /// Razorpay order ID.
    pub id: String,
    /// Amount in smallest currency unit.
    pub amount: u64,
    /// Currency code.
    pub currency: String,
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: u64,
}

/// Razorpay API error response.
#[derive(Debug, Deserialize)]
pub struct RazorpayError {
    pub error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayErrorDetail {
    pub code: String,
    pub description: String,
    pub reason: Option<String>,
}

/// Checkout callback fields the signature covers.
#[derive(Debug)]
pub struct PaymentVerification {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

impl RazorpayClient {
    pub fn new(config: RazorpayConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::ConfigError(anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Check if Razorpay is configured (credentials are set).
    pub fn is_configured(&self) -> bool {
        !self.config.key_id.is_empty() && !self.config.key_secret.expose_secret().is_empty()
    }

    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    /// Create a new order in Razorpay. `amount` is in the smallest currency
    /// unit. Failures are not retried.
    pub async fn create_order(
        &self,
        amount: u64,
        currency: &str,
        receipt: String,
    ) -> Result<RazorpayOrder, AppError> {
        if !self.is_configured() {
            return Err(AppError::ConfigError(anyhow!(
                "Razorpay credentials not configured"
            )));
        }

        let request = CreateOrderRequest {
            amount,
            currency: currency.to_string(),
            receipt,
        };

        let url = format!("{}/orders", self.config.api_base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::GatewayError(anyhow!("Razorpay request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::GatewayError(anyhow!("Razorpay response unreadable: {}", e)))?;

        tracing::debug!(status = %status, body = %body, "Razorpay create_order response");

        if status.is_success() {
            let order: RazorpayOrder = serde_json::from_str(&body).map_err(|e| {
                AppError::GatewayError(anyhow!("Unexpected Razorpay order payload: {}", e))
            })?;
            tracing::info!(
                order_id = %order.id,
                amount = order.amount,
                currency = %order.currency,
                receipt = ?order.receipt,
                "Razorpay order created"
            );
            Ok(order)
        } else {
            let error: RazorpayError =
                serde_json::from_str(&body).unwrap_or_else(|_| RazorpayError {
                    error: RazorpayErrorDetail {
                        code: "UNKNOWN".to_string(),
                        description: body.clone(),
                        reason: None,
                    },
                });
            tracing::error!(
                status = %status,
                code = %error.error.code,
                description = %error.error.description,
                reason = ?error.error.reason,
                "Razorpay order creation failed"
            );
            Err(AppError::GatewayError(anyhow!(
                "Razorpay error: {} - {}",
                error.error.code,
                error.error.description
            )))
        }
    }

    /// Verify payment signature from Razorpay checkout.
    ///
    /// The signature is computed as:
    /// `HMAC-SHA256(order_id + "|" + payment_id, key_secret)`, hex encoded.
    pub fn verify_payment_signature(
        &self,
        verification: &PaymentVerification,
    ) -> Result<bool, AppError> {
        // An empty key would make signatures forgeable by anyone.
        if self.config.key_secret.expose_secret().is_empty() {
            return Err(AppError::ConfigError(anyhow!(
                "Razorpay key secret not configured"
            )));
        }

        let payload = format!(
            "{}|{}",
            verification.razorpay_order_id, verification.razorpay_payment_id
        );

        let is_valid = verify_hmac_sha256_hex(
            self.config.key_secret.expose_secret(),
            &payload,
            &verification.razorpay_signature,
        )?;

        if is_valid {
            tracing::info!(
                order_id = %verification.razorpay_order_id,
                payment_id = %verification.razorpay_payment_id,
                "Payment signature verified successfully"
            );
        } else {
            tracing::warn!(
                order_id = %verification.razorpay_order_id,
                payment_id = %verification.razorpay_payment_id,
                "Payment signature verification failed"
            );
        }

        Ok(is_valid)
    }
}
