//! Checkout confirmation.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use service_core::error::AppError;

use crate::dtos::{VerifyPaymentRequest, VerifyPaymentResponse};
use crate::services::razorpay::PaymentVerification;
use crate::startup::AppState;

/// Errors from the verify endpoint carry `ok: false` alongside the message.
#[derive(Debug)]
pub struct VerifyError(pub AppError);

impl From<AppError> for VerifyError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for VerifyError {
    fn into_response(self) -> Response {
        self.0.log();
        (
            self.0.status_code(),
            Json(json!({ "ok": false, "error": self.0.public_message() })),
        )
            .into_response()
    }
}

/// Verify a Razorpay checkout callback and register the participant.
pub async fn verify_payment(
    State(state): State<AppState>,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Result<Json<VerifyPaymentResponse>, VerifyError> {
    let Json(payload) = payload.map_err(|e| {
        AppError::BadRequest(anyhow::anyhow!("Invalid request body: {}", e.body_text()))
    })?;

    tracing::info!(
        razorpay_order_id = %payload.razorpay_order_id,
        razorpay_payment_id = %payload.razorpay_payment_id,
        "Verifying Razorpay payment"
    );

    let verification = PaymentVerification {
        razorpay_order_id: payload.razorpay_order_id,
        razorpay_payment_id: payload.razorpay_payment_id,
        razorpay_signature: payload.razorpay_signature,
    };

    let form_data = payload.form_data.unwrap_or(Value::Null);
    let registration = state.registrations.confirm_payment(verification, &form_data).await?;

    Ok(Json(VerifyPaymentResponse {
        ok: true,
        participant_no: registration.participant_no,
        token: registration.token,
    }))
}
