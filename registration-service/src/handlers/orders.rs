//! Order creation for the registration checkout.

use axum::{body::Bytes, extract::State, Json};
use chrono::Utc;
use service_core::error::AppError;

use crate::dtos::{to_minor_units, CreateOrderRequest, CreateOrderResponse};
use crate::services::metrics::record_order;
use crate::startup::AppState;

/// Create a Razorpay order for the registration fee.
///
/// The body is optional; without an amount the configured default is
/// charged. The frontend opens checkout with the returned key and order id.
pub async fn create_order(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CreateOrderResponse>, AppError> {
    let request = parse_body(&body)?;
    let event = &state.config.event;

    let amount = request.resolve_amount(event.default_amount)?;
    let amount_minor = to_minor_units(amount)?;
    let receipt = format!("rcpt_{}", Utc::now().timestamp_millis());

    tracing::info!(
        event_id = %event.id,
        amount,
        amount_minor,
        currency = %event.currency,
        receipt = %receipt,
        "Creating Razorpay order"
    );

    let order = state
        .razorpay
        .create_order(amount_minor, &event.currency, receipt)
        .await
        .inspect_err(|_| record_order(&event.id, "failed"))?;

    record_order(&event.id, "created");

    Ok(Json(CreateOrderResponse {
        key_id: state.razorpay.key_id().to_string(),
        order_id: order.id,
        amount: order.amount,
    }))
}

fn parse_body(body: &[u8]) -> Result<CreateOrderRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CreateOrderRequest::default());
    }

    let request: Option<CreateOrderRequest> = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid request body: {}", e)))?;

    Ok(request.unwrap_or_default())
}
