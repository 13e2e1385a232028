use serde::{Deserialize, Serialize};
use serde_json::Value;
use service_core::error::AppError;

/// Body of `POST /api/create-order`. `amount` is in major currency units and
/// loosely typed: numbers and numeric strings are accepted.
#[derive(Debug, Default, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub amount: Option<Value>,
}

impl CreateOrderRequest {
    /// Resolve the requested amount. Absent, zero or non-numeric values fall
    /// back to `default`; negative amounts are rejected.
    pub fn resolve_amount(&self, default: f64) -> Result<f64, AppError> {
        let requested = match &self.amount {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|a| a.is_finite() && *a != 0.0);

        match requested {
            None => Ok(default),
            Some(a) if a < 0.0 => Err(AppError::BadRequest(anyhow::anyhow!(
                "Amount must be positive"
            ))),
            Some(a) => Ok(a),
        }
    }
}

/// Largest minor-unit amount that survives the trip through `f64` exactly.
const MAX_MINOR_UNITS: f64 = 9_007_199_254_740_991.0;

/// Convert a major-unit amount to the gateway's minor units (paise for INR).
/// Amounts that round to nothing or overflow are rejected.
pub fn to_minor_units(amount: f64) -> Result<u64, AppError> {
    let minor = (amount * 100.0).round();
    if !(1.0..=MAX_MINOR_UNITS).contains(&minor) {
        return Err(AppError::BadRequest(anyhow::anyhow!("Amount is out of range")));
    }
    Ok(minor as u64)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub key_id: String,
    pub order_id: String,
    /// Minor units, as echoed by the gateway.
    pub amount: u64,
}

/// Body of `POST /api/verify-payment`, as posted by the checkout callback.
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    #[serde(default)]
    pub razorpay_order_id: String,
    #[serde(default)]
    pub razorpay_payment_id: String,
    #[serde(default)]
    pub razorpay_signature: String,
    /// Registrant details, kept as posted until the signature checks out.
    #[serde(default, rename = "formData")]
    pub form_data: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyPaymentResponse {
    pub ok: bool,
    pub participant_no: i64,
    pub token: String,
}
