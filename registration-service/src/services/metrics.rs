use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use service_core::error::AppError;
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Safe to call more than once.
pub fn init_metrics() -> Result<(), AppError> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))
    })?;

    // A concurrent caller may have won the race; its handle is equivalent.
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Record an order creation attempt (`created` or `failed`).
pub fn record_order(event_id: &str, outcome: &'static str) {
    metrics::counter!(
        "registration_orders_total",
        "event_id" => event_id.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a verification outcome (`registered`, `replayed`, `invalid_signature`, `failed`).
pub fn record_verification(event_id: &str, outcome: &'static str) {
    metrics::counter!(
        "registration_verifications_total",
        "event_id" => event_id.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_allocation(event_id: &str) {
    metrics::counter!(
        "registration_participants_allocated_total",
        "event_id" => event_id.to_string()
    )
    .increment(1);
}

/// Record a submitted form field that was discarded as unusable.
pub fn record_dropped_field(event_id: &str, field: &str) {
    metrics::counter!(
        "registration_form_fields_dropped_total",
        "event_id" => event_id.to_string(),
        "field" => field.to_string()
    )
    .increment(1);
}
