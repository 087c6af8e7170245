//! Metrics collection and Prometheus export.
//!
//! Installs the Prometheus recorder behind the `metrics` facade and provides
//! the helpers the assistant and the webhook processor record through.

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global handle to the Prometheus recorder.
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
];

/// Initialize the metrics recorder.
///
/// Safe to call more than once; only the first call installs a recorder.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }

    let builder = match PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Suffix("duration_seconds".to_string()),
        DURATION_BUCKETS,
    ) {
        Ok(builder) => builder,
        Err(e) => {
            tracing::error!(error = %e, "Invalid histogram buckets");
            return;
        }
    };

    match builder.install_recorder() {
        Ok(handle) => {
            if METRICS_HANDLE.set(handle).is_ok() {
                tracing::info!("Prometheus metrics initialized");
            }
        }
        Err(e) => tracing::warn!(error = %e, "Prometheus recorder already installed"),
    }
}

/// Get the current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

// Helper functions for recording metrics

/// Record a completed LLM call for one assistant task.
pub fn record_llm_request(task: &'static str, outcome: &'static str, duration_secs: f64) {
    metrics::counter!("llm_requests_total", "task" => task, "outcome" => outcome).increment(1);
    metrics::histogram!("llm_request_duration_seconds", "task" => task).record(duration_secs);
}

/// Record token usage reported by the vendor.
pub fn record_tokens(input_tokens: i32, output_tokens: i32) {
    metrics::counter!("llm_tokens_total", "type" => "input").increment(input_tokens.max(0) as u64);
    metrics::counter!("llm_tokens_total", "type" => "output")
        .increment(output_tokens.max(0) as u64);
}

/// Record a processed webhook delivery.
pub fn record_webhook_event(event: &str, status: &'static str) {
    metrics::counter!(
        "webhook_events_total",
        "event" => event.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record one analyzed (or failed) webhook file.
pub fn record_webhook_file(outcome: &'static str) {
    metrics::counter!("webhook_files_total", "outcome" => outcome).increment(1);
}
