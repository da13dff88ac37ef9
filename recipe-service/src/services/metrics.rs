//! Prometheus metrics for recipe-service.
//!
//! HTTP metrics come from the shared middleware; generation outcomes are
//! counted here. Everything renders through one exporter handle.

use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Later calls are no-ops.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
            tracing::info!("Prometheus metrics initialized");
        }
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus recorder"),
    }
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Generation mode label.
#[derive(Debug, Clone, Copy)]
pub enum Mode {
    Buffered,
    Stream,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Mode::Buffered => "buffered",
            Mode::Stream => "stream",
        }
    }
}

/// Record one generation request by mode and outcome (`success`, `invalid`,
/// `blocked`, `auth_error`, `upstream_error`, or `interrupted` for a stream
/// that failed after output started).
pub fn record_generation(mode: Mode, outcome: &'static str) {
    counter!(
        "ai_generation_requests_total",
        "mode" => mode.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}
