//! # Broker Metrics
//!
//! Requests issued to service brokers.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec};
use std::sync::LazyLock;

static BROKER_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "service_binding_broker_requests_total",
            "Total number of requests sent to service brokers",
        ),
        &["operation", "result"],
    )
    .expect("Failed to create BROKER_REQUESTS_TOTAL metric - this should never happen")
});

static BROKER_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "service_binding_broker_request_duration_seconds",
            "Duration of service broker requests in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["operation"],
    )
    .expect("Failed to create BROKER_REQUEST_DURATION metric - this should never happen")
});

pub(crate) fn register_broker_metrics() -> Result<()> {
    REGISTRY.register(Box::new(BROKER_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BROKER_REQUEST_DURATION.clone()))?;
    Ok(())
}

/// `result` is one of `success`, `error`, `transport_error`
pub fn increment_broker_requests_total(operation: &str, result: &str) {
    BROKER_REQUESTS_TOTAL
        .with_label_values(&[operation, result])
        .inc();
}

#[cfg(test)]
pub(crate) fn broker_requests_total(operation: &str, result: &str) -> u64 {
    BROKER_REQUESTS_TOTAL
        .with_label_values(&[operation, result])
        .get()
}

pub fn observe_broker_request_duration(operation: &str, duration: f64) {
    BROKER_REQUEST_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}
