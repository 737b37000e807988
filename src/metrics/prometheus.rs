//! Prometheus metrics definitions

use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::time::Instant;

use crate::Result;

lazy_static::lazy_static! {
    /// Total number of provider requests
    pub static ref REQUESTS: CounterVec = register_counter_vec!(
        "kubernetes_secret_provider_requests_total",
        "Total number of provider requests",
        &["operation"]
    ).unwrap();

    /// Total number of failed provider requests
    pub static ref REQUEST_ERRORS: CounterVec = register_counter_vec!(
        "kubernetes_secret_provider_request_errors_total",
        "Total number of failed provider requests",
        &["operation", "error"]
    ).unwrap();

    /// Request duration histogram
    pub static ref REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "kubernetes_secret_provider_request_duration_seconds",
        "Duration of provider requests in seconds",
        &["operation"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Access review outcomes
    pub static ref ACCESS_REVIEWS: CounterVec = register_counter_vec!(
        "kubernetes_secret_provider_access_reviews_total",
        "Access reviews by outcome (allowed, denied, error)",
        &["result"]
    ).unwrap();
}

/// Record the outcome of one provider operation started at `start`
pub fn observe<T>(operation: &str, start: Instant, result: &Result<T>) {
    REQUESTS.with_label_values(&[operation]).inc();
    REQUEST_DURATION
        .with_label_values(&[operation])
        .observe(start.elapsed().as_secs_f64());

    if let Err(e) = result {
        REQUEST_ERRORS
            .with_label_values(&[operation, e.kind()])
            .inc();
    }
}

/// Record an access review outcome
pub fn observe_access_review(result: &Result<bool>) {
    let label = match result {
        Ok(true) => "allowed",
        Ok(false) => "denied",
        Err(_) => "error",
    };
    ACCESS_REVIEWS.with_label_values(&[label]).inc();
}

/// Render the default registry in text exposition format
pub fn encode() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
