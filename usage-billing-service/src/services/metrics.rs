//! Metrics module for usage-billing-service.
//! Prometheus metrics for store latency, invoicing and usage metering.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Recorder handle for the `metrics` facade (HTTP request metrics).
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "billing_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Invoice lifecycle operations by resulting status
pub static INVOICES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("billing_invoices_total", "Invoice lifecycle operations by status"),
        &["status"]
    )
    .expect("Failed to register INVOICES_TOTAL")
});

/// Invoiced amount in currency minor units
pub static INVOICE_AMOUNT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "billing_invoice_amount_total",
            "Total amount on generated invoices (minor units)"
        ),
        &["currency"]
    )
    .expect("Failed to register INVOICE_AMOUNT_TOTAL")
});

/// Usage events accepted for recording
pub static USAGE_EVENTS_RECORDED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("usage_events_recorded_total", "Usage events written"),
        &["event_type"]
    )
    .expect("Failed to register USAGE_EVENTS_RECORDED")
});

/// Usage events whose write failed and was absorbed
pub static USAGE_EVENT_WRITE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "usage_event_write_failures_total",
            "Usage events dropped because the store write failed"
        ),
        &["event_type"]
    )
    .expect("Failed to register USAGE_EVENT_WRITE_FAILURES")
});

/// Payment webhook deliveries by event type and outcome
pub static WEBHOOK_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "payment_webhook_events_total",
            "Payment webhook deliveries by event type and outcome"
        ),
        &["event_type", "outcome"]
    )
    .expect("Failed to register WEBHOOK_EVENTS_TOTAL")
});

/// Errors surfaced to callers, for alerting
pub static ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("billing_errors_total", "Total errors by kind and operation"),
        &["kind", "operation"]
    )
    .expect("Failed to register ERRORS_TOTAL")
});

/// Initialize all metrics. Safe to call more than once.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_none() {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(e) => tracing::warn!(error = %e, "Prometheus recorder not installed"),
        }
    }

    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&INVOICES_TOTAL);
    Lazy::force(&INVOICE_AMOUNT_TOTAL);
    Lazy::force(&USAGE_EVENTS_RECORDED);
    Lazy::force(&USAGE_EVENT_WRITE_FAILURES);
    Lazy::force(&WEBHOOK_EVENTS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let mut buffer = Vec::new();
    if TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .is_ok()
    {
        output.push_str(&String::from_utf8_lossy(&buffer));
    }

    output
}

pub fn record_invoice(status: &str) {
    INVOICES_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_invoice_amount(currency: &str, amount: i64) {
    INVOICE_AMOUNT_TOTAL
        .with_label_values(&[currency])
        .inc_by(amount.max(0) as u64);
}

pub fn record_usage_event(event_type: &str) {
    USAGE_EVENTS_RECORDED.with_label_values(&[event_type]).inc();
}

pub fn record_usage_write_failure(event_type: &str) {
    USAGE_EVENT_WRITE_FAILURES
        .with_label_values(&[event_type])
        .inc();
}

pub fn record_webhook_event(event_type: &str, outcome: &str) {
    WEBHOOK_EVENTS_TOTAL
        .with_label_values(&[event_type, outcome])
        .inc();
}

pub fn record_error(kind: &str, operation: &str) {
    ERRORS_TOTAL.with_label_values(&[kind, operation]).inc();
}
