//! Prometheus metrics for settlement-service.
//!
//! Business metrics live in the default prometheus registry; HTTP request
//! metrics recorded by the service-core middleware go through the `metrics`
//! facade and its Prometheus exporter. `/metrics` renders both.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, CounterVec, Histogram, HistogramVec, IntCounter, IntCounterVec,
    TextEncoder,
};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Settlement attempts by outcome.
pub static SETTLEMENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "settlement_settlements_total",
        "Total number of settlement attempts by outcome",
        &["outcome"] // settled, not_found, busy, timeout, persistence_failure, invalid_input
    )
    .expect("Failed to register settlements_total")
});

/// End-to-end settlement duration.
pub static SETTLEMENT_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "settlement_duration_seconds",
        "Settlement duration in seconds",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register settlement_duration")
});

/// Invoiced amount by payment method.
pub static INVOICE_AMOUNT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "settlement_invoice_amount_total",
        "Total invoiced amount by payment method",
        &["payment_method"]
    )
    .expect("Failed to register invoice_amount_total")
});

/// Price resolutions of billable line items.
pub static PRICE_RESOLUTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "settlement_price_resolutions_total",
        "Line item price resolutions by kind",
        &["resolution"] // resolved, fallback_to_catalog, unresolved
    )
    .expect("Failed to register price_resolutions_total")
});

/// Open orders removed by settlements and reconciliations.
pub static ORDERS_CLEARED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "settlement_orders_cleared_total",
        "Total number of open orders cleared"
    )
    .expect("Failed to register orders_cleared_total")
});

/// Compensation tasks by action.
pub static RECONCILIATION_TASKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "settlement_reconciliation_tasks_total",
        "Reconciliation tasks by action",
        &["action"] // enqueued, enqueue_failed, resolved
    )
    .expect("Failed to register reconciliation_tasks_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "settlement_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics and install the HTTP metrics recorder.
///
/// Safe to call more than once; only the first call installs the recorder.
pub fn init_metrics() {
    Lazy::force(&SETTLEMENTS_TOTAL);
    Lazy::force(&SETTLEMENT_DURATION);
    Lazy::force(&INVOICE_AMOUNT_TOTAL);
    Lazy::force(&PRICE_RESOLUTIONS_TOTAL);
    Lazy::force(&ORDERS_CLEARED_TOTAL);
    Lazy::force(&RECONCILIATION_TASKS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);

    if METRICS_HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
        }
        Err(e) => tracing::warn!(error = %e, "Prometheus recorder not installed"),
    }
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    if let Ok(business) = encoder.encode_to_string(&metric_families) {
        output.push_str(&business);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathered_output_contains_business_metrics() {
        init_metrics();
        SETTLEMENTS_TOTAL.with_label_values(&["settled"]).inc();
        let output = get_metrics();
        assert!(output.contains("settlement_settlements_total"));
        assert!(output.contains("settlement_db_query_duration_seconds"));
    }
}
