//! Prometheus metrics for commission-reconciliation.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Histogram for database query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "commission_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for statement imports by final batch state.
pub static STATEMENT_IMPORTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "commission_statement_imports_total",
        "Total number of statement imports",
        &["status"]
    )
    .expect("Failed to register STATEMENT_IMPORTS")
});

/// Counter for per-row outcomes.
pub static ROW_OUTCOMES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "commission_statement_rows_total",
        "Statement rows processed, by outcome",
        &["outcome"]
    )
    .expect("Failed to register ROW_OUTCOMES")
});

/// Counter for matches by strategy.
pub static TRANSACTION_MATCHES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "commission_transaction_matches_total",
        "Total number of statement rows matched to a policy",
        &["strategy"]
    )
    .expect("Failed to register TRANSACTION_MATCHES")
});

pub static VOIDS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "commission_voids_total",
        "Total number of void operations",
        &["scope"]
    )
    .expect("Failed to register VOIDS")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "commission_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&STATEMENT_IMPORTS);
    Lazy::force(&ROW_OUTCOMES);
    Lazy::force(&TRANSACTION_MATCHES);
    Lazy::force(&VOIDS);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_statement_import(status: &str) {
    STATEMENT_IMPORTS.with_label_values(&[status]).inc();
}

pub fn record_row_outcome(outcome: &str) {
    ROW_OUTCOMES.with_label_values(&[outcome]).inc();
}

pub fn record_transaction_match(strategy: &str) {
    TRANSACTION_MATCHES.with_label_values(&[strategy]).inc();
}

pub fn record_void(scope: &str) {
    VOIDS.with_label_values(&[scope]).inc();
}

pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
