//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `resource_controller_reconciliations_total{kind}` - Reconciliation passes
//! - `resource_controller_reconciliation_errors_total{kind}` - Failed passes
//! - `resource_controller_reconciliation_duration_seconds{kind}` - Pass duration
//! - `resource_controller_requeues_total{reason}` - Requeues by reason
//! - `resource_controller_external_operations_total{kind,operation,outcome}` - External calls
//! - `resource_controller_finalizer_operations_total{kind,operation}` - Finalizer adds/removes
//! - `resource_controller_render_failures_total{kind}` - Template resolution/render failures
//! - `resource_controller_dependents_requeued_total{source}` - Objects requeued by the indexer

use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "resource_controller_reconciliations_total",
            "Total number of reconciliations by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "resource_controller_reconciliation_errors_total",
            "Total number of reconciliation errors by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "resource_controller_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds by kind",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "resource_controller_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static EXTERNAL_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "resource_controller_external_operations_total",
            "Total number of external service operations by kind, operation and outcome",
        ),
        &["kind", "operation", "outcome"],
    )
    .expect("Failed to create EXTERNAL_OPERATIONS_TOTAL metric - this should never happen")
});

static FINALIZER_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "resource_controller_finalizer_operations_total",
            "Total number of finalizer additions and removals by kind",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create FINALIZER_OPERATIONS_TOTAL metric - this should never happen")
});

static RENDER_FAILURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "resource_controller_render_failures_total",
            "Total number of template resolution or rendering failures by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RENDER_FAILURES_TOTAL metric - this should never happen")
});

static DEPENDENTS_REQUEUED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "resource_controller_dependents_requeued_total",
            "Total number of declared objects requeued after a data or instance change",
        ),
        &["source"],
    )
    .expect("Failed to create DEPENDENTS_REQUEUED_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only when a metric is registered twice"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EXTERNAL_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FINALIZER_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RENDER_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DEPENDENTS_REQUEUED_TOTAL.clone()))?;

    Ok(())
}

/// Text exposition of every registered metric
#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only when encoding fails"
)]
pub fn gather_text() -> Result<String> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_external_operation(kind: &str, operation: &str, outcome: &str) {
    EXTERNAL_OPERATIONS_TOTAL
        .with_label_values(&[kind, operation, outcome])
        .inc();
}

pub fn increment_finalizer_operations(kind: &str, operation: &str) {
    FINALIZER_OPERATIONS_TOTAL
        .with_label_values(&[kind, operation])
        .inc();
}

pub fn increment_render_failures(kind: &str) {
    RENDER_FAILURES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_dependents_requeued(source: &str, count: usize) {
    DEPENDENTS_REQUEUED_TOTAL
        .with_label_values(&[source])
        .inc_by(u64::try_from(count).unwrap_or(u64::MAX));
}
