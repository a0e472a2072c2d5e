//! Controller metrics
//!
//! Admission decisions and config garbage collection.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    /// Controller metrics registry
    pub static ref CONTROLLER_METRICS_REGISTRY: Registry = Registry::new();

    /// Admission check duration
    static ref ADMISSION_DURATION: HistogramVec = {
        let opts = HistogramOpts::new(
            "admission_duration_seconds",
            "Admission check duration in seconds",
        );
        let histogram = HistogramVec::new(opts, &["kind", "operation"])
            .expect("Failed to create histogram");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(histogram.clone()))
            .expect("Failed to register histogram");
        histogram
    };

    /// Admission decisions total
    static ref ADMISSION_REQUESTS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "admission_requests_total",
            "Total number of admission decisions",
        );
        let counter = IntCounterVec::new(opts, &["kind", "operation", "result"])
            .expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Config sync attempts total
    static ref CONFIG_SYNC_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "config_sync_total",
            "Total number of owner config syncs",
        );
        let counter = IntCounterVec::new(opts, &["result"])
            .expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Artifacts garbage-collected from the data plane
    static ref CONFIG_ARTIFACTS_REMOVED_TOTAL: IntCounter = {
        let counter = IntCounter::new(
            "config_artifacts_removed_total",
            "Total number of discarded artifacts removed from the data plane",
        )
        .expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };
}

/// Record an admission decision
pub fn record_admission(kind: &str, operation: &str, duration_secs: f64, result: &str) {
    ADMISSION_DURATION
        .with_label_values(&[kind, operation])
        .observe(duration_secs);

    ADMISSION_REQUESTS_TOTAL
        .with_label_values(&[kind, operation, result])
        .inc();
}

/// Record a config sync and the number of artifacts it removed downstream
pub fn record_config_sync(result: &str, removed: usize) {
    CONFIG_SYNC_TOTAL.with_label_values(&[result]).inc();
    CONFIG_ARTIFACTS_REMOVED_TOTAL.inc_by(removed as u64);
}

/// Gather controller metrics
pub fn gather_controller_metrics() -> Result<String, String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = CONTROLLER_METRICS_REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert to UTF-8: {}", e))
}
