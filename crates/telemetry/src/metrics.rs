// Metric definitions are static; construction only fails on malformed names.
#![allow(clippy::expect_used)]

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Completed pipeline runs, labelled `done` or with the failed stage
    pub static ref PIPELINE_RUNS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("rollcall_pipeline_runs_total", "Total number of roll call pipeline runs"),
            &["result"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    /// Per-face classifications of the matching and recording stages
    pub static ref FACES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("rollcall_faces_total", "Faces classified by pipeline stage"),
            &["stage", "result"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref STAGE_DURATION: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "rollcall_stage_duration_seconds",
                "Time spent in each pipeline stage",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["stage"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref REMOTE_CALLS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("rollcall_remote_calls_total", "Calls to external services"),
            &["service", "operation", "status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Count one call to an external collaborator
pub fn record_remote_call(service: &str, operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    REMOTE_CALLS
        .with_label_values(&[service, operation, status])
        .inc();
}

/// Encode all registered metrics in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}
