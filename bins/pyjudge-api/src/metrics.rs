// Prometheus metrics for the playground service
use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};
use pyjudge_common::types::ExecutionOutcome;

lazy_static! {
    static ref PLAYGROUND_REQUESTS: IntCounter = register_int_counter!(
        "pyjudge_playground_requests_total",
        "Playground requests accepted for execution"
    )
    .unwrap();
    static ref REJECTED_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "pyjudge_rejected_requests_total",
        "Playground requests rejected before execution",
        &["reason"]
    )
    .unwrap();
    static ref TEST_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "pyjudge_test_outcomes_total",
        "Executed tests by final status",
        &["status"]
    )
    .unwrap();
    static ref RUN_DURATION: Histogram = register_histogram!(
        "pyjudge_run_duration_seconds",
        "Wall-clock time to run all tests of one request"
    )
    .unwrap();
}

pub fn record_rejection(reason: &str) {
    REJECTED_REQUESTS.with_label_values(&[reason]).inc();
}

pub fn record_run(outcomes: &[ExecutionOutcome], duration_secs: f64) {
    PLAYGROUND_REQUESTS.inc();
    RUN_DURATION.observe(duration_secs);
    for outcome in outcomes {
        let status = outcome.status.to_string();
        TEST_OUTCOMES.with_label_values(&[status.as_str()]).inc();
    }
}

/// Render the default registry in the Prometheus text format
pub fn render() -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
