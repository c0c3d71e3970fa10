//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    ACTIONS_EXECUTED_TOTAL, DISPATCH_LATENCY, DISPATCH_RESULTS_TOTAL, EVENTS_EMITTED_TOTAL,
    JOBS_ENQUEUED_TOTAL, LISTENER_FAILURES_TOTAL, NOTIFICATIONS_CREATED_TOTAL,
    NOTIFICATIONS_MARKED_TOTAL, PREFERENCES_SEEDED_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording notification lifecycle metrics
pub struct LifecycleMetrics;

impl LifecycleMetrics {
    pub fn record_created() {
        NOTIFICATIONS_CREATED_TOTAL.inc();
    }

    pub fn record_marked(status: &str, count: u64) {
        NOTIFICATIONS_MARKED_TOTAL
            .with_label_values(&[status])
            .inc_by(count);
    }

    pub fn record_action(action_key: &str) {
        ACTIONS_EXECUTED_TOTAL.with_label_values(&[action_key]).inc();
    }

    pub fn record_preferences_seeded(count: u64) {
        PREFERENCES_SEEDED_TOTAL.inc_by(count);
    }
}

/// Helper struct for recording event hub metrics
pub struct EventHubMetrics;

impl EventHubMetrics {
    pub fn record_emitted(topic: &str) {
        EVENTS_EMITTED_TOTAL.with_label_values(&[topic]).inc();
    }

    pub fn record_listener_failure(topic: &str) {
        LISTENER_FAILURES_TOTAL.with_label_values(&[topic]).inc();
    }
}

/// Helper struct for recording dispatch metrics
pub struct DispatchMetrics;

impl DispatchMetrics {
    pub fn record_result(channel: &str, status: &str) {
        DISPATCH_RESULTS_TOTAL
            .with_label_values(&[channel, status])
            .inc();
    }

    pub fn record_latency(seconds: f64) {
        DISPATCH_LATENCY.observe(seconds);
    }

    pub fn record_job(job_type: &str) {
        JOBS_ENQUEUED_TOTAL.with_label_values(&[job_type]).inc();
    }
}
