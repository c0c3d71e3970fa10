//! Prometheus metrics for the notification engine.
//!
//! - Lifecycle metrics (created, marked, actioned notifications)
//! - Event hub metrics (events emitted, listener failures)
//! - Dispatch metrics (per-channel results, latency)
//! - Preference and job hand-off metrics

mod helpers;

pub use helpers::{encode_metrics, DispatchMetrics, EventHubMetrics, LifecycleMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "notif";

lazy_static! {
    // ============================================================================
    // Lifecycle Metrics
    // ============================================================================

    /// Notifications persisted by the orchestrator
    pub static ref NOTIFICATIONS_CREATED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_created_total", METRIC_PREFIX),
        "Total notifications created"
    ).unwrap();

    /// Notifications whose status was changed, by target status
    pub static ref NOTIFICATIONS_MARKED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_marked_total", METRIC_PREFIX),
        "Total notifications marked read or unread",
        &["status"]
    ).unwrap();

    /// Approval actions executed, by action key
    pub static ref ACTIONS_EXECUTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_actions_executed_total", METRIC_PREFIX),
        "Total approval actions executed",
        &["action"]
    ).unwrap();

    // ============================================================================
    // Event Hub Metrics
    // ============================================================================

    pub static ref EVENTS_EMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_emitted_total", METRIC_PREFIX),
        "Total events emitted on the event hub",
        &["topic"]
    ).unwrap();

    pub static ref LISTENER_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_listener_failures_total", METRIC_PREFIX),
        "Total event listener failures",
        &["topic"]
    ).unwrap();

    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// Dispatch results by channel and status
    pub static ref DISPATCH_RESULTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_dispatch_results_total", METRIC_PREFIX),
        "Total per-recipient dispatch results",
        &["channel", "status"]
    ).unwrap();

    /// End-to-end latency of a unified send
    pub static ref DISPATCH_LATENCY: Histogram = register_histogram!(
        format!("{}_dispatch_latency_seconds", METRIC_PREFIX),
        "Unified notification send latency in seconds",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    ).unwrap();

    /// Jobs handed off to the external job system, by job type
    pub static ref JOBS_ENQUEUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_jobs_enqueued_total", METRIC_PREFIX),
        "Total delivery jobs enqueued",
        &["job_type"]
    ).unwrap();

    // ============================================================================
    // Preference Metrics
    // ============================================================================

    /// Default preference rows inserted on first access or backfill
    pub static ref PREFERENCES_SEEDED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_preferences_seeded_total", METRIC_PREFIX),
        "Total default preference rows inserted"
    ).unwrap();
}
