//! Observability infrastructure for the recommender core
//!
//! Provides:
//! - Prometheus counters for observed and dropped OOM events
//! - Structured logging of OOM detections with tracing

use crate::oom::OomInfo;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<RecommenderMetricsInner> = OnceLock::new();

struct RecommenderMetricsInner {
    ooms_observed: IntCounter,
    eviction_ooms_observed: IntCounter,
    oom_events_dropped: IntCounterVec,
}

impl RecommenderMetricsInner {
    fn new() -> Self {
        Self {
            ooms_observed: register_int_counter!(
                "recommender_ooms_observed_total",
                "Number of OOM kills detected from pod updates"
            )
            .expect("Failed to register ooms_observed"),

            eviction_ooms_observed: register_int_counter!(
                "recommender_eviction_ooms_observed_total",
                "Number of memory-pressure evictions turned into OOM events"
            )
            .expect("Failed to register eviction_ooms_observed"),

            oom_events_dropped: register_int_counter_vec!(
                "recommender_oom_events_dropped_total",
                "Number of OOM events dropped before reaching the consumer",
                &["reason"]
            )
            .expect("Failed to register oom_events_dropped"),
        }
    }
}

/// Why an OOM event never reached the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Consumer did not make room before the send timeout
    Timeout,
    /// Channel was full and the caller asked not to wait
    Full,
    /// Receiver was dropped
    Closed,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Full => "full",
            Self::Closed => "closed",
        }
    }
}

/// Recommender metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying counters.
#[derive(Clone)]
pub struct RecommenderMetrics {
    _private: (),
}

impl Default for RecommenderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RecommenderMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RecommenderMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RecommenderMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn inc_ooms_observed(&self) {
        self.inner().ooms_observed.inc();
    }

    pub fn inc_eviction_ooms_observed(&self) {
        self.inner().eviction_ooms_observed.inc();
    }

    pub fn inc_oom_events_dropped(&self, reason: DropReason) {
        self.inner()
            .oom_events_dropped
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    /// Total dropped events for one reason, across all observers in the process
    pub fn oom_events_dropped(&self, reason: DropReason) -> u64 {
        self.inner()
            .oom_events_dropped
            .with_label_values(&[reason.as_str()])
            .get()
    }
}

/// Log a detected OOM kill
pub fn log_oom_detected(info: &OomInfo, source: &str) {
    info!(
        event = "oom_detected",
        source = %source,
        namespace = %info.namespace,
        pod_name = %info.pod,
        container = %info.container,
        memory_request_bytes = info.memory_request,
        finished_at = %info.timestamp,
        "OOM detected"
    );
}

/// Log an OOM event that could not be delivered
pub fn log_oom_dropped(info: &OomInfo, reason: DropReason) {
    warn!(
        event = "oom_dropped",
        reason = reason.as_str(),
        namespace = %info.namespace,
        pod_name = %info.pod,
        container = %info.container,
        "Dropping OOM event, consumer is not keeping up"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_counters() {
        let first = RecommenderMetrics::new();
        let second = first.clone();

        let before = first.oom_events_dropped(DropReason::Closed);
        second.inc_oom_events_dropped(DropReason::Closed);
        assert!(first.oom_events_dropped(DropReason::Closed) >= before + 1);

        first.inc_ooms_observed();
        first.inc_eviction_ooms_observed();
    }

    #[test]
    fn test_drop_reason_labels() {
        assert_eq!(DropReason::Timeout.as_str(), "timeout");
        assert_eq!(DropReason::Full.as_str(), "full");
        assert_eq!(DropReason::Closed.as_str(), "closed");
    }
}
