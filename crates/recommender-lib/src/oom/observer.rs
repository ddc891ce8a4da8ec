//! Pod-update OOM observer
//!
//! Each pod update is diffed against the previous snapshot. A container whose
//! restart count went up and whose last termination was an OOM kill produces
//! one [`OomInfo`] on the observer's channel.
//!
//! Delivery goes through a bounded channel with a send timeout, so a slow
//! consumer can delay the caller by at most the timeout per event. Events that
//! cannot be delivered in time are dropped and counted.

use crate::models::{
    parse_quantity, Event, Pod, EVICTED_REASON, OOM_KILLED_REASON, RESOURCE_MEMORY,
};
use crate::observability::{self, DropReason, RecommenderMetrics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TryRecvError, TrySendError};
use tracing::{debug, warn};

/// Default channel buffer size for OOM events
const DEFAULT_CHANNEL_CAPACITY: usize = 5000;

/// Default time a send may wait for the consumer
const DEFAULT_SEND_TIMEOUT_MS: u64 = 1000;

/// Eviction event annotations written by the kubelet
const OFFENDING_CONTAINERS_ANNOTATION: &str = "offending_containers";
const OFFENDING_CONTAINERS_USAGE_ANNOTATION: &str = "offending_containers_usage";
const STARVED_RESOURCE_ANNOTATION: &str = "starved_resource";

/// A container killed for exceeding its memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OomInfo {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    /// Memory request in bytes at the time of the kill
    pub memory_request: u64,
    /// When the container terminated
    pub timestamp: DateTime<Utc>,
}

/// Configuration for OOM event delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverConfig {
    /// Channel buffer size; bursts up to this size never block the caller
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Maximum time to wait for channel space before dropping an event
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_send_timeout_ms() -> u64 {
    DEFAULT_SEND_TIMEOUT_MS
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
        }
    }
}

impl ObserverConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Publishes OOM kills observed in pod updates
///
/// The receiving half of the channel is returned by [`OomObserver::new`]; the
/// observer never closes it. Pod-update dispatchers should call
/// [`on_update`](Self::on_update) from a task that may wait, use
/// [`spawn_on_update`](Self::spawn_on_update) to hand the work off, or use
/// [`try_on_update`](Self::try_on_update) when they must never wait.
pub struct OomObserver {
    sender: mpsc::Sender<OomInfo>,
    send_timeout: Duration,
    metrics: RecommenderMetrics,
    dropped: AtomicU64,
}

impl OomObserver {
    /// Create an observer and the channel it publishes on
    pub fn new(config: &ObserverConfig) -> (Self, mpsc::Receiver<OomInfo>) {
        let (sender, receiver) = mpsc::channel(config.channel_capacity.max(1));
        let observer = Self {
            sender,
            send_timeout: config.send_timeout(),
            metrics: RecommenderMetrics::new(),
            dropped: AtomicU64::new(0),
        };
        (observer, receiver)
    }

    /// Diff two snapshots of a pod and publish every OOM kill found
    ///
    /// Waits up to the configured send timeout per event for channel space.
    /// Returns the number of events delivered.
    pub async fn on_update(&self, old_pod: &Pod, new_pod: &Pod) -> usize {
        let mut delivered = 0;
        for info in self.detect(old_pod, new_pod) {
            if self.deliver(info).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Like [`on_update`](Self::on_update) but never waits
    ///
    /// Events that do not fit into the channel are dropped and counted.
    pub fn try_on_update(&self, old_pod: &Pod, new_pod: &Pod) -> usize {
        let mut delivered = 0;
        for info in self.detect(old_pod, new_pod) {
            if self.try_deliver(info) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Run [`on_update`](Self::on_update) on its own task
    ///
    /// Keeps the dispatch loop free at the cost of one task per update.
    pub fn spawn_on_update(
        self: &Arc<Self>,
        old_pod: Pod,
        new_pod: Pod,
    ) -> tokio::task::JoinHandle<usize> {
        let observer = Arc::clone(self);
        tokio::spawn(async move { observer.on_update(&old_pod, &new_pod).await })
    }

    /// Publish memory-pressure evictions reported by the kubelet as OOM events
    ///
    /// Returns the number of events delivered.
    pub async fn on_eviction(&self, event: &Event) -> usize {
        let mut delivered = 0;
        for info in parse_eviction_event(event) {
            self.metrics.inc_eviction_ooms_observed();
            observability::log_oom_detected(&info, "eviction");
            if self.deliver(info).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of events this observer failed to deliver
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn detect(&self, old_pod: &Pod, new_pod: &Pod) -> Vec<OomInfo> {
        let ooms = detect_ooms(old_pod, new_pod);
        for info in &ooms {
            self.metrics.inc_ooms_observed();
            observability::log_oom_detected(info, "pod_update");
        }
        ooms
    }

    async fn deliver(&self, info: OomInfo) -> bool {
        match self.sender.send_timeout(info, self.send_timeout).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(info)) => {
                self.record_drop(&info, DropReason::Timeout);
                false
            }
            Err(SendTimeoutError::Closed(info)) => {
                self.record_drop(&info, DropReason::Closed);
                false
            }
        }
    }

    fn try_deliver(&self, info: OomInfo) -> bool {
        match self.sender.try_send(info) {
            Ok(()) => true,
            Err(TrySendError::Full(info)) => {
                self.record_drop(&info, DropReason::Full);
                false
            }
            Err(TrySendError::Closed(info)) => {
                self.record_drop(&info, DropReason::Closed);
                false
            }
        }
    }

    fn record_drop(&self, info: &OomInfo, reason: DropReason) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.metrics.inc_oom_events_dropped(reason);
        observability::log_oom_dropped(info, reason);
    }
}

/// OOM kills that happened between two snapshots of the same pod
///
/// Containers missing from either snapshot, containers whose restart count
/// did not increase and terminations for other reasons yield nothing.
pub fn detect_ooms(old_pod: &Pod, new_pod: &Pod) -> Vec<OomInfo> {
    let mut ooms = Vec::new();

    for new_status in &new_pod.status.container_statuses {
        let Some(old_status) = old_pod.container_status(&new_status.name) else {
            continue;
        };
        if new_status.restart_count <= old_status.restart_count {
            continue;
        }
        let Some(terminated) = new_status.last_state.terminated.as_ref() else {
            continue;
        };
        if terminated.reason != OOM_KILLED_REASON {
            continue;
        }

        ooms.push(OomInfo {
            namespace: new_pod.metadata.namespace.clone(),
            pod: new_pod.metadata.name.clone(),
            container: new_status.name.clone(),
            memory_request: memory_request(new_pod, &new_status.name),
            timestamp: terminated.finished_at,
        });
    }

    ooms
}

/// Declared memory request of a container in bytes, 0 when absent
fn memory_request(pod: &Pod, container_name: &str) -> u64 {
    let Some(quantity) = pod
        .container(container_name)
        .and_then(|c| c.resources.requests.get(RESOURCE_MEMORY))
    else {
        return 0;
    };

    match quantity.value() {
        Some(bytes) if bytes > 0.0 => bytes.round() as u64,
        Some(_) => 0,
        None => {
            warn!(
                namespace = %pod.metadata.namespace,
                pod_name = %pod.metadata.name,
                container = %container_name,
                quantity = %quantity.0,
                "Unparsable memory request, using 0"
            );
            0
        }
    }
}

/// OOM events encoded in a kubelet eviction event
///
/// Only `Evicted` events about pods are considered. The three annotations
/// are parallel comma-separated lists; entries whose starved resource is not
/// memory are skipped, and mismatched list lengths discard the whole event.
pub fn parse_eviction_event(event: &Event) -> Vec<OomInfo> {
    if event.reason != EVICTED_REASON || event.involved_object.kind != "Pod" {
        return Vec::new();
    }

    let containers = split_annotation(event, OFFENDING_CONTAINERS_ANNOTATION);
    let usages = split_annotation(event, OFFENDING_CONTAINERS_USAGE_ANNOTATION);
    let starved = split_annotation(event, STARVED_RESOURCE_ANNOTATION);

    if containers.len() != usages.len() || containers.len() != starved.len() {
        debug!(
            pod_name = %event.involved_object.name,
            "Eviction event annotations have mismatched lengths, skipping"
        );
        return Vec::new();
    }

    let timestamp = event.metadata.creation_timestamp.unwrap_or_else(Utc::now);
    let mut ooms = Vec::new();

    for ((container, usage), resource) in containers.iter().zip(&usages).zip(&starved) {
        if resource.trim() != RESOURCE_MEMORY {
            continue;
        }
        let Some(bytes) = parse_quantity(usage) else {
            warn!(
                pod_name = %event.involved_object.name,
                container = %container,
                usage = %usage,
                "Cannot parse container usage from eviction event"
            );
            continue;
        };

        ooms.push(OomInfo {
            namespace: event.involved_object.namespace.clone(),
            pod: event.involved_object.name.clone(),
            container: container.trim().to_string(),
            memory_request: bytes.max(0.0).round() as u64,
            timestamp,
        });
    }

    ooms
}

fn split_annotation<'a>(event: &'a Event, key: &str) -> Vec<&'a str> {
    event
        .metadata
        .annotations
        .get(key)
        .map(|value| value.split(',').collect())
        .unwrap_or_default()
}

/// Take every OOM event already waiting on the channel without blocking
///
/// Intended for a feeder loop that folds pending OOMs into histograms once
/// per cycle, alongside its regular sample ingestion.
pub fn drain_observed_ooms(receiver: &mut mpsc::Receiver<OomInfo>) -> Vec<OomInfo> {
    let mut pending = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(info) => pending.push(info),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
    pending
}
