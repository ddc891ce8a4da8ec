//! OOM detection for the memory recommendation pipeline
//!
//! This module provides:
//! - An observer that diffs pod snapshots and publishes OOM kills on a bounded channel
//! - Parsing of kubelet memory-pressure eviction events into OOM events
//! - The bump policy that folds an OOM event into a memory histogram

mod bump;
mod observer;


pub use bump::OomBump;
pub use observer::{
    detect_ooms, drain_observed_ooms, parse_eviction_event, ObserverConfig, OomInfo, OomObserver,
};
