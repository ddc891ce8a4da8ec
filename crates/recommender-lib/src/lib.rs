//! Statistical core for container resource recommendations
//!
//! This crate provides the building blocks the recommender aggregates usage with:
//! - Weighted histograms over linear or exponential bucketing schemes
//! - A fixed-capacity circular buffer for per-period history
//! - An OOM observer that turns pod updates into OOM events
//! - Configuration loading and observability helpers

pub mod config;
pub mod error;
pub mod models;
pub mod observability;
pub mod oom;
pub mod util;

pub use config::RecommenderConfig;
pub use error::BucketingError;
pub use observability::RecommenderMetrics;
pub use oom::{ObserverConfig, OomBump, OomInfo, OomObserver};
pub use util::{BucketingScheme, CircularBuffer, Histogram, HistogramOptions};
