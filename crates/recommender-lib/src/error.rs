//! Error types for the recommender core

use thiserror::Error;

/// Invalid bucketing scheme parameters
///
/// These values usually come from user-editable configuration, so they are
/// reported to the caller instead of panicking.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BucketingError {
    #[error("max value must be positive, got {0}")]
    NonPositiveMaxValue(f64),

    #[error("bucket size must be positive, got {0}")]
    NonPositiveBucketSize(f64),

    #[error("first bucket size must be positive, got {0}")]
    NonPositiveFirstBucketSize(f64),

    #[error("ratio must be greater than 1, got {0}")]
    RatioNotAboveOne(f64),

    #[error("parameters need {count} buckets, at most {max} are allowed")]
    TooManyBuckets { count: f64, max: usize },
}
