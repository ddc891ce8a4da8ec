//! Weighted histogram with approximate percentile queries
//!
//! Samples are accumulated per bucket of a [`BucketingScheme`]. Weights may be
//! negative, which is how callers age out samples they added earlier: a
//! bucket whose weight would drop to zero or below is cleared entirely.

use super::bucketing::BucketingScheme;
use std::sync::Arc;
use tracing::debug;

/// Weighted distribution over a bucketed value range
///
/// `min_bucket..=max_bucket` always brackets every non-empty bucket. The
/// bracket may contain empty buckets too; it is tightened lazily when a
/// boundary bucket is cleared.
///
/// Not synchronized: a single owner must serialize all calls.
#[derive(Debug, Clone)]
pub struct Histogram {
    scheme: Arc<BucketingScheme>,
    /// Accumulated weight per bucket, each >= 0
    buckets: Vec<f64>,
    /// Sum of `buckets`, maintained incrementally
    total_weight: f64,
    min_bucket: usize,
    max_bucket: usize,
}

impl Histogram {
    /// Create an empty histogram sharing the given scheme
    pub fn new(scheme: Arc<BucketingScheme>) -> Self {
        let num_buckets = scheme.num_buckets();
        Self {
            scheme,
            buckets: vec![0.0; num_buckets],
            total_weight: 0.0,
            min_bucket: num_buckets - 1,
            max_bucket: 0,
        }
    }

    /// Add `weight` to the bucket containing `value`
    ///
    /// If the bucket's weight would become zero or negative, the bucket is
    /// cleared and the rest of the delta is discarded.
    pub fn add_sample(&mut self, value: f64, weight: f64) {
        let bucket = self.scheme.find_bucket(value);

        if self.buckets[bucket] + weight <= 0.0 {
            self.clear_bucket(bucket);
        } else {
            self.buckets[bucket] += weight;
            self.total_weight += weight;
            self.min_bucket = self.min_bucket.min(bucket);
            self.max_bucket = self.max_bucket.max(bucket);
        }
    }

    /// Remove `weight` previously added for `value`
    pub fn subtract_sample(&mut self, value: f64, weight: f64) {
        self.add_sample(value, -weight);
    }

    /// Approximate value below which fraction `percentile` of the weight lies
    ///
    /// Returns the lower boundary of the first bucket at which the cumulative
    /// weight reaches `percentile * total_weight`, so the estimate is rounded
    /// down to a bucket start. Arguments outside `[0, 1]` are clamped.
    /// An empty histogram yields 0.
    pub fn percentile(&self, percentile: f64) -> f64 {
        if self.is_empty() {
            return 0.0;
        }

        let threshold = percentile.clamp(0.0, 1.0) * self.total_weight;
        let mut partial_sum = 0.0;
        let mut bucket = self.min_bucket;
        while bucket < self.max_bucket {
            partial_sum += self.buckets[bucket];
            if partial_sum >= threshold {
                break;
            }
            bucket += 1;
        }

        self.scheme.bucket_start(bucket)
    }

    /// True when no weight is held
    pub fn is_empty(&self) -> bool {
        self.total_weight == 0.0
    }

    /// Sum of all bucket weights
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Weight held by a single bucket
    ///
    /// # Panics
    /// Panics if `bucket` is not below [`num_buckets`](Self::num_buckets).
    pub fn bucket_weight(&self, bucket: usize) -> f64 {
        self.buckets[bucket]
    }

    /// Scheme the histogram was built with
    pub fn scheme(&self) -> &Arc<BucketingScheme> {
        &self.scheme
    }

    /// Number of buckets in the underlying scheme
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Add every bucket of `other` into this histogram
    ///
    /// # Panics
    /// Panics if the two histograms use different bucketing schemes.
    pub fn merge(&mut self, other: &Histogram) {
        assert!(
            Arc::ptr_eq(&self.scheme, &other.scheme) || *self.scheme == *other.scheme,
            "cannot merge histograms with different bucketing schemes"
        );

        if other.is_empty() {
            return;
        }

        for bucket in other.min_bucket..=other.max_bucket {
            let weight = other.buckets[bucket];
            if weight > 0.0 {
                self.buckets[bucket] += weight;
                self.total_weight += weight;
                self.min_bucket = self.min_bucket.min(bucket);
                self.max_bucket = self.max_bucket.max(bucket);
            }
        }
    }

    fn clear_bucket(&mut self, bucket: usize) {
        let previous = self.buckets[bucket];
        if previous > 0.0 {
            debug!(bucket = bucket, weight = previous, "Clearing histogram bucket");
        }
        self.total_weight -= previous;
        self.buckets[bucket] = 0.0;
        self.tighten_bracket();
    }

    /// Move the bracket inward past empty boundary buckets
    fn tighten_bracket(&mut self) {
        let last = self.buckets.len() - 1;

        while self.min_bucket < last && self.buckets[self.min_bucket] == 0.0 {
            self.min_bucket += 1;
        }
        while self.max_bucket > 0 && self.buckets[self.max_bucket] == 0.0 {
            self.max_bucket -= 1;
        }

        let occupied = self.min_bucket <= self.max_bucket && self.buckets[self.min_bucket] > 0.0;
        if !occupied {
            // Nothing left; drop any float residue in the running total
            self.total_weight = 0.0;
            self.min_bucket = last;
            self.max_bucket = 0;
        }
    }
}
