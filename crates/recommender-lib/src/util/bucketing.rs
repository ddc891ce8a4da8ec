//! Bucketing schemes for histograms
//!
//! A scheme maps a value to a bucket index and a bucket index back to its
//! lower boundary. Two schemes are supported:
//! - Linear: uniform absolute resolution, bucket `i` covers `[i*size, (i+1)*size)`
//! - Exponential: uniform relative resolution, bucket `n >= 1` covers
//!   `[first*ratio^(n-1), first*ratio^n)` and bucket 0 covers `[0, first)`

use crate::error::BucketingError;
use serde::{Deserialize, Serialize};

/// Upper bound on the bucket count of any scheme
///
/// Histograms allocate one slot per bucket up front, so parameters asking for
/// more than this are rejected at construction.
pub const MAX_BUCKETS: usize = 1 << 20;

/// Fixed-size buckets starting at zero
#[derive(Debug, Clone, PartialEq)]
pub struct LinearScheme {
    bucket_size: f64,
    num_buckets: usize,
}

impl LinearScheme {
    /// Width of every bucket
    pub fn bucket_size(&self) -> f64 {
        self.bucket_size
    }
}

/// Buckets growing geometrically after a fixed-size first bucket
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialScheme {
    first_bucket_size: f64,
    ratio: f64,
    num_buckets: usize,
}

impl ExponentialScheme {
    /// Width of bucket 0 (also the start of bucket 1)
    pub fn first_bucket_size(&self) -> f64 {
        self.first_bucket_size
    }

    /// Growth factor between consecutive bucket boundaries
    pub fn ratio(&self) -> f64 {
        self.ratio
    }
}

/// Strategy for splitting the value range into histogram buckets
///
/// Schemes are immutable once built. `find_bucket` is total: values below the
/// first boundary land in bucket 0 and values at or above the last boundary
/// land in the last bucket.
#[derive(Debug, Clone, PartialEq)]
pub enum BucketingScheme {
    Linear(LinearScheme),
    Exponential(ExponentialScheme),
}

impl BucketingScheme {
    /// Create a linear scheme covering `[0, max_value)` with buckets of `bucket_size`
    pub fn linear(max_value: f64, bucket_size: f64) -> Result<Self, BucketingError> {
        if !is_positive(max_value) {
            return Err(BucketingError::NonPositiveMaxValue(max_value));
        }
        if !is_positive(bucket_size) {
            return Err(BucketingError::NonPositiveBucketSize(bucket_size));
        }

        let num_buckets = checked_bucket_count((max_value / bucket_size).ceil())?;

        Ok(Self::Linear(LinearScheme {
            bucket_size,
            num_buckets,
        }))
    }

    /// Create an exponential scheme covering `[0, max_value)`
    ///
    /// # Arguments
    /// * `max_value` - Upper end of the covered range
    /// * `first_bucket_size` - Width of bucket 0
    /// * `ratio` - Ratio between consecutive bucket boundaries, must exceed 1
    pub fn exponential(
        max_value: f64,
        first_bucket_size: f64,
        ratio: f64,
    ) -> Result<Self, BucketingError> {
        if !is_positive(max_value) {
            return Err(BucketingError::NonPositiveMaxValue(max_value));
        }
        if !is_positive(first_bucket_size) {
            return Err(BucketingError::NonPositiveFirstBucketSize(first_bucket_size));
        }
        if !(ratio > 1.0 && ratio.is_finite()) {
            return Err(BucketingError::RatioNotAboveOne(ratio));
        }

        let exponent = ((max_value / first_bucket_size).ln() / ratio.ln()).ceil();
        // max_value below first_bucket_size yields a negative exponent
        let num_buckets = checked_bucket_count((exponent + 1.0).max(1.0))?;

        Ok(Self::Exponential(ExponentialScheme {
            first_bucket_size,
            ratio,
            num_buckets,
        }))
    }

    /// Number of buckets, fixed at construction and never above [`MAX_BUCKETS`]
    ///
    /// `linear(5.0, 0.3)` has 17 buckets; `exponential(100.0, 10.0, 2.0)` has 5.
    pub fn num_buckets(&self) -> usize {
        match self {
            Self::Linear(s) => s.num_buckets,
            Self::Exponential(s) => s.num_buckets,
        }
    }

    /// Index of the bucket containing `value`, clamped to `[0, num_buckets - 1]`
    ///
    /// NaN and negative values map to bucket 0, `+inf` to the last bucket.
    pub fn find_bucket(&self, value: f64) -> usize {
        let raw = match self {
            Self::Linear(s) => (value / s.bucket_size).floor(),
            Self::Exponential(s) => {
                // Also catches NaN
                if !(value >= s.first_bucket_size) {
                    return 0;
                }
                ((value / s.first_bucket_size).ln() / s.ratio.ln()).floor() + 1.0
            }
        };

        clamp_index(raw, self.num_buckets())
    }

    /// Inclusive lower boundary of `bucket`
    ///
    /// Callers must pass an index in `[0, num_buckets - 1]`, such as one
    /// returned by [`find_bucket`](Self::find_bucket). The result for larger
    /// indices is unspecified.
    pub fn bucket_start(&self, bucket: usize) -> f64 {
        match self {
            Self::Linear(s) => bucket as f64 * s.bucket_size,
            Self::Exponential(s) => {
                if bucket == 0 {
                    0.0
                } else {
                    s.first_bucket_size * s.ratio.powi(bucket as i32 - 1)
                }
            }
        }
    }
}

/// Serializable description of a bucketing scheme, as found in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HistogramOptions {
    Linear {
        max_value: f64,
        bucket_size: f64,
    },
    Exponential {
        max_value: f64,
        first_bucket_size: f64,
        ratio: f64,
    },
}

impl HistogramOptions {
    /// Default CPU options: cores from 0.01 up to 1000 with 5% resolution
    pub fn default_cpu() -> Self {
        Self::Exponential {
            max_value: 1000.0,
            first_bucket_size: 0.01,
            ratio: 1.05,
        }
    }

    /// Default memory options: bytes from 10MB up to 1TB with 5% resolution
    pub fn default_memory() -> Self {
        Self::Exponential {
            max_value: 1e12,
            first_bucket_size: 1e7,
            ratio: 1.05,
        }
    }

    /// Validate the options and build the scheme they describe
    pub fn build(&self) -> Result<BucketingScheme, BucketingError> {
        match *self {
            Self::Linear {
                max_value,
                bucket_size,
            } => BucketingScheme::linear(max_value, bucket_size),
            Self::Exponential {
                max_value,
                first_bucket_size,
                ratio,
            } => BucketingScheme::exponential(max_value, first_bucket_size, ratio),
        }
    }
}

fn is_positive(value: f64) -> bool {
    value > 0.0 && value.is_finite()
}

fn checked_bucket_count(count: f64) -> Result<usize, BucketingError> {
    // Also catches an overflowed (infinite) count
    if !(count <= MAX_BUCKETS as f64) {
        return Err(BucketingError::TooManyBuckets {
            count,
            max: MAX_BUCKETS,
        });
    }
    Ok((count as usize).max(1))
}

fn clamp_index(raw: f64, num_buckets: usize) -> usize {
    let last = num_buckets - 1;
    if !(raw > 0.0) {
        0
    } else if raw >= last as f64 {
        last
    } else {
        raw as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_linear_scheme_boundaries() {
        let scheme = BucketingScheme::linear(5.0, 0.3).unwrap();

        assert_eq!(scheme.num_buckets(), 17);
        assert_close(scheme.bucket_start(0), 0.0);
        assert_close(scheme.bucket_start(16), 4.8);
    }

    #[test]
    fn test_linear_find_bucket_clamps() {
        let scheme = BucketingScheme::linear(5.0, 0.3).unwrap();

        assert_eq!(scheme.find_bucket(-1.0), 0);
        assert_eq!(scheme.find_bucket(0.0), 0);
        assert_eq!(scheme.find_bucket(1.3), 4);
        assert_eq!(scheme.find_bucket(100.0), 16);
        assert_eq!(scheme.find_bucket(f64::NAN), 0);
        assert_eq!(scheme.find_bucket(f64::INFINITY), 16);
    }

    #[test]
    fn test_exponential_scheme_boundaries() {
        let scheme = BucketingScheme::exponential(100.0, 10.0, 2.0).unwrap();

        assert_eq!(scheme.num_buckets(), 5);
        let starts: Vec<f64> = (0..5).map(|b| scheme.bucket_start(b)).collect();
        for (actual, expected) in starts.iter().zip([0.0, 10.0, 20.0, 40.0, 80.0]) {
            assert_close(*actual, expected);
        }
    }

    #[test]
    fn test_exponential_find_bucket_clamps() {
        let scheme = BucketingScheme::exponential(100.0, 10.0, 2.0).unwrap();

        assert_eq!(scheme.find_bucket(-1.0), 0);
        assert_eq!(scheme.find_bucket(9.99), 0);
        assert_eq!(scheme.find_bucket(10.0), 1);
        assert_eq!(scheme.find_bucket(20.0), 2);
        assert_eq!(scheme.find_bucket(100.0), 4);
        assert_eq!(scheme.find_bucket(1e9), 4);
        assert_eq!(scheme.find_bucket(f64::NAN), 0);
    }

    #[test]
    fn test_boundaries_are_monotonic() {
        let schemes = [
            BucketingScheme::linear(1000.0, 7.5).unwrap(),
            BucketingScheme::exponential(1e12, 1e7, 1.05).unwrap(),
        ];

        for scheme in &schemes {
            for b in 1..scheme.num_buckets() {
                assert!(scheme.bucket_start(b) >= scheme.bucket_start(b - 1));
            }
        }
    }

    #[test]
    fn test_small_max_value_keeps_one_bucket() {
        let linear = BucketingScheme::linear(0.1, 1.0).unwrap();
        assert_eq!(linear.num_buckets(), 1);

        let exponential = BucketingScheme::exponential(5.0, 10.0, 2.0).unwrap();
        assert_eq!(exponential.num_buckets(), 1);
        assert_eq!(exponential.find_bucket(50.0), 0);
    }

    #[test]
    fn test_invalid_linear_parameters() {
        assert_eq!(
            BucketingScheme::linear(0.0, 1.0),
            Err(BucketingError::NonPositiveMaxValue(0.0))
        );
        assert_eq!(
            BucketingScheme::linear(10.0, -1.0),
            Err(BucketingError::NonPositiveBucketSize(-1.0))
        );
        assert!(BucketingScheme::linear(f64::INFINITY, 1.0).is_err());
    }

    #[test]
    fn test_invalid_exponential_parameters() {
        assert_eq!(
            BucketingScheme::exponential(-5.0, 1.0, 2.0),
            Err(BucketingError::NonPositiveMaxValue(-5.0))
        );
        assert_eq!(
            BucketingScheme::exponential(100.0, 0.0, 2.0),
            Err(BucketingError::NonPositiveFirstBucketSize(0.0))
        );
        assert_eq!(
            BucketingScheme::exponential(100.0, 1.0, 1.0),
            Err(BucketingError::RatioNotAboveOne(1.0))
        );
        assert!(BucketingScheme::exponential(100.0, 1.0, f64::NAN).is_err());
    }

    #[test]
    fn test_invalid_linear_bucket_count() {
        assert_eq!(
            BucketingScheme::linear(1e20, 1e-20),
            Err(BucketingError::TooManyBuckets {
                count: (1e20_f64 / 1e-20).ceil(),
                max: MAX_BUCKETS,
            })
        );
        // Quotient overflows to infinity
        assert!(matches!(
            BucketingScheme::linear(1e300, 1e-300),
            Err(BucketingError::TooManyBuckets { .. })
        ));

        let at_cap = BucketingScheme::linear(MAX_BUCKETS as f64, 1.0).unwrap();
        assert_eq!(at_cap.num_buckets(), MAX_BUCKETS);
        assert!(BucketingScheme::linear(MAX_BUCKETS as f64 + 1.0, 1.0).is_err());
    }

    #[test]
    fn test_invalid_exponential_bucket_count() {
        assert!(matches!(
            BucketingScheme::exponential(1e12, 1e7, 1.0 + 1e-12),
            Err(BucketingError::TooManyBuckets { max: MAX_BUCKETS, .. })
        ));
        assert!(matches!(
            BucketingScheme::exponential(f64::MAX, f64::MIN_POSITIVE, 1.0 + 1e-9),
            Err(BucketingError::TooManyBuckets { .. })
        ));
    }

    #[test]
    fn test_options_build() {
        let options = HistogramOptions::Linear {
            max_value: 5.0,
            bucket_size: 0.3,
        };
        assert_eq!(options.build().unwrap().num_buckets(), 17);

        let cpu = HistogramOptions::default_cpu().build().unwrap();
        assert!(matches!(cpu, BucketingScheme::Exponential(_)));
        assert_eq!(cpu.find_bucket(0.001), 0);

        let bad = HistogramOptions::Exponential {
            max_value: 100.0,
            first_bucket_size: 1.0,
            ratio: 0.5,
        };
        assert_eq!(bad.build(), Err(BucketingError::RatioNotAboveOne(0.5)));
    }

    #[test]
    fn test_options_deserialize_tagged() {
        let options: HistogramOptions = serde_json::from_str(
            r#"{"kind": "exponential", "max_value": 100.0, "first_bucket_size": 10.0, "ratio": 2.0}"#,
        )
        .unwrap();

        assert_eq!(
            options,
            HistogramOptions::Exponential {
                max_value: 100.0,
                first_bucket_size: 10.0,
                ratio: 2.0,
            }
        );
    }
}
