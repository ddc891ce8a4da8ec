//! Histogram and windowing primitives
//!
//! None of these types synchronize internally. Each instance is expected to
//! be owned by a single aggregation task that serializes every call to it.

mod bucketing;
mod circular_buffer;
mod histogram;

pub use bucketing::{
    BucketingScheme, ExponentialScheme, HistogramOptions, LinearScheme, MAX_BUCKETS,
};
pub use circular_buffer::CircularBuffer;
pub use histogram::Histogram;
