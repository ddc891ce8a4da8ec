//! Folding OOM events into memory histograms
//!
//! An OOM kill means the container needed more memory than it was given, so
//! the event is recorded as an artificial memory sample above the request.

use super::observer::OomInfo;
use crate::util::Histogram;
use serde::{Deserialize, Serialize};

/// Default multiplier applied to the memory request on OOM
const DEFAULT_BUMP_UP_RATIO: f64 = 1.2;

/// Default minimal increase over the memory request (100Mi)
const DEFAULT_MIN_BUMP_UP_BYTES: f64 = 100.0 * 1024.0 * 1024.0;

/// Policy for turning an OOM kill into a memory sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OomBump {
    /// Memory needed is at least `request * bump_up_ratio`
    #[serde(default = "default_bump_up_ratio")]
    pub bump_up_ratio: f64,

    /// Memory needed is at least `request + min_bump_up_bytes`
    #[serde(default = "default_min_bump_up_bytes")]
    pub min_bump_up_bytes: f64,
}

fn default_bump_up_ratio() -> f64 {
    DEFAULT_BUMP_UP_RATIO
}

fn default_min_bump_up_bytes() -> f64 {
    DEFAULT_MIN_BUMP_UP_BYTES
}

impl Default for OomBump {
    fn default() -> Self {
        Self {
            bump_up_ratio: DEFAULT_BUMP_UP_RATIO,
            min_bump_up_bytes: DEFAULT_MIN_BUMP_UP_BYTES,
        }
    }
}

impl OomBump {
    /// Memory in bytes the killed container is assumed to have needed
    pub fn memory_needed(&self, info: &OomInfo) -> f64 {
        let request = info.memory_request as f64;
        (request * self.bump_up_ratio).max(request + self.min_bump_up_bytes)
    }

    /// Record the OOM as one sample of `weight` in a memory histogram
    ///
    /// The histogram must only be touched by its owning aggregation task, so
    /// this has to run on that task, serialized with regular samples.
    pub fn record(&self, histogram: &mut Histogram, info: &OomInfo, weight: f64) -> f64 {
        let memory = self.memory_needed(info);
        histogram.add_sample(memory, weight);
        memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::BucketingScheme;
    use chrono::Utc;
    use std::sync::Arc;

    const MIB: f64 = 1024.0 * 1024.0;

    fn oom_with_request(memory_request: u64) -> OomInfo {
        OomInfo {
            namespace: "default".to_string(),
            pod: "pod-1".to_string(),
            container: "app".to_string(),
            memory_request,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_min_bump_dominates_small_requests() {
        let bump = OomBump::default();
        let needed = bump.memory_needed(&oom_with_request((100.0 * MIB) as u64));

        assert_eq!(needed, 200.0 * MIB);
    }

    #[test]
    fn test_ratio_dominates_large_requests() {
        let bump = OomBump::default();
        let needed = bump.memory_needed(&oom_with_request((1000.0 * MIB) as u64));

        assert!((needed - 1200.0 * MIB).abs() < 1.0);
    }

    #[test]
    fn test_zero_request_uses_min_bump() {
        let bump = OomBump::default();
        assert_eq!(bump.memory_needed(&oom_with_request(0)), 100.0 * MIB);
    }

    #[test]
    fn test_record_pushes_percentile_up() {
        let scheme = Arc::new(BucketingScheme::linear(4096.0 * MIB, 64.0 * MIB).unwrap());
        let mut histogram = Histogram::new(scheme);
        histogram.add_sample(256.0 * MIB, 1.0);
        assert_eq!(histogram.percentile(0.95), 256.0 * MIB);

        let bump = OomBump {
            bump_up_ratio: 2.0,
            min_bump_up_bytes: 0.0,
        };
        let recorded = bump.record(&mut histogram, &oom_with_request((512.0 * MIB) as u64), 10.0);

        assert_eq!(recorded, 1024.0 * MIB);
        assert_eq!(histogram.percentile(0.95), 1024.0 * MIB);
    }
}
