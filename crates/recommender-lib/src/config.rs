//! Recommender core configuration

use crate::oom::{ObserverConfig, OomBump};
use crate::util::{BucketingScheme, HistogramOptions};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Environment variable prefix, e.g. `RECOMMENDER__HISTORY_PERIODS=14`
const ENV_PREFIX: &str = "RECOMMENDER";

/// Recommender core configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RecommenderConfig {
    /// Bucketing for CPU usage histograms (cores)
    #[serde(default = "HistogramOptions::default_cpu")]
    pub cpu_histogram: HistogramOptions,

    /// Bucketing for memory peak histograms (bytes)
    #[serde(default = "HistogramOptions::default_memory")]
    pub memory_histogram: HistogramOptions,

    /// Number of aggregation periods kept per container
    #[serde(default = "default_history_periods")]
    pub history_periods: usize,

    /// How OOM kills are folded into memory histograms
    #[serde(default)]
    pub oom_bump: OomBump,

    /// OOM event delivery
    #[serde(default)]
    pub observer: ObserverConfig,
}

fn default_history_periods() -> usize {
    8
}

/// `RECOMMENDER__OBSERVER__SEND_TIMEOUT_MS` maps to `observer.send_timeout_ms`
fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            cpu_histogram: HistogramOptions::default_cpu(),
            memory_histogram: HistogramOptions::default_memory(),
            history_periods: default_history_periods(),
            oom_bump: OomBump::default(),
            observer: ObserverConfig::default(),
        }
    }
}

impl RecommenderConfig {
    /// Load configuration from environment only
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from an optional file overlaid with environment variables
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, environment())
    }

    /// Load from an optional file overlaid with the given environment source
    fn load_with_env(path: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(env)
            .build()
            .context("Failed to read recommender configuration")?;

        let config: Self = settings
            .try_deserialize()
            .context("Invalid recommender configuration")?;
        config.validate()?;

        Ok(config)
    }

    /// Check every value that would otherwise fail later at construction time
    pub fn validate(&self) -> Result<()> {
        self.cpu_scheme()?;
        self.memory_scheme()?;

        if self.history_periods == 0 {
            bail!("history_periods must be at least 1");
        }
        if self.observer.channel_capacity == 0 {
            bail!("observer.channel_capacity must be at least 1");
        }
        if !(self.oom_bump.bump_up_ratio >= 1.0) {
            bail!(
                "oom_bump.bump_up_ratio must be at least 1, got {}",
                self.oom_bump.bump_up_ratio
            );
        }
        if !(self.oom_bump.min_bump_up_bytes >= 0.0) {
            bail!(
                "oom_bump.min_bump_up_bytes must not be negative, got {}",
                self.oom_bump.min_bump_up_bytes
            );
        }

        Ok(())
    }

    /// Build the CPU bucketing scheme
    pub fn cpu_scheme(&self) -> Result<BucketingScheme> {
        self.cpu_histogram
            .build()
            .context("Invalid cpu_histogram options")
    }

    /// Build the memory bucketing scheme
    pub fn memory_scheme(&self) -> Result<BucketingScheme> {
        self.memory_histogram
            .build()
            .context("Invalid memory_histogram options")
    }
}
