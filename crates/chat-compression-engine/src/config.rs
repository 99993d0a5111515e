//! Engine configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use chat_compression_core::{CompressionError, Result};

use crate::policy::CompressionPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Filter ordering in the host pipeline; lower runs first.
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// Message count at which a completed response schedules a new summary.
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,

    /// Leading messages always forwarded verbatim (the first carries the summary).
    #[serde(default = "default_keep_first")]
    pub keep_first: usize,

    /// Trailing messages always forwarded verbatim.
    #[serde(default = "default_keep_last")]
    pub keep_last: usize,

    /// Model used for summaries. Empty or unset means the conversation's model.
    #[serde(default)]
    pub summary_model: Option<String>,

    #[serde(default = "default_max_summary_tokens")]
    pub max_summary_tokens: u32,

    #[serde(default = "default_summary_temperature")]
    pub summary_temperature: f32,

    #[serde(default = "default_summary_timeout_secs")]
    pub summary_timeout_secs: u64,

    #[serde(default = "default_debug_mode")]
    pub debug_mode: bool,
}

fn default_priority() -> i32 {
    10
}

fn default_compression_threshold() -> usize {
    15
}

fn default_keep_first() -> usize {
    1
}

fn default_keep_last() -> usize {
    6
}

fn default_max_summary_tokens() -> u32 {
    4000
}

fn default_summary_temperature() -> f32 {
    0.3
}

fn default_summary_timeout_secs() -> u64 {
    120
}

fn default_debug_mode() -> bool {
    true
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            compression_threshold: default_compression_threshold(),
            keep_first: default_keep_first(),
            keep_last: default_keep_last(),
            summary_model: None,
            max_summary_tokens: default_max_summary_tokens(),
            summary_temperature: default_summary_temperature(),
            summary_timeout_secs: default_summary_timeout_secs(),
            debug_mode: default_debug_mode(),
        }
    }
}

impl CompressionConfig {
    pub fn new(compression_threshold: usize, keep_first: usize, keep_last: usize) -> Self {
        Self {
            compression_threshold,
            keep_first,
            keep_last,
            ..Default::default()
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| CompressionError::Config(format!("invalid YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&yaml)
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_summary_model(mut self, model: impl Into<String>) -> Self {
        self.summary_model = Some(model.into());
        self
    }

    pub fn with_max_summary_tokens(mut self, tokens: u32) -> Self {
        self.max_summary_tokens = tokens;
        self
    }

    pub fn with_summary_temperature(mut self, temperature: f32) -> Self {
        self.summary_temperature = temperature;
        self
    }

    pub fn with_summary_timeout(mut self, timeout: Duration) -> Self {
        self.summary_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.policy()?;

        if self.max_summary_tokens == 0 {
            return Err(CompressionError::Config(
                "max_summary_tokens must be at least 1".to_string(),
            ));
        }

        if !self.summary_temperature.is_finite() || !(0.0..=2.0).contains(&self.summary_temperature)
        {
            return Err(CompressionError::Config(format!(
                "summary_temperature must be within [0, 2], got {}",
                self.summary_temperature
            )));
        }

        if self.summary_timeout_secs == 0 {
            return Err(CompressionError::Config(
                "summary_timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn policy(&self) -> Result<CompressionPolicy> {
        CompressionPolicy::new(self.compression_threshold, self.keep_first, self.keep_last)
    }

    pub fn summary_model(&self) -> Option<&str> {
        self.summary_model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    pub fn summary_timeout(&self) -> Duration {
        Duration::from_secs(self.summary_timeout_secs)
    }
}
