//! # Simulation Configuration
//!
//! All settings are optional; a missing table or key falls back to the
//! defaults below.
//!
//! ```toml
//! [scheduler]
//! policy = "round_robin"     # or "shortest_remaining"
//! time_scale = 1000.0
//! seed = 42
//!
//! [burst]
//! min = 101
//! max = 1000
//!
//! [memory]
//! swap_overhead = 10.0
//! overflow = "evict_lru"      # or "spill_to_disk"
//! disk_path = "vm.txt"
//!
//! [trace]
//! output = "output.txt"
//! format = "text"             # or "json_lines"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::SimTime;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SimConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub burst: BurstConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub trace: TraceConfig,
}

/// Scheduling policy. Each one is a complete, self-consistent model: slot
/// count, burst consumption, finish tolerance and idle step all follow it
/// unless overridden.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Two processors, round-robin resumption, random burst consumption.
    #[default]
    RoundRobin,
    /// One processor, shortest remaining burst first, 10% decay per turn.
    ShortestRemaining,
}

impl Policy {
    pub fn default_processors(self) -> usize {
        match self {
            Policy::RoundRobin => 2,
            Policy::ShortestRemaining => 1,
        }
    }

    pub fn default_idle_step(self) -> SimTime {
        match self {
            Policy::RoundRobin => 1.0,
            Policy::ShortestRemaining => 0.01,
        }
    }

    pub fn default_finish_tolerance(self) -> SimTime {
        match self {
            Policy::RoundRobin => 0.0,
            Policy::ShortestRemaining => 0.01,
        }
    }
}

impl FromStr for Policy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" | "rr" => Ok(Policy::RoundRobin),
            "shortest_remaining" | "srt" => Ok(Policy::ShortestRemaining),
            other => Err(ConfigError::Invalid(format!("unknown scheduling policy '{}'", other))),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::RoundRobin => f.write_str("round_robin"),
            Policy::ShortestRemaining => f.write_str("shortest_remaining"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub policy: Policy,
    /// Processor slots; the policy decides when absent.
    #[serde(default)]
    pub processors: Option<usize>,
    #[serde(default)]
    pub idle_step: Option<SimTime>,
    /// Multiplier applied to arrival and burst times read from input.
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            processors: None,
            idle_step: None,
            time_scale: default_time_scale(),
            seed: None,
        }
    }
}

impl SchedulerConfig {
    pub fn processors(&self) -> usize {
        self.processors.unwrap_or_else(|| self.policy.default_processors())
    }

    pub fn idle_step(&self) -> SimTime {
        self.idle_step.unwrap_or_else(|| self.policy.default_idle_step())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BurstConfig {
    /// Lower bound of one random CPU draw, in time units.
    #[serde(default = "default_burst_min")]
    pub min: u32,
    #[serde(default = "default_burst_max")]
    pub max: u32,
    /// Fraction of the remaining burst consumed per turn by the decay model.
    #[serde(default = "default_decay")]
    pub decay: f64,
    #[serde(default)]
    pub finish_tolerance: Option<SimTime>,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            min: default_burst_min(),
            max: default_burst_max(),
            decay: default_decay(),
            finish_tolerance: None,
        }
    }
}

/// What a `Store` of an unknown variable does when main memory is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the least recently used record to disk and keep the new one in memory.
    #[default]
    EvictLru,
    /// Leave memory untouched and append the new record to disk.
    SpillToDisk,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemoryConfig {
    /// Main-memory capacity; overrides the memory-config input when set.
    #[serde(default)]
    pub capacity: Option<usize>,
    #[serde(default = "default_swap_overhead")]
    pub swap_overhead: SimTime,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    /// File mirror of the disk tier, truncated at the start of a run.
    #[serde(default)]
    pub disk_path: Option<PathBuf>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            swap_overhead: default_swap_overhead(),
            overflow: OverflowPolicy::default(),
            disk_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceFormat {
    #[default]
    Text,
    JsonLines,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TraceConfig {
    #[serde(default = "default_trace_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub format: TraceFormat,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            output: default_trace_output(),
            format: TraceFormat::default(),
            log_level: default_log_level(),
        }
    }
}

impl SimConfig {
    pub fn finish_tolerance(&self) -> SimTime {
        self.burst
            .finish_tolerance
            .unwrap_or_else(|| self.scheduler.policy.default_finish_tolerance())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.processors() == 0 {
            return Err(ConfigError::Invalid("scheduler.processors must be at least 1".into()));
        }
        if !(self.scheduler.idle_step() > 0.0 && self.scheduler.idle_step().is_finite()) {
            return Err(ConfigError::Invalid("scheduler.idle_step must be > 0".into()));
        }
        if !(self.scheduler.time_scale > 0.0 && self.scheduler.time_scale.is_finite()) {
            return Err(ConfigError::Invalid("scheduler.time_scale must be > 0".into()));
        }
        if self.burst.min == 0 || self.burst.min > self.burst.max {
            return Err(ConfigError::Invalid(format!(
                "burst range [{}, {}] is empty or starts at zero",
                self.burst.min, self.burst.max
            )));
        }
        if !(self.burst.decay > 0.0 && self.burst.decay <= 1.0) {
            return Err(ConfigError::Invalid("burst.decay must be in (0, 1]".into()));
        }
        if !(self.finish_tolerance() >= 0.0 && self.finish_tolerance().is_finite()) {
            return Err(ConfigError::Invalid("burst.finish_tolerance must be >= 0".into()));
        }
        if !(self.memory.swap_overhead >= 0.0 && self.memory.swap_overhead.is_finite()) {
            return Err(ConfigError::Invalid("memory.swap_overhead must be >= 0".into()));
        }
        if self.memory.capacity == Some(0) {
            return Err(ConfigError::Invalid("memory.capacity must be at least 1".into()));
        }
        Ok(())
    }
}

// Default value functions
fn default_time_scale() -> f64 { 1000.0 }
fn default_burst_min() -> u32 { 101 }
fn default_burst_max() -> u32 { 1000 }
fn default_decay() -> f64 { 0.1 }
fn default_swap_overhead() -> SimTime { 10.0 }
fn default_trace_output() -> PathBuf { PathBuf::from("output.txt") }
fn default_log_level() -> String { "info".to_string() }

/// Load and validate configuration from a TOML file at the given path.
pub fn load_config(path: impl AsRef<Path>) -> Result<SimConfig, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path.display(), e);
        ConfigError::Io(e)
    })?;
    let config: SimConfig = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = SimConfig::default();
        assert_eq!(config.scheduler.policy, Policy::RoundRobin);
        assert_eq!(config.scheduler.processors(), 2);
        assert_eq!(config.scheduler.idle_step(), 1.0);
        assert_eq!(config.scheduler.time_scale, 1000.0);
        assert_eq!(config.burst.min, 101);
        assert_eq!(config.burst.max, 1000);
        assert_eq!(config.finish_tolerance(), 0.0);
        assert_eq!(config.memory.swap_overhead, 10.0);
        assert_eq!(config.memory.overflow, OverflowPolicy::EvictLru);
        assert!(config.memory.disk_path.is_none());
        assert_eq!(config.trace.format, TraceFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_policy_driven_defaults() {
        let mut config = SimConfig::default();
        config.scheduler.policy = Policy::ShortestRemaining;
        assert_eq!(config.scheduler.processors(), 1);
        assert_eq!(config.scheduler.idle_step(), 0.01);
        assert_eq!(config.finish_tolerance(), 0.01);
        config.scheduler.processors = Some(3);
        assert_eq!(config.scheduler.processors(), 3);
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("procsim.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(
            file,
            "[scheduler]\npolicy = 'shortest_remaining'\nseed = 7\n\n[memory]\noverflow = 'spill_to_disk'\ndisk_path = 'vm.txt'"
        )
        .unwrap();
        file.flush().unwrap();
        let config = load_config(&file_path).unwrap();
        assert_eq!(config.scheduler.policy, Policy::ShortestRemaining);
        assert_eq!(config.scheduler.seed, Some(7));
        assert_eq!(config.memory.overflow, OverflowPolicy::SpillToDisk);
        assert_eq!(config.memory.disk_path, Some(PathBuf::from("vm.txt")));
        // Defaults for missing fields
        assert_eq!(config.burst.max, 1000);
        assert_eq!(config.trace.output, PathBuf::from("output.txt"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(&file_path);
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = SimConfig::default();
        config.burst.min = 2000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = SimConfig::default();
        config.memory.capacity = Some(0);
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.burst.decay = 1.5;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.scheduler.processors = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_nan_and_infinity() {
        let cases: [fn(&mut SimConfig); 6] = [
            |c| c.burst.decay = f64::NAN,
            |c| c.burst.finish_tolerance = Some(f64::NAN),
            |c| c.scheduler.idle_step = Some(f64::NAN),
            |c| c.scheduler.time_scale = f64::INFINITY,
            |c| c.memory.swap_overhead = f64::NAN,
            |c| c.scheduler.idle_step = Some(f64::INFINITY),
        ];
        for set in cases {
            let mut config = SimConfig::default();
            config.scheduler.policy = Policy::ShortestRemaining;
            set(&mut config);
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }

        let config: SimConfig = toml::from_str("[burst]\ndecay = nan\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("round-robin".parse::<Policy>().unwrap(), Policy::RoundRobin);
        assert_eq!("SRT".parse::<Policy>().unwrap(), Policy::ShortestRemaining);
        assert!("fifo".parse::<Policy>().is_err());
    }
}
