//! Engine configuration
//!
//! Loaded from JSON (every field optional), then adjusted by environment variables
//! and finally by CLI flags. Whether synthetic fallback may run is an explicit
//! switch here rather than something inferred from the build target.

use crate::error::RollupError;
use crate::retry::RetryConfig;
use crate::types::MetricKind;
use crate::window::MAX_WINDOW_DAYS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::time::Duration;

/// Trailing window size override
pub const ENV_WINDOW_DAYS: &str = "ROLLUP_WINDOW_DAYS";
/// `true`/`false` override for synthetic fallback
pub const ENV_ALLOW_SYNTHETIC: &str = "ROLLUP_ALLOW_SYNTHETIC";
/// Per-cycle timeout override in seconds
pub const ENV_CYCLE_TIMEOUT_SECS: &str = "ROLLUP_CYCLE_TIMEOUT_SECS";
/// Seed for synthetic sample generation
pub const ENV_SEED: &str = "ROLLUP_SEED";

/// Default trailing window in days
pub const DEFAULT_WINDOW_DAYS: u32 = 5;

/// Default per-cycle timeout in seconds
pub const DEFAULT_CYCLE_TIMEOUT_SECS: u64 = 30;

/// Configuration for a [`crate::pipeline::DailyStatsPipeline`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of days to aggregate, ending with the current day
    pub window_days: u32,
    /// Metrics queried every cycle
    pub metrics: Vec<MetricKind>,
    /// Metrics read access is requested for
    pub read_metrics: Vec<MetricKind>,
    /// Metrics synthetic samples are written for
    pub write_metrics: Vec<MetricKind>,
    /// Fill days without real data with synthetic samples
    pub allow_synthetic_fallback: bool,
    /// Fallback passes allowed per run
    pub max_fallback_passes: u32,
    /// Deadline for every query of a cycle, in seconds
    pub cycle_timeout_secs: u64,
    /// Retry policy for queries and synthetic writes
    pub retry: RetryConfig,
    /// Fixed seed for reproducible synthetic data
    pub synthetic_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            metrics: vec![
                MetricKind::StepCount,
                MetricKind::Distance,
                MetricKind::EnergyBurned,
            ],
            read_metrics: MetricKind::ALL.to_vec(),
            write_metrics: vec![
                MetricKind::StepCount,
                MetricKind::Distance,
                MetricKind::EnergyBurned,
            ],
            allow_synthetic_fallback: false,
            max_fallback_passes: 1,
            cycle_timeout_secs: DEFAULT_CYCLE_TIMEOUT_SECS,
            retry: RetryConfig::default(),
            synthetic_seed: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, RollupError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Apply `ROLLUP_*` environment overrides
    pub fn with_env_overrides(self) -> Result<Self, RollupError> {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, RollupError> {
        if let Some(days) = lookup(ENV_WINDOW_DAYS) {
            self.window_days = parse_env(ENV_WINDOW_DAYS, &days)?;
        }
        if let Some(allow) = lookup(ENV_ALLOW_SYNTHETIC) {
            self.allow_synthetic_fallback = parse_env(ENV_ALLOW_SYNTHETIC, &allow)?;
        }
        if let Some(secs) = lookup(ENV_CYCLE_TIMEOUT_SECS) {
            self.cycle_timeout_secs = parse_env(ENV_CYCLE_TIMEOUT_SECS, &secs)?;
        }
        if let Some(seed) = lookup(ENV_SEED) {
            self.synthetic_seed = Some(parse_env(ENV_SEED, &seed)?);
        }
        self.validate()?;
        Ok(self)
    }

    /// Check that the configuration can drive a pipeline
    pub fn validate(&self) -> Result<(), RollupError> {
        if self.window_days == 0 {
            return Err(RollupError::InvalidConfig(
                "window_days must be at least 1".to_string(),
            ));
        }
        if self.window_days > MAX_WINDOW_DAYS {
            return Err(RollupError::InvalidConfig(format!(
                "window_days must be at most {}",
                MAX_WINDOW_DAYS
            )));
        }
        if self.cycle_timeout_secs == 0 {
            return Err(RollupError::InvalidConfig(
                "cycle_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(RollupError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.allow_synthetic_fallback && self.write_metrics.is_empty() {
            return Err(RollupError::InvalidConfig(
                "synthetic fallback needs at least one write metric".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    /// Queried metrics without duplicates
    pub fn metric_set(&self) -> BTreeSet<MetricKind> {
        self.metrics.iter().copied().collect()
    }

    /// Read access set: every queried metric plus the configured read metrics
    pub fn read_set(&self) -> BTreeSet<MetricKind> {
        self.read_metrics
            .iter()
            .chain(self.metrics.iter())
            .copied()
            .collect()
    }

    /// Write access set, empty unless synthetic fallback is enabled
    pub fn write_set(&self) -> BTreeSet<MetricKind> {
        if self.allow_synthetic_fallback {
            self.write_metrics.iter().copied().collect()
        } else {
            BTreeSet::new()
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, RollupError> {
    value
        .trim()
        .parse()
        .map_err(|_| RollupError::InvalidConfig(format!("{}: cannot parse {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.window_days, 5);
        assert_eq!(config.metrics.len(), 3);
        assert!(!config.allow_synthetic_fallback);
        assert!(config.validate().is_ok());
        assert!(config.read_set().contains(&MetricKind::ExerciseTime));
        assert!(config.write_set().is_empty());
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json(
            r#"{"window_days": 7, "allow_synthetic_fallback": true, "retry": {"max_attempts": 1}}"#,
        )
        .unwrap();

        assert_eq!(config.window_days, 7);
        assert!(config.allow_synthetic_fallback);
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.retry.initial_backoff_ms, 200);
        assert_eq!(config.write_set().len(), 3);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = EngineConfig {
            synthetic_seed: Some(42),
            ..Default::default()
        };
        let back = EngineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_WINDOW_DAYS, "3"),
            (ENV_ALLOW_SYNTHETIC, "true"),
            (ENV_SEED, "7"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::default()
            .with_overrides_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.window_days, 3);
        assert!(config.allow_synthetic_fallback);
        assert_eq!(config.synthetic_seed, Some(7));
        assert_eq!(config.cycle_timeout_secs, DEFAULT_CYCLE_TIMEOUT_SECS);
    }

    #[test]
    fn test_invalid_env_value() {
        let result = EngineConfig::default().with_overrides_from(|key| {
            (key == ENV_CYCLE_TIMEOUT_SECS).then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(RollupError::InvalidConfig(_))));
    }

    #[test]
    fn test_validation() {
        let config = EngineConfig {
            window_days: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            window_days: u32::MAX,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RollupError::InvalidConfig(_))
        ));

        let config = EngineConfig {
            window_days: MAX_WINDOW_DAYS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = EngineConfig {
            allow_synthetic_fallback: true,
            write_metrics: Vec::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
