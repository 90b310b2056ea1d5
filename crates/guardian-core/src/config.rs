//! Engine configuration
//!
//! Thresholds are tunable, but the ordering `yellow <= fail_red <= red` must
//! hold; [`EngineConfig::validate`] rejects anything else.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};
use crate::signal::Severity;

/// Gate thresholds on aggregate tension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateThresholds {
    /// Aggregate tension at or above this is always red
    pub red: f64,
    /// With any `fail` severity present, tension at or above this is red
    pub fail_red: f64,
    /// Aggregate tension at or above this is yellow
    pub yellow: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            red: 0.8,
            fail_red: 0.5,
            yellow: 0.4,
        }
    }
}

/// Per-severity weights for the severity-weighted mean
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub info: f64,
    pub warn: f64,
    pub fail: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            info: 0.1,
            warn: 0.4,
            fail: 1.0,
        }
    }
}

impl SeverityWeights {
    /// Weight for a severity
    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Info => self.info,
            Severity::Warn => self.warn,
            Severity::Fail => self.fail,
        }
    }
}

/// Configuration for the decision engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub thresholds: GateThresholds,
    pub weights: SeverityWeights,
    /// Aggregate tension needed to open a case when no case is active
    pub baseline_tension: f64,
    /// Signals older than this are excluded from the active window
    pub staleness_horizon_secs: u64,
    /// How long a case must stay green before it closes
    pub quiescence_window_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: GateThresholds::default(),
            weights: SeverityWeights::default(),
            baseline_tension: 0.4,
            staleness_horizon_secs: 24 * 60 * 60,
            quiescence_window_secs: 60 * 60,
        }
    }
}

impl EngineConfig {
    /// Create a new config builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| GateError::Config(format!("YAML error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| GateError::Config(format!("TOML error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Staleness horizon as a duration
    pub fn staleness_horizon(&self) -> Duration {
        Duration::seconds(self.staleness_horizon_secs.min(i64::MAX as u64) as i64)
    }

    /// Quiescence window as a duration
    pub fn quiescence_window(&self) -> Duration {
        Duration::seconds(self.quiescence_window_secs.min(i64::MAX as u64) as i64)
    }

    /// Check that thresholds and weights are usable
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        for (name, value) in [("red", t.red), ("fail_red", t.fail_red), ("yellow", t.yellow)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(GateError::Config(format!(
                    "threshold '{}' must be within (0, 1], got {}",
                    name, value
                )));
            }
        }
        if !(t.yellow <= t.fail_red && t.fail_red <= t.red) {
            return Err(GateError::Config(format!(
                "thresholds must satisfy yellow <= fail_red <= red, got {} / {} / {}",
                t.yellow, t.fail_red, t.red
            )));
        }

        let w = &self.weights;
        for (name, value) in [("info", w.info), ("warn", w.warn), ("fail", w.fail)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(GateError::Config(format!(
                    "weight '{}' must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.baseline_tension) {
            return Err(GateError::Config(format!(
                "baseline_tension must be within [0, 1], got {}",
                self.baseline_tension
            )));
        }
        if self.staleness_horizon_secs == 0 {
            return Err(GateError::Config(
                "staleness_horizon_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for EngineConfig
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// Set gate thresholds
    pub fn thresholds(mut self, red: f64, fail_red: f64, yellow: f64) -> Self {
        self.config.thresholds = GateThresholds {
            red,
            fail_red,
            yellow,
        };
        self
    }

    /// Set severity weights
    pub fn weights(mut self, info: f64, warn: f64, fail: f64) -> Self {
        self.config.weights = SeverityWeights { info, warn, fail };
        self
    }

    /// Set the baseline tension for opening cases
    pub fn baseline_tension(mut self, baseline: f64) -> Self {
        self.config.baseline_tension = baseline;
        self
    }

    /// Set the staleness horizon in seconds
    pub fn staleness_horizon_secs(mut self, secs: u64) -> Self {
        self.config.staleness_horizon_secs = secs;
        self
    }

    /// Set the quiescence window in seconds
    pub fn quiescence_window_secs(mut self, secs: u64) -> Self {
        self.config.quiescence_window_secs = secs;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
