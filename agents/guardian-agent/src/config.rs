//! Agent configuration
//!
//! Loaded from YAML or TOML (by file extension), then overridden by
//! `GUARDIAN_*` environment variables.

use guardian_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AgentError, Result};

/// Configuration for the Guardian agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub engine: EngineConfig,

    /// Directory care-case documents are written to
    pub output_dir: PathBuf,

    /// DecisionEvent JSON-lines file
    pub events_file: Option<PathBuf>,

    /// Attach playbook hypotheses and intents to emitted documents
    pub apply_playbooks: bool,

    pub log_json: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            output_dir: PathBuf::from("guardian/cases"),
            events_file: None,
            apply_playbooks: true,
            log_json: false,
        }
    }
}

impl AgentConfig {
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::new()
    }

    /// Load from a `.yaml`/`.yml` or `.toml` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AgentError::file_error(format!("cannot read {}: {}", path.display(), e))
        })?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            _ => {
                return Err(AgentError::invalid_input(format!(
                    "unsupported config format: {} (expected .yaml, .yml or .toml)",
                    path.display()
                )))
            }
        };
        config.engine.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `GUARDIAN_*` overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("GUARDIAN_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("GUARDIAN_EVENTS_FILE") {
            self.events_file = Some(PathBuf::from(file));
        }
        if let Some(v) = lookup("GUARDIAN_APPLY_PLAYBOOKS") {
            self.apply_playbooks = parse_env("GUARDIAN_APPLY_PLAYBOOKS", &v)?;
        }
        if let Some(v) = lookup("GUARDIAN_LOG_JSON") {
            self.log_json = parse_env("GUARDIAN_LOG_JSON", &v)?;
        }
        if let Some(v) = lookup("GUARDIAN_BASELINE_TENSION") {
            self.engine.baseline_tension = parse_env("GUARDIAN_BASELINE_TENSION", &v)?;
        }
        if let Some(v) = lookup("GUARDIAN_RED_THRESHOLD") {
            self.engine.thresholds.red = parse_env("GUARDIAN_RED_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("GUARDIAN_YELLOW_THRESHOLD") {
            self.engine.thresholds.yellow = parse_env("GUARDIAN_YELLOW_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("GUARDIAN_STALENESS_HORIZON_SECS") {
            self.engine.staleness_horizon_secs = parse_env("GUARDIAN_STALENESS_HORIZON_SECS", &v)?;
        }
        if let Some(v) = lookup("GUARDIAN_QUIESCENCE_WINDOW_SECS") {
            self.engine.quiescence_window_secs = parse_env("GUARDIAN_QUIESCENCE_WINDOW_SECS", &v)?;
        }
        self.engine.validate()?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AgentError::invalid_input(format!("{} has an invalid value '{}'", name, value)))
}

/// Builder for AgentConfig
pub struct AgentConfigBuilder {
    config: AgentConfig,
}

impl AgentConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AgentConfig::default(),
        }
    }

    pub fn engine(mut self, engine: EngineConfig) -> Self {
        self.config.engine = engine;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn events_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.config.events_file = Some(file.into());
        self
    }

    pub fn apply_playbooks(mut self, enabled: bool) -> Self {
        self.config.apply_playbooks = enabled;
        self
    }

    pub fn build(self) -> Result<AgentConfig> {
        self.config.engine.validate()?;
        Ok(self.config)
    }
}

impl Default for AgentConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_yaml_config_with_partial_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guardian.yaml");
        std::fs::write(
            &path,
            "output_dir: out/cases\nengine:\n  baseline_tension: 0.3\n  thresholds:\n    red: 0.9\n",
        )
        .unwrap();

        let config = AgentConfig::from_file(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("out/cases"));
        assert_eq!(config.engine.baseline_tension, 0.3);
        assert_eq!(config.engine.thresholds.red, 0.9);
        assert_eq!(config.engine.thresholds.yellow, 0.4);
        assert!(config.apply_playbooks);
    }

    #[test]
    fn test_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guardian.toml");
        std::fs::write(
            &path,
            "events_file = \"events.jsonl\"\n\n[engine]\nquiescence_window_secs = 60\n",
        )
        .unwrap();

        let config = AgentConfig::from_file(&path).unwrap();
        assert_eq!(config.events_file, Some(PathBuf::from("events.jsonl")));
        assert_eq!(config.engine.quiescence_window_secs, 60);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guardian.yaml");
        std::fs::write(&path, "engine:\n  thresholds:\n    yellow: 0.95\n").unwrap();

        let err = AgentConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, AgentError::Gate(_)));
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guardian.ini");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            AgentConfig::from_file(&path),
            Err(AgentError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GUARDIAN_OUTPUT_DIR", "/tmp/cases"),
            ("GUARDIAN_BASELINE_TENSION", "0.25"),
            ("GUARDIAN_APPLY_PLAYBOOKS", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = AgentConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/cases"));
        assert_eq!(config.engine.baseline_tension, 0.25);
        assert!(!config.apply_playbooks);
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = AgentConfig::default();
        let err = config
            .apply_overrides(|name| (name == "GUARDIAN_RED_THRESHOLD").then(|| "high".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("GUARDIAN_RED_THRESHOLD"));
    }
}
