//! Signal data model and the ingestion boundary
//!
//! A [`Signal`] is an immutable evidence record. Raw payloads arrive as
//! [`SignalPayload`] and only become Signals after [`SignalPayload::validate`]
//! has checked every required field and every enumerated value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{GateError, Result};

/// Supported signal schema versions
pub const SUPPORTED_SCHEMA_VERSIONS: &[&str] = &["0.1"];

/// Signal kind that marks a canary result
pub const CANARY_KIND: &str = "canary";

/// Severity of an observed deviation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Fail,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Fail => "fail",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "info" => Ok(Severity::Info),
            "warn" => Ok(Severity::Warn),
            "fail" => Ok(Severity::Fail),
            other => Err(GateError::validation(
                "severity",
                format!("expected one of info, warn, fail; got '{}'", other),
            )),
        }
    }
}

/// The system a signal was observed on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SystemRef {
    pub name: String,
    pub env: String,
    pub version: String,
}

impl SystemRef {
    pub fn new(
        name: impl Into<String>,
        env: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            env: env.into(),
            version: version.into(),
        }
    }

    /// Key used for case ownership and per-key serialization
    pub fn key(&self) -> SystemKey {
        SystemKey::new(self.name.clone(), self.env.clone())
    }
}

/// `(system.name, system.env)` pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SystemKey {
    pub name: String,
    pub env: String,
}

impl SystemKey {
    pub fn new(name: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env: env.into(),
        }
    }
}

impl fmt::Display for SystemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.env)
    }
}

/// Immutable evidence record of an observed deviation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub schema_version: String,
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Origin tag (web client, CI, error tracker, probe)
    pub source: String,
    pub severity: Severity,
    /// Normalized concern in [0, 1]
    pub tension: f64,
    pub system: SystemRef,
    /// Category tag
    pub kind: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
}

impl Signal {
    /// Parse and validate a JSON document at the ingestion boundary
    pub fn from_json(content: &str) -> Result<Self> {
        let payload: SignalPayload = serde_json::from_str(content)
            .map_err(|e| GateError::validation("(root)", format!("invalid JSON: {}", e)))?;
        payload.validate()
    }

    /// System key this signal belongs to
    pub fn key(&self) -> SystemKey {
        self.system.key()
    }

    /// Whether this signal reports a canary result
    pub fn is_canary(&self) -> bool {
        self.kind == CANARY_KIND
    }

    /// A canary result reported at `info` severity counts as a passed validation
    pub fn is_successful_canary(&self) -> bool {
        self.is_canary() && self.severity == Severity::Info
    }

    /// Snapshot of the fields relevant to gate decisions
    pub fn snapshot(&self) -> SignalSnapshot {
        SignalSnapshot {
            timestamp: self.timestamp,
            source: self.source.clone(),
            severity: self.severity,
            tension: self.tension,
            kind: self.kind.clone(),
            summary: self.summary.clone(),
        }
    }
}

/// Copy of a signal's fields taken when it is linked to a case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub severity: Severity,
    pub tension: f64,
    pub kind: String,
    pub summary: String,
}

/// System block as received on the wire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemPayload {
    pub name: Option<String>,
    pub env: Option<String>,
    pub version: Option<String>,
}

/// Raw, unvalidated signal payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalPayload {
    pub schema_version: Option<String>,
    pub id: Option<String>,
    pub timestamp: Option<String>,
    pub source: Option<String>,
    pub severity: Option<String>,
    pub tension: Option<f64>,
    pub system: Option<SystemPayload>,
    pub kind: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
    #[serde(default)]
    pub trace_ref: Option<String>,
    #[serde(default)]
    pub links: Option<Vec<String>>,
}

fn required_text(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        Some(_) => Err(GateError::validation(field, "must not be empty")),
        None => Err(GateError::validation(field, "required field missing")),
    }
}

impl SignalPayload {
    /// Validate every field and build an immutable Signal
    pub fn validate(self) -> Result<Signal> {
        let schema_version = required_text(self.schema_version, "schema_version")?;
        if !SUPPORTED_SCHEMA_VERSIONS.contains(&schema_version.as_str()) {
            return Err(GateError::validation(
                "schema_version",
                format!(
                    "unsupported version '{}', expected one of {:?}",
                    schema_version, SUPPORTED_SCHEMA_VERSIONS
                ),
            ));
        }

        let raw_id = required_text(self.id, "id")?;
        let id = Uuid::parse_str(&raw_id)
            .map_err(|e| GateError::validation("id", format!("not a UUID: {}", e)))?;

        let raw_ts = required_text(self.timestamp, "timestamp")?;
        let timestamp = DateTime::parse_from_rfc3339(&raw_ts)
            .map_err(|e| GateError::validation("timestamp", format!("not RFC 3339: {}", e)))?
            .with_timezone(&Utc);

        let source = required_text(self.source, "source")?;
        let severity: Severity = required_text(self.severity, "severity")?.parse()?;

        let tension = self
            .tension
            .ok_or_else(|| GateError::validation("tension", "required field missing"))?;
        if !(0.0..=1.0).contains(&tension) {
            return Err(GateError::validation(
                "tension",
                format!("must be within [0, 1], got {}", tension),
            ));
        }

        let system = self
            .system
            .ok_or_else(|| GateError::validation("system", "required field missing"))?;
        let system = SystemRef {
            name: required_text(system.name, "system.name")?,
            env: required_text(system.env, "system.env")?,
            version: required_text(system.version, "system.version")?,
        };

        Ok(Signal {
            schema_version,
            id,
            timestamp,
            source,
            severity,
            tension,
            system,
            kind: required_text(self.kind, "kind")?,
            summary: required_text(self.summary, "summary")?,
            details: self.details,
            trace_ref: self.trace_ref,
            links: self.links.unwrap_or_default(),
        })
    }
}

impl From<&Signal> for SignalPayload {
    fn from(signal: &Signal) -> Self {
        Self {
            schema_version: Some(signal.schema_version.clone()),
            id: Some(signal.id.to_string()),
            timestamp: Some(signal.timestamp.to_rfc3339()),
            source: Some(signal.source.clone()),
            severity: Some(signal.severity.as_str().to_string()),
            tension: Some(signal.tension),
            system: Some(SystemPayload {
                name: Some(signal.system.name.clone()),
                env: Some(signal.system.env.clone()),
                version: Some(signal.system.version.clone()),
            }),
            kind: Some(signal.kind.clone()),
            summary: Some(signal.summary.clone()),
            details: signal.details.clone(),
            trace_ref: signal.trace_ref.clone(),
            links: Some(signal.links.clone()),
        }
    }
}
