//! Kernel configuration.
//!
//! Parameters are plain data with defaults. They load from JSON and can
//! be overlaid from environment variables:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `KERNEL_DEFAULT_LATENCY_MS` | `planner.default_latency_ms` |
//! | `KERNEL_MIN_NAME_LEN` | `validator.min_display_name_len` |
//! | `KERNEL_DEFAULT_POLICY` | `governance.default_policy` (`allow` / `deny`) |
//! | `LOG_FORMAT` | `log_format` (`json` / `pretty`) |

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::governance::DefaultPolicy;
use crate::schema::UnknownKindPolicy;
use crate::telemetry::LogFormat;
use crate::types::EdgeKind;

/// Latency assumed for atoms that declare none.
pub const DEFAULT_STEP_LATENCY_MS: u64 = 100;

/// Display names shorter than this get an INFO lint.
pub const DEFAULT_MIN_DISPLAY_NAME_LEN: usize = 5;

/// Error loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Malformed JSON.
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Malformed environment variable.
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

fn dependency_edges() -> Vec<EdgeKind> {
    vec![EdgeKind::DependsOn, EdgeKind::RequiresKnowledgeOf]
}

/// Planner parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Latency assumed for atoms without a declared latency.
    pub default_latency_ms: u64,
    /// Edge kinds followed when resolving dependencies.
    pub traversal_edges: Vec<EdgeKind>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_latency_ms: DEFAULT_STEP_LATENCY_MS,
            traversal_edges: dependency_edges(),
        }
    }
}

/// Integrity validator parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Minimum display name length before LINT-003 fires.
    pub min_display_name_len: usize,
    /// Edge kinds walked by cycle detection.
    pub cycle_edges: Vec<EdgeKind>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_display_name_len: DEFAULT_MIN_DISPLAY_NAME_LEN,
            cycle_edges: dependency_edges(),
        }
    }
}

/// Governance parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Decision when nothing applies.
    pub default_policy: DefaultPolicy,
}

/// Schema parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SchemaConfig {
    /// Treatment of atoms whose kind has no schema.
    pub unknown_kind: UnknownKindPolicy,
}

/// Full kernel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KernelConfig {
    /// Planner section.
    pub planner: PlannerConfig,
    /// Validator section.
    pub validator: ValidatorConfig,
    /// Governance section.
    pub governance: GovernanceConfig,
    /// Schema section.
    pub schema: SchemaConfig,
    /// Log output format.
    pub log_format: LogFormat,
}

impl KernelConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults overlaid with process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay(|name| std::env::var(name).ok())
    }

    /// Overlay values from a variable lookup.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(value) = lookup("KERNEL_DEFAULT_LATENCY_MS") {
            self.planner.default_latency_ms = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "KERNEL_DEFAULT_LATENCY_MS",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("KERNEL_MIN_NAME_LEN") {
            self.validator.min_display_name_len = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "KERNEL_MIN_NAME_LEN",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("KERNEL_DEFAULT_POLICY") {
            let normalized = value.trim().to_lowercase();
            self.governance.default_policy = match normalized.as_str() {
                "allow" => DefaultPolicy::Allow,
                "deny" => DefaultPolicy::Deny,
                _ => return Err(ConfigError::InvalidEnv { name: "KERNEL_DEFAULT_POLICY", value }),
            };
        }
        if let Some(value) = lookup("LOG_FORMAT") {
            self.log_format = LogFormat::from_str(&value)
                .ok_or(ConfigError::InvalidEnv { name: "LOG_FORMAT", value })?;
        }
        Ok(self)
    }

    /// Hash of the parameters in effect.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(self)
    }
}
