//! Analysis Configuration - channel set, imputation, features and rule ensemble
//!
//! Every policy the pipeline applies is a field in this module. Each struct
//! implements `Default` so a run without a config file is still fully
//! specified and reproducible.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use crate::types::{ChannelSet, Label};

// ============================================================================
// Config Provenance
// ============================================================================

/// Tracks which configuration keys were explicitly present in the user's TOML file.
///
/// After deserialization every `#[serde(default)]` field has a value whether or
/// not the user set it. This keeps that distinction for reporting.
#[derive(Debug, Clone, Default)]
pub struct ConfigProvenance {
    /// Dotted key paths explicitly present in the user's TOML file
    pub explicit_keys: HashSet<String>,
    /// File the config was read from, if any
    pub source: Option<PathBuf>,
}

impl ConfigProvenance {
    /// Check whether a dotted key path was explicitly set by the user.
    ///
    /// Example: `provenance.is_user_set("imputation.strategy")`
    pub fn is_user_set(&self, dotted_key: &str) -> bool {
        self.explicit_keys.contains(dotted_key)
    }

    /// TOML comment block naming the config source and the user-set keys.
    pub fn header(&self) -> String {
        let mut out = match self.source {
            Some(ref path) => format!("# Source: {}\n", path.display()),
            None => "# Source: built-in defaults\n".to_string(),
        };
        if !self.explicit_keys.is_empty() {
            let mut keys: Vec<&str> = self.explicit_keys.iter().map(String::as_str).collect();
            keys.sort_unstable();
            out.push_str("# User-set keys:\n");
            for key in keys {
                out.push_str("#   ");
                out.push_str(key);
                out.push('\n');
            }
        }
        out
    }
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for an analysis deployment.
///
/// Load with `AnalysisConfig::load()` which searches:
/// 1. `$FAULT_SENTINEL_CONFIG` env var
/// 2. `./fault_sentinel.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Declared sensor channels and ingestion policy
    #[serde(default)]
    pub channels: ChannelConfig,

    /// Missing-value policy
    #[serde(default)]
    pub imputation: ImputationConfig,

    /// Scaling and derived features
    #[serde(default)]
    pub features: FeatureConfig,

    /// Decision rules
    #[serde(default)]
    pub ensemble: EnsembleConfig,

    /// Orchestrator and task pool tuning
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Demonstration data generator
    #[serde(default)]
    pub synthetic: SyntheticConfig,
}

impl AnalysisConfig {
    /// Load configuration using the standard search order:
    /// 1. `$FAULT_SENTINEL_CONFIG` environment variable
    /// 2. `./fault_sentinel.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        Self::load_with_provenance().0
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let (config, _provenance) = Self::load_from_file_with_provenance(path)?;
        Ok(config)
    }

    /// Load from a specific TOML file path, also returning provenance
    /// so callers can distinguish user-set values from defaults.
    pub fn load_from_file_with_provenance(
        path: &Path,
    ) -> Result<(Self, ConfigProvenance), ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(&contents) {
            warn!("{}", w);
        }

        let provenance = ConfigProvenance {
            explicit_keys: super::validation::walk_toml_keys(
                &contents
                    .parse::<toml::Value>()
                    .unwrap_or_else(|_| toml::Value::Table(toml::map::Map::new())),
                "",
            )
            .into_iter()
            .collect(),
            source: Some(path.to_path_buf()),
        };

        let mut config: Self = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        // Relative rule files are resolved against the config file's directory
        if let (Some(rules), Some(dir)) = (config.ensemble.rules_path.as_mut(), path.parent()) {
            if rules.is_relative() {
                *rules = dir.join(&*rules);
            }
        }

        config.validate()?;
        Ok((config, provenance))
    }

    /// Load configuration using the standard search order, returning provenance.
    pub fn load_with_provenance() -> (Self, ConfigProvenance) {
        // 1. Check env var
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file_with_provenance(&p) {
                    Ok((config, provenance)) => {
                        info!(
                            path = %p.display(),
                            channels = config.channels.names.len(),
                            "Loaded analysis config from {}",
                            defaults::CONFIG_ENV_VAR
                        );
                        return (config, provenance);
                    }
                    Err(e) => {
                        warn!(
                            path = %p.display(),
                            error = %e,
                            "Failed to load config from {}, falling back",
                            defaults::CONFIG_ENV_VAR
                        );
                    }
                }
            } else {
                warn!(
                    path = %path,
                    "{} points to non-existent file, falling back",
                    defaults::CONFIG_ENV_VAR
                );
            }
        }

        // 2. Check ./fault_sentinel.toml
        let local = PathBuf::from(defaults::LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file_with_provenance(&local) {
                Ok((config, provenance)) => {
                    info!(
                        channels = config.channels.names.len(),
                        "Loaded analysis config from ./{}",
                        defaults::LOCAL_CONFIG_FILE
                    );
                    return (config, provenance);
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "Failed to load ./{}, using defaults",
                        defaults::LOCAL_CONFIG_FILE
                    );
                }
            }
        }

        // 3. Defaults: no file, so nothing is user-set
        info!("No {} found, using built-in defaults", defaults::LOCAL_CONFIG_FILE);
        (Self::default(), ConfigProvenance::default())
    }

    /// Parse a config from a TOML string (no file lookup, no rule-path resolution).
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Build the channel set declared by this config.
    pub fn channel_set(&self) -> Result<ChannelSet, ConfigError> {
        ChannelSet::new(self.channels.names.iter().cloned())
            .map_err(|e| ConfigError::Validation(vec![format!("channels.names: {e}")]))
    }

    /// Validate all values for internal consistency.
    ///
    /// Cross references between features, rules and channels are checked
    /// when the pipeline is built; this pass covers value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if let Err(e) = ChannelSet::new(self.channels.names.iter().cloned()) {
            errors.push(format!("channels.names: {e}"));
        }
        if let Some(ref id) = self.channels.id_column {
            if id.trim().is_empty() {
                errors.push("channels.id_column must not be empty when set".to_string());
            } else if self
                .channels
                .names
                .iter()
                .any(|n| n.trim().eq_ignore_ascii_case(id.trim()))
            {
                errors.push(format!(
                    "channels.id_column '{id}' is also declared as a sensor channel"
                ));
            }
        }

        Self::check_finite(self.imputation.default_value, "imputation.default_value", &mut errors);
        for (channel, mean) in &self.imputation.means {
            Self::check_finite(*mean, &format!("imputation.means.{channel}"), &mut errors);
        }

        for (channel, scaling) in &self.features.scaling {
            Self::check_finite(
                scaling.center,
                &format!("features.scaling.{channel}.center"),
                &mut errors,
            );
            if !scaling.scale.is_finite() || scaling.scale == 0.0 {
                errors.push(format!(
                    "features.scaling.{channel}.scale must be finite and non-zero (got {})",
                    scaling.scale
                ));
            }
        }

        if self.ensemble.max_contributing_factors == 0 {
            errors.push("ensemble.max_contributing_factors must be > 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.synthetic.failure_rate) {
            errors.push(format!(
                "synthetic.failure_rate ({}) must be within [0, 1]",
                self.synthetic.failure_rate
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_finite(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() {
            errors.push(format!("{name}: value must be finite (got {value})"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config parse error ({}): {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Config serialization error: {0}")]
    Serialize(#[source] toml::ser::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Channels
// ============================================================================

/// Declared sensor channels and ingestion policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel names every input header must declare
    #[serde(default = "default_channel_names")]
    pub names: Vec<String>,

    /// Column holding the record identifier (Unix seconds or RFC 3339).
    /// Rows are identified by index when unset.
    #[serde(default)]
    pub id_column: Option<String>,

    /// Fail the run on the first missing channel value instead of imputing
    #[serde(default)]
    pub reject_missing: bool,
}

fn default_channel_names() -> Vec<String> {
    defaults::DEFAULT_CHANNELS.iter().map(ToString::to_string).collect()
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            names: default_channel_names(),
            id_column: None,
            reject_missing: false,
        }
    }
}

// ============================================================================
// Imputation
// ============================================================================

/// How missing channel values are replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputationStrategy {
    /// Every missing value becomes `default_value`
    #[default]
    Constant,
    /// Per-channel training-time mean, `default_value` when none configured
    Mean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputationConfig {
    #[serde(default)]
    pub strategy: ImputationStrategy,

    #[serde(default = "default_imputation_value")]
    pub default_value: f64,

    /// Channel name → training-time mean (used by `strategy = "mean"`)
    #[serde(default)]
    pub means: BTreeMap<String, f64>,
}

const fn default_imputation_value() -> f64 {
    defaults::DEFAULT_IMPUTATION_VALUE
}

impl Default for ImputationConfig {
    fn default() -> Self {
        Self {
            strategy: ImputationStrategy::Constant,
            default_value: default_imputation_value(),
            means: BTreeMap::new(),
        }
    }
}

// ============================================================================
// Features
// ============================================================================

/// Affine normalization applied to a channel feature: `(x - center) / scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingConfig {
    #[serde(default)]
    pub center: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

const fn default_scale() -> f64 {
    1.0
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            center: 0.0,
            scale: default_scale(),
        }
    }
}

/// Arithmetic used by a derived feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedKind {
    /// left / right, 0.0 when right is zero
    Ratio,
    /// left - right
    Difference,
    /// left * right
    Product,
}

impl fmt::Display for DerivedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ratio => write!(f, "ratio"),
            Self::Difference => write!(f, "difference"),
            Self::Product => write!(f, "product"),
        }
    }
}

/// A feature computed from two declared channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedFeatureConfig {
    pub name: String,
    pub kind: DerivedKind,
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Channel name → normalization (identity when absent)
    #[serde(default)]
    pub scaling: BTreeMap<String, ScalingConfig>,

    #[serde(default = "default_derived_features")]
    pub derived: Vec<DerivedFeatureConfig>,
}

fn default_derived_features() -> Vec<DerivedFeatureConfig> {
    vec![DerivedFeatureConfig {
        name: "thermal_load".to_string(),
        kind: DerivedKind::Product,
        left: "temperature".to_string(),
        right: "vibration".to_string(),
    }]
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            scaling: BTreeMap::new(),
            derived: default_derived_features(),
        }
    }
}

// ============================================================================
// Ensemble
// ============================================================================

/// Comparison operator of a rule condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
}

impl Comparison {
    /// Apply the operator to `value op threshold`.
    #[allow(clippy::float_cmp)]
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Greater => value > threshold,
            Self::GreaterOrEqual => value >= threshold,
            Self::Less => value < threshold,
            Self::LessOrEqual => value <= threshold,
            Self::Equal => value == threshold,
            Self::NotEqual => value != threshold,
        }
    }
}

/// How a rule combines its conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Every condition must hold
    #[default]
    All,
    /// At least one condition must hold
    Any,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub feature: String,
    pub op: Comparison,
    pub threshold: f64,
}

/// One voter of the ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,

    #[serde(default)]
    pub mode: MatchMode,

    /// Label voted when the predicate holds; the opposite label otherwise
    #[serde(default = "default_vote")]
    pub vote: Label,

    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,
}

const fn default_vote() -> Label {
    Label::Failure
}

/// Shape of a standalone rule file (`ensemble.rules_path`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// TOML file with `[[rules]]`; replaces the inline rules when set
    #[serde(default)]
    pub rules_path: Option<PathBuf>,

    #[serde(default = "default_max_factors")]
    pub max_contributing_factors: usize,

    #[serde(default = "default_rules")]
    pub rules: Vec<RuleConfig>,
}

const fn default_max_factors() -> usize {
    defaults::DEFAULT_MAX_CONTRIBUTING_FACTORS
}

fn condition(feature: &str, op: Comparison, threshold: f64) -> ConditionConfig {
    ConditionConfig {
        feature: feature.to_string(),
        op,
        threshold,
    }
}

fn default_rules() -> Vec<RuleConfig> {
    vec![
        RuleConfig {
            name: "overheat_with_vibration".to_string(),
            mode: MatchMode::All,
            vote: Label::Failure,
            conditions: vec![
                condition("temperature", Comparison::Greater, 80.0),
                condition("vibration", Comparison::Greater, 5.0),
            ],
        },
        RuleConfig {
            name: "excess_vibration".to_string(),
            mode: MatchMode::All,
            vote: Label::Failure,
            conditions: vec![condition("vibration", Comparison::Greater, 4.5)],
        },
        RuleConfig {
            name: "overpressure".to_string(),
            mode: MatchMode::All,
            vote: Label::Failure,
            conditions: vec![condition("pressure", Comparison::Greater, 118.0)],
        },
        RuleConfig {
            name: "thermal_load".to_string(),
            mode: MatchMode::All,
            vote: Label::Failure,
            conditions: vec![condition("thermal_load", Comparison::Greater, 400.0)],
        },
        RuleConfig {
            name: "speed_out_of_band".to_string(),
            mode: MatchMode::Any,
            vote: Label::Failure,
            conditions: vec![
                condition("rotational_speed", Comparison::Less, 1_350.0),
                condition("rotational_speed", Comparison::Greater, 1_800.0),
            ],
        },
    ]
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            max_contributing_factors: default_max_factors(),
            rules: default_rules(),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Fail aggregation when there are no predictions
    #[serde(default = "default_true")]
    pub require_samples: bool,

    /// Record count at which per-record stages switch to the rayon pool
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,

    /// Worker threads for the rayon pool (0 = one per core)
    #[serde(default)]
    pub worker_threads: usize,
}

const fn default_true() -> bool {
    true
}

const fn default_parallel_threshold() -> usize {
    defaults::DEFAULT_PARALLEL_THRESHOLD
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            require_samples: true,
            parallel_threshold: default_parallel_threshold(),
            worker_threads: 0,
        }
    }
}

// ============================================================================
// Synthetic Data
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    #[serde(default = "default_synthetic_rows")]
    pub rows: usize,

    #[serde(default = "default_synthetic_seed")]
    pub seed: u64,

    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,
}

const fn default_synthetic_rows() -> usize {
    defaults::SYNTHETIC_ROWS
}

const fn default_synthetic_seed() -> u64 {
    defaults::SYNTHETIC_SEED
}

const fn default_failure_rate() -> f64 {
    defaults::SYNTHETIC_FAILURE_RATE
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            rows: default_synthetic_rows(),
            seed: default_synthetic_seed(),
            failure_rate: default_failure_rate(),
        }
    }
}
