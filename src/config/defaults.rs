//! System-wide default constants.
//!
//! Centralises values that would otherwise be scattered across the codebase.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Configuration
// ============================================================================

/// Environment variable naming the config file to load.
pub const CONFIG_ENV_VAR: &str = "FAULT_SENTINEL_CONFIG";

/// Config file looked up in the working directory when the env var is unset.
pub const LOCAL_CONFIG_FILE: &str = "fault_sentinel.toml";

/// Channels declared when no config file is present.
pub const DEFAULT_CHANNELS: [&str; 4] =
    ["temperature", "vibration", "pressure", "rotational_speed"];

/// Maximum Levenshtein distance for "did you mean" suggestions.
pub const MAX_SUGGESTION_DISTANCE: usize = 3;

// ============================================================================
// Ingestion
// ============================================================================

/// Field values (case-insensitive) treated as an explicit missing marker.
pub const MISSING_MARKERS: [&str; 5] = ["na", "n/a", "nan", "null", "-"];

// ============================================================================
// Feature Preparation
// ============================================================================

/// Value substituted for missing channels under constant imputation.
pub const DEFAULT_IMPUTATION_VALUE: f64 = 0.0;

// ============================================================================
// Classification
// ============================================================================

/// Number of contributing factors attached to a failure prediction.
pub const DEFAULT_MAX_CONTRIBUTING_FACTORS: usize = 3;

// ============================================================================
// Pipeline
// ============================================================================

/// Record count at or above which per-record stages run on the rayon pool.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 2_048;

/// Progress percentage reported when a run starts.
pub const PROGRESS_STARTED: u8 = 0;

/// Progress percentage reported after ingestion.
pub const PROGRESS_INGESTED: u8 = 25;

/// Progress percentage reported after feature preparation.
pub const PROGRESS_PREPARED: u8 = 50;

/// Progress percentage reported after classification.
pub const PROGRESS_CLASSIFIED: u8 = 75;

/// Progress percentage reported only when a run completes.
pub const PROGRESS_COMPLETED: u8 = 100;

// ============================================================================
// Synthetic Data
// ============================================================================

/// Rows produced by the synthetic generator.
pub const SYNTHETIC_ROWS: usize = 500;

/// Fixed seed for reproducible demonstration data.
pub const SYNTHETIC_SEED: u64 = 42;

/// Probability that a synthetic row is drawn from the fault profile.
pub const SYNTHETIC_FAILURE_RATE: f64 = 0.1;
