//! Analysis Configuration Module
//!
//! Provides the channel set, imputation policy, feature definitions and rule
//! ensemble loaded from TOML, so no policy is hardcoded in the pipeline.
//!
//! ## Loading Order
//!
//! 1. `FAULT_SENTINEL_CONFIG` environment variable (path to TOML file)
//! 2. `fault_sentinel.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! The config is an ordinary value: load it once and hand it to the
//! pipeline that needs it.
//!
//! ```ignore
//! let config = AnalysisConfig::load();
//! let coordinator = PipelineCoordinator::from_config(&config)?;
//! ```

mod analysis_config;
pub mod defaults;
pub mod validation;

pub use analysis_config::*;
