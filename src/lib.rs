//! Fault Sentinel: sensor telemetry failure analysis
//!
//! Turns tabular sensor telemetry into per-sample `failure` / `normal`
//! predictions plus aggregate statistics.
//!
//! ## Architecture
//!
//! - **Acquisition**: header + rows text (or a seeded generator) → validated records
//! - **Features**: imputation, scaling and derived features per record
//! - **ML Engine**: threshold-rule ensemble with majority voting, result aggregation
//! - **Pipeline**: staged orchestrator with progress, cancellation and busy rejection
//! - **Config**: TOML configuration with unknown-key detection

pub mod acquisition;
pub mod config;
pub mod features;
pub mod ml_engine;
pub mod pipeline;
pub mod types;

// Re-export configuration
pub use config::AnalysisConfig;

// Re-export commonly used types
pub use types::{
    AnalysisResult, ChannelSet, FeatureSchema, FeatureVector, Label, Prediction, RecordId,
    SensorRecord,
};

// Re-export pipeline components
pub use acquisition::{IngestError, SyntheticGenerator, TableIngestor};
pub use features::{FeatureConfigError, FeaturePreparer};
pub use ml_engine::{Classifier, ModelError, ResultAggregator, RuleEnsemble};
pub use pipeline::{
    AnalysisInput, ErrorKind, PipelineCoordinator, PipelineError, PipelineState, ProgressSink,
    ProgressUpdate,
};
