//! Shared data structures for the telemetry analysis pipeline
//!
//! Types flow through the pipeline stages in this order:
//! - Ingestion: `SensorRecord` (one row, one value per declared channel)
//! - Feature preparation: `FeatureVector`
//! - Classification: `Prediction`
//! - Aggregation: `AnalysisResult`

mod feature;
mod prediction;
mod record;
mod report;

pub use feature::*;
pub use prediction::*;
pub use record::*;
pub use report::*;
