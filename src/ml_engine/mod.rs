//! Classification and aggregation
//!
//! ## Architecture
//! - `ensemble`: threshold-rule ensemble with majority voting (`RuleEnsemble`)
//! - `aggregator`: reduces predictions into an `AnalysisResult`
//!
//! The orchestrator only sees the [`Classifier`] trait, so a trained ensemble
//! can replace the rule ensemble as long as inference stays deterministic.

pub mod aggregator;
pub mod ensemble;

pub use aggregator::{AggregateError, ResultAggregator};
pub use ensemble::{load_rules, ModelError, RuleEnsemble};

use crate::types::{FeatureVector, Prediction};

/// Maps a feature vector to a labeled prediction.
///
/// Implementations must be pure: the same vector always yields the same
/// prediction, and a well-formed vector never causes a failure.
pub trait Classifier: Send + Sync {
    /// Classifier name for logs (e.g., "rule-ensemble")
    fn name(&self) -> &str;

    /// Label one feature vector
    fn classify(&self, features: &FeatureVector) -> Prediction;
}
