//! Analysis result handed to the presentation layer

use serde::{Serialize, Serializer};
use std::time::Duration;

use super::{Label, Prediction};

/// Aggregate outcome of one analysis run.
///
/// Only built by the result aggregator, which upholds
/// `failure_predictions + normal_predictions == total_samples` and
/// `predictions.len() == total_samples`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    total_samples: usize,
    failure_predictions: usize,
    normal_predictions: usize,
    /// Same order as the input records
    predictions: Vec<Prediction>,
    /// Serializes as milliseconds
    #[serde(rename = "processing_time_ms", serialize_with = "serialize_millis")]
    processing_time: Duration,
}

impl AnalysisResult {
    pub(crate) fn new(predictions: Vec<Prediction>, processing_time: Duration) -> Self {
        let failure_predictions = predictions
            .iter()
            .filter(|p| p.label() == Label::Failure)
            .count();
        let total_samples = predictions.len();
        Self {
            total_samples,
            failure_predictions,
            normal_predictions: total_samples - failure_predictions,
            predictions,
            processing_time,
        }
    }

    pub const fn total_samples(&self) -> usize {
        self.total_samples
    }

    pub const fn failure_predictions(&self) -> usize {
        self.failure_predictions
    }

    pub const fn normal_predictions(&self) -> usize {
        self.normal_predictions
    }

    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    pub const fn processing_time(&self) -> Duration {
        self.processing_time
    }

    /// Share of samples labeled `failure` (0.0 for an empty result).
    #[allow(clippy::cast_precision_loss)]
    pub fn failure_rate(&self) -> f64 {
        if self.total_samples == 0 {
            0.0
        } else {
            self.failure_predictions as f64 / self.total_samples as f64
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordId;

    fn prediction(i: u64, label: Label) -> Prediction {
        Prediction::new(RecordId::Row(i), label, 1.0, 0, 1, Vec::new())
    }

    #[test]
    fn test_counts_add_up() {
        let result = AnalysisResult::new(
            vec![
                prediction(0, Label::Failure),
                prediction(1, Label::Normal),
                prediction(2, Label::Failure),
            ],
            Duration::from_millis(12),
        );
        assert_eq!(result.total_samples(), 3);
        assert_eq!(result.failure_predictions(), 2);
        assert_eq!(result.normal_predictions(), 1);
        assert!((result.failure_rate() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_duration_serialized_in_millis() {
        let result =
            AnalysisResult::new(vec![prediction(0, Label::Normal)], Duration::from_millis(1500));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["processing_time_ms"], 1500);
        assert_eq!(json["total_samples"], 1);
        assert_eq!(json["failure_predictions"], 0);
        assert_eq!(json["normal_predictions"], 1);
    }

    #[test]
    fn test_empty_result_rate() {
        let result = AnalysisResult::new(Vec::new(), Duration::ZERO);
        assert_eq!(result.failure_rate(), 0.0);
    }
}
