//! Result aggregation: predictions in, report out.

use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::types::{AnalysisResult, Prediction};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("No predictions to aggregate")]
    NoPredictions,
}

/// Pure reduction of a run's predictions into an [`AnalysisResult`].
#[derive(Debug, Clone, Copy)]
pub struct ResultAggregator {
    require_samples: bool,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ResultAggregator {
    pub const fn new(require_samples: bool) -> Self {
        Self { require_samples }
    }

    /// Count labels, keep input order, attach the run duration.
    ///
    /// # Errors
    /// [`AggregateError::NoPredictions`] for an empty sequence when samples
    /// are required.
    pub fn aggregate(
        &self,
        predictions: Vec<Prediction>,
        elapsed: Duration,
    ) -> Result<AnalysisResult, AggregateError> {
        if predictions.is_empty() && self.require_samples {
            return Err(AggregateError::NoPredictions);
        }
        let result = AnalysisResult::new(predictions, elapsed);
        debug!(
            total = result.total_samples(),
            failures = result.failure_predictions(),
            "Aggregated predictions"
        );
        Ok(result)
    }
}
