//! Pipeline Coordinator - staged analysis of one telemetry batch
//!
//! ```text
//! STAGE 1: Ingest     raw table / synthetic generator → SensorRecord   (25%)
//! STAGE 2: Prepare    SensorRecord → FeatureVector, per record          (50%)
//! STAGE 3: Classify   FeatureVector → Prediction, per record            (75%)
//! STAGE 4: Aggregate  Predictions → AnalysisResult                      (100%)
//! ```
//!
//! Progress is reported at each stage boundary, where the run also yields
//! to the runtime and honours cancellation. The first error ends the run;
//! partial work is dropped and no result is produced.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::PipelineError;
use super::pool::{AdaptivePool, TaskPool};
use super::progress::{ProgressSink, ProgressUpdate};
use super::state::{PipelineState, Stage};
use crate::acquisition::{SyntheticGenerator, TableIngestor};
use crate::config::defaults::{
    PROGRESS_CLASSIFIED, PROGRESS_COMPLETED, PROGRESS_INGESTED, PROGRESS_PREPARED,
    PROGRESS_STARTED,
};
use crate::config::{AnalysisConfig, SyntheticConfig};
use crate::features::FeaturePreparer;
use crate::ml_engine::{Classifier, ResultAggregator, RuleEnsemble};
use crate::types::{AnalysisResult, ChannelSet};

/// Source of the records for one run.
#[derive(Debug, Clone, Copy)]
pub enum AnalysisInput<'a> {
    /// Header + rows text
    Table(&'a str),
    /// In-process generator with a fixed size and seed
    Synthetic(SyntheticConfig),
}

/// Sequences ingest → prepare → classify → aggregate for one run at a time.
pub struct PipelineCoordinator<P: TaskPool = AdaptivePool> {
    ingestor: TableIngestor,
    preparer: FeaturePreparer,
    classifier: Box<dyn Classifier>,
    aggregator: ResultAggregator,
    pool: P,
    state: Mutex<PipelineState>,
}

/// Marks the coordinator `Failed` unless the run completes.
///
/// Covers early returns through `?` as well as a dropped analysis future.
struct RunGuard<'a> {
    state: &'a Mutex<PipelineState>,
    completed: bool,
}

impl RunGuard<'_> {
    fn complete(mut self) {
        *lock(self.state) = PipelineState::Completed;
        self.completed = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            *lock(self.state) = PipelineState::Failed;
        }
    }
}

/// The state is a plain enum, so a poisoned lock still holds a usable value.
fn lock(state: &Mutex<PipelineState>) -> MutexGuard<'_, PipelineState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn emit<S: ProgressSink + ?Sized>(sink: &mut S, stage: Stage, percent: u8, status: String) {
    sink.report(ProgressUpdate {
        stage,
        status,
        percent,
    });
}

/// Stage boundary: yield to the runtime, then honour cancellation.
async fn checkpoint(cancel: &CancellationToken, next: Stage) -> Result<(), PipelineError> {
    tokio::task::yield_now().await;
    if cancel.is_cancelled() {
        warn!(stage = %next, "Analysis cancelled");
        return Err(PipelineError::Cancelled { stage: next });
    }
    Ok(())
}

impl PipelineCoordinator<AdaptivePool> {
    /// Build the full pipeline from configuration.
    ///
    /// Validates the channel set, feature definitions and rule set; every
    /// error is attributed to [`Stage::Setup`].
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, PipelineError> {
        let setup = |e| PipelineError::stage(Stage::Setup, e);

        config.validate().map_err(setup)?;
        let ingestor = TableIngestor::from_config(&config.channels).map_err(setup)?;
        let preparer = FeaturePreparer::new(
            Arc::clone(ingestor.channels()),
            &config.imputation,
            &config.features,
        )
        .map_err(|e| PipelineError::stage(Stage::Setup, e))?;
        let ensemble = RuleEnsemble::from_config(&config.ensemble, Arc::clone(preparer.schema()))
            .map_err(|e| PipelineError::stage(Stage::Setup, e))?;

        info!(
            channels = ingestor.channels().len(),
            features = preparer.schema().len(),
            rules = ensemble.rule_count(),
            parallel_threshold = config.pipeline.parallel_threshold,
            "Pipeline coordinator initialized"
        );

        Ok(Self {
            ingestor,
            preparer,
            classifier: Box::new(ensemble),
            aggregator: ResultAggregator::new(config.pipeline.require_samples),
            pool: AdaptivePool::new(
                config.pipeline.parallel_threshold,
                config.pipeline.worker_threads,
            ),
            state: Mutex::new(PipelineState::Idle),
        })
    }
}

impl<P: TaskPool> PipelineCoordinator<P> {
    /// Swap the task pool used by the per-record stages.
    pub fn with_pool<Q: TaskPool>(self, pool: Q) -> PipelineCoordinator<Q> {
        PipelineCoordinator {
            ingestor: self.ingestor,
            preparer: self.preparer,
            classifier: self.classifier,
            aggregator: self.aggregator,
            pool,
            state: self.state,
        }
    }

    /// Replace the classification engine.
    ///
    /// The classifier must accept vectors of [`FeaturePreparer::schema`].
    #[must_use]
    pub fn with_classifier(mut self, classifier: Box<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn state(&self) -> PipelineState {
        *lock(&self.state)
    }

    pub const fn channels(&self) -> &Arc<ChannelSet> {
        self.ingestor.channels()
    }

    pub const fn preparer(&self) -> &FeaturePreparer {
        &self.preparer
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    fn begin(&self) -> Result<RunGuard<'_>, PipelineError> {
        let mut state = lock(&self.state);
        if *state == PipelineState::Running {
            return Err(PipelineError::Busy);
        }
        if state.is_terminal() {
            debug!(previous = %*state, "Resetting coordinator for a new run");
        }
        *state = PipelineState::Running;
        Ok(RunGuard {
            state: &self.state,
            completed: false,
        })
    }

    /// Run one analysis to completion.
    ///
    /// Progress goes to `progress` at every stage boundary with strictly
    /// increasing percentages; 100 is reported only after the coordinator
    /// has moved to [`PipelineState::Completed`].
    ///
    /// # Errors
    /// - [`PipelineError::Busy`] if another run is in flight (the running
    ///   run is unaffected)
    /// - [`PipelineError::Cancelled`] when `cancel` fires, checked at each
    ///   stage boundary
    /// - [`PipelineError::Stage`] for the first component error
    pub async fn analyze<S: ProgressSink + ?Sized>(
        &self,
        input: AnalysisInput<'_>,
        progress: &mut S,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, PipelineError> {
        let guard = self.begin()?;
        let started = Instant::now();
        info!(classifier = self.classifier.name(), "Analysis started");
        emit(progress, Stage::Setup, PROGRESS_STARTED, "Starting analysis".to_string());

        // STAGE 1: Ingest
        checkpoint(cancel, Stage::Ingest).await?;
        let records = match input {
            AnalysisInput::Table(raw) => self.ingestor.ingest(raw),
            AnalysisInput::Synthetic(synthetic) => {
                SyntheticGenerator::new(Arc::clone(self.ingestor.channels()), synthetic).generate()
            }
        }
        .map_err(|e| PipelineError::stage(Stage::Ingest, e))?;
        info!(records = records.len(), "Ingestion complete");
        emit(
            progress,
            Stage::Ingest,
            PROGRESS_INGESTED,
            format!("Ingested {} records", records.len()),
        );

        // STAGE 2: Prepare
        checkpoint(cancel, Stage::Prepare).await?;
        let features = self
            .pool
            .map_ordered(&records, |record| self.preparer.prepare(record));
        drop(records);
        emit(
            progress,
            Stage::Prepare,
            PROGRESS_PREPARED,
            format!("Prepared {} feature vectors", features.len()),
        );

        // STAGE 3: Classify
        checkpoint(cancel, Stage::Classify).await?;
        let predictions = self
            .pool
            .map_ordered(&features, |vector| self.classifier.classify(vector));
        drop(features);
        emit(
            progress,
            Stage::Classify,
            PROGRESS_CLASSIFIED,
            format!("Classified {} records", predictions.len()),
        );

        // STAGE 4: Aggregate
        checkpoint(cancel, Stage::Aggregate).await?;
        let result = self
            .aggregator
            .aggregate(predictions, started.elapsed())
            .map_err(|e| PipelineError::stage(Stage::Aggregate, e))?;

        guard.complete();
        emit(
            progress,
            Stage::Aggregate,
            PROGRESS_COMPLETED,
            "Analysis complete".to_string(),
        );
        info!(
            total = result.total_samples(),
            failures = result.failure_predictions(),
            normal = result.normal_predictions(),
            elapsed_ms = result.processing_time().as_millis(),
            "Analysis complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::pool::SequentialPool;
    use crate::pipeline::ErrorKind;
    use crate::types::{FeatureVector, Label, Prediction};
    use std::task::Poll;

    const RAW: &str = "temperature,vibration,pressure,rotational_speed\n\
                       90,8,100,1500\n\
                       40,1,100,1500\n\
                       85,6,100,1500\n";

    fn coordinator() -> PipelineCoordinator {
        PipelineCoordinator::from_config(&AnalysisConfig::default()).unwrap()
    }

    struct AlwaysNormal;

    impl Classifier for AlwaysNormal {
        fn name(&self) -> &str {
            "always-normal"
        }

        fn classify(&self, features: &FeatureVector) -> Prediction {
            Prediction::new(features.id(), Label::Normal, 1.0, 0, 1, Vec::new())
        }
    }

    #[tokio::test]
    async fn test_completed_run_reports_every_stage() {
        let coord = coordinator();
        let mut progress: Vec<ProgressUpdate> = Vec::new();
        let result = coord
            .analyze(AnalysisInput::Table(RAW), &mut progress, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.total_samples(), 3);
        assert_eq!(coord.state(), PipelineState::Completed);
        let percents: Vec<u8> = progress.iter().map(|u| u.percent).collect();
        assert_eq!(percents, vec![0, 25, 50, 75, 100]);
        assert_eq!(progress[4].status, "Analysis complete");
    }

    #[tokio::test]
    async fn test_failed_run_stops_progress_and_sets_failed() {
        let coord = coordinator();
        let mut progress: Vec<ProgressUpdate> = Vec::new();
        let err = coord
            .analyze(
                AnalysisInput::Table("temperature,vibration,pressure,rotational_speed\n"),
                &mut progress,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyInput);
        assert_eq!(err.failed_stage(), Some(Stage::Ingest));
        assert_eq!(coord.state(), PipelineState::Failed);
        assert_eq!(progress.iter().map(|u| u.percent).max(), Some(0));
    }

    #[tokio::test]
    async fn test_new_run_after_failure() {
        let coord = coordinator();
        let cancel = CancellationToken::new();
        assert!(coord.analyze(AnalysisInput::Table(""), &mut (), &cancel).await.is_err());
        assert_eq!(coord.state(), PipelineState::Failed);
        coord.analyze(AnalysisInput::Table(RAW), &mut (), &cancel).await.unwrap();
        assert_eq!(coord.state(), PipelineState::Completed);
    }

    #[test]
    fn test_second_request_while_running_is_busy() {
        let coord = coordinator();
        let cancel = CancellationToken::new();
        let mut progress: Vec<ProgressUpdate> = Vec::new();
        let mut first = tokio_test::task::spawn(coord.analyze(
            AnalysisInput::Table(RAW),
            &mut progress,
            &cancel,
        ));
        assert!(first.poll().is_pending());
        assert_eq!(coord.state(), PipelineState::Running);

        let second =
            tokio_test::block_on(coord.analyze(AnalysisInput::Table(RAW), &mut (), &cancel));
        assert!(matches!(second, Err(PipelineError::Busy)));
        assert_eq!(coord.state(), PipelineState::Running);

        let result = loop {
            if let Poll::Ready(r) = first.poll() {
                break r;
            }
        };
        assert_eq!(result.unwrap().total_samples(), 3);
        assert_eq!(coord.state(), PipelineState::Completed);
        drop(first);
        assert_eq!(progress.last().map(|u| u.percent), Some(100));
    }

    #[test]
    fn test_dropped_run_leaves_failed() {
        let coord = coordinator();
        let cancel = CancellationToken::new();
        let mut progress: Vec<ProgressUpdate> = Vec::new();
        let mut run = tokio_test::task::spawn(coord.analyze(
            AnalysisInput::Table(RAW),
            &mut progress,
            &cancel,
        ));
        assert!(run.poll().is_pending());
        drop(run);
        assert_eq!(coord.state(), PipelineState::Failed);
    }

    #[tokio::test]
    async fn test_cancel_before_ingest() {
        let coord = coordinator();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut progress: Vec<ProgressUpdate> = Vec::new();
        let err = coord
            .analyze(AnalysisInput::Table(RAW), &mut progress, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { stage: Stage::Ingest }));
        assert_eq!(coord.state(), PipelineState::Failed);
        assert_eq!(progress.len(), 1);
    }

    #[tokio::test]
    async fn test_replaced_classifier_and_pool() {
        let coord = coordinator()
            .with_classifier(Box::new(AlwaysNormal))
            .with_pool(SequentialPool);
        let result = coord
            .analyze(AnalysisInput::Table(RAW), &mut (), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.failure_predictions(), 0);
        assert_eq!(coord.classifier().name(), "always-normal");
    }

    #[tokio::test]
    async fn test_synthetic_input() {
        let coord = coordinator();
        let synthetic = SyntheticConfig {
            rows: 40,
            seed: 5,
            failure_rate: 0.25,
        };
        let result = coord
            .analyze(AnalysisInput::Synthetic(synthetic), &mut (), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.total_samples(), 40);
    }

    #[test]
    fn test_setup_errors_carry_setup_stage() {
        let mut config = AnalysisConfig::default();
        config.ensemble.rules[0].conditions[0].feature = "humidity".to_string();
        let err = PipelineCoordinator::from_config(&config).err().unwrap();
        assert_eq!(err.failed_stage(), Some(Stage::Setup));
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let mut config = AnalysisConfig::default();
        config.ensemble.rules.clear();
        let err = PipelineCoordinator::from_config(&config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
    }
}
