//! Terminal errors of an analysis run

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Stage;
use crate::acquisition::IngestError;
use crate::config::ConfigError;
use crate::features::FeatureConfigError;
use crate::ml_engine::{AggregateError, ModelError};

/// Error taxonomy surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Format,
    EmptyInput,
    Configuration,
    ModelUnavailable,
    Busy,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Format => write!(f, "FormatError"),
            Self::EmptyInput => write!(f, "EmptyInputError"),
            Self::Configuration => write!(f, "ConfigurationError"),
            Self::ModelUnavailable => write!(f, "ModelUnavailableError"),
            Self::Busy => write!(f, "BusyError"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// The component error behind a failed stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Feature(#[from] FeatureConfigError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// One terminal error per failed run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Another run is in flight on this orchestrator
    #[error("Analysis already running")]
    Busy,

    #[error("Analysis cancelled before {stage}")]
    Cancelled { stage: Stage },

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: StageError,
    },
}

impl PipelineError {
    pub(crate) fn stage(stage: Stage, source: impl Into<StageError>) -> Self {
        Self::Stage {
            stage,
            source: source.into(),
        }
    }

    /// Classify into the error taxonomy.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Busy => ErrorKind::Busy,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Stage { source, .. } => match source {
                StageError::Ingest(IngestError::Format { .. }) => ErrorKind::Format,
                // An empty aggregate means nothing survived ingestion
                StageError::Ingest(IngestError::EmptyInput) | StageError::Aggregate(_) => {
                    ErrorKind::EmptyInput
                }
                StageError::Config(_)
                | StageError::Feature(_)
                | StageError::Model(ModelError::UnknownFeature { .. }) => ErrorKind::Configuration,
                StageError::Model(ModelError::Unavailable(_)) => ErrorKind::ModelUnavailable,
            },
        }
    }

    /// Stage the error originated in, if any.
    pub const fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Busy => None,
            Self::Cancelled { stage } | Self::Stage { stage, .. } => Some(*stage),
        }
    }
}
