//! Orchestrator lifecycle and stage names

use serde::{Deserialize, Serialize};

/// Lifecycle of an orchestrator instance.
///
/// `Idle → Running → Completed | Failed`. `Completed` and `Failed` are
/// terminal for the run that reached them; the next request starts a fresh
/// run from `Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// No run has started yet
    #[default]
    Idle,
    /// A run is in flight
    Running,
    /// The last run produced a result
    Completed,
    /// The last run ended with an error or was cancelled
    Failed,
}

impl PipelineState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Pipeline stage, used to attribute progress and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Building the pipeline from configuration
    Setup,
    Ingest,
    Prepare,
    Classify,
    Aggregate,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup => write!(f, "setup"),
            Self::Ingest => write!(f, "ingest"),
            Self::Prepare => write!(f, "prepare"),
            Self::Classify => write!(f, "classify"),
            Self::Aggregate => write!(f, "aggregate"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(PipelineState::default(), PipelineState::Idle);
        assert!(!PipelineState::Running.is_terminal());
        assert!(PipelineState::Failed.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(PipelineState::Completed.to_string(), "completed");
        assert_eq!(Stage::Classify.to_string(), "classify");
    }
}
