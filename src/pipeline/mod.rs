//! Analysis Pipeline Module
//!
//! ## Staged Pipeline Architecture
//!
//! ```text
//! idle ──► running ──► completed
//!             │
//!             └──────► failed
//!
//! running: ingest ─► prepare ─► classify ─► aggregate
//!            25%       50%        75%         100%
//! ```
//!
//! - `coordinator`: the orchestrator, one run at a time per instance
//! - `pool`: ordered fan-out for the per-record stages
//! - `progress`: stage-boundary notifications
//! - `error`: the terminal error of a failed run

mod coordinator;
mod error;
pub mod pool;
pub mod progress;
mod state;

pub use coordinator::{AnalysisInput, PipelineCoordinator};
pub use error::{ErrorKind, PipelineError, StageError};
pub use pool::{AdaptivePool, RayonPool, SequentialPool, TaskPool};
pub use progress::{LogProgress, ProgressSink, ProgressUpdate};
pub use state::{PipelineState, Stage};
