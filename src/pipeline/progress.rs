//! Stage-boundary progress notifications
//!
//! Progress is advisory: a sink that cannot deliver (closed channel) is
//! ignored and never affects the run.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

use super::Stage;

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Stage that just finished (`Setup` for the initial notification)
    pub stage: Stage,
    /// Human-readable status line
    pub status: String,
    /// 0..=100, strictly increasing within a run
    pub percent: u8,
}

/// Receiver of progress notifications during a run.
pub trait ProgressSink: Send {
    fn report(&mut self, update: ProgressUpdate);
}

/// No-op sink for callers that do not track progress.
impl ProgressSink for () {
    fn report(&mut self, _update: ProgressUpdate) {}
}

/// Collects every notification (tests, batch callers).
impl ProgressSink for Vec<ProgressUpdate> {
    fn report(&mut self, update: ProgressUpdate) {
        self.push(update);
    }
}

/// Forwards notifications to a UI task; a closed receiver is ignored.
impl ProgressSink for UnboundedSender<ProgressUpdate> {
    fn report(&mut self, update: ProgressUpdate) {
        let _ = self.send(update);
    }
}

/// Logs each notification through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&mut self, update: ProgressUpdate) {
        info!(stage = %update.stage, percent = update.percent, "{}", update.status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(percent: u8) -> ProgressUpdate {
        ProgressUpdate {
            stage: Stage::Ingest,
            status: "Ingested".to_string(),
            percent,
        }
    }

    #[test]
    fn test_vec_sink_collects() {
        let mut sink: Vec<ProgressUpdate> = Vec::new();
        sink.report(update(25));
        sink.report(update(50));
        assert_eq!(sink.iter().map(|u| u.percent).collect::<Vec<_>>(), vec![25, 50]);
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (mut tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        tx.report(update(25));
    }

    #[test]
    fn test_channel_sink_delivers() {
        let (mut tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.report(update(75));
        assert_eq!(rx.try_recv().unwrap().percent, 75);
    }
}
