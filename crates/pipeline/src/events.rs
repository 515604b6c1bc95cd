use std::path::PathBuf;

use mediasort_core::{BatchSummary, ErrorKind, OperationStatus};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

/// Progress notifications emitted while a batch runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ProgressEvent {
    #[serde(rename = "file_started")]
    FileStarted { path: PathBuf },
    /// Emitted once per file, in completion order.
    #[serde(rename = "file_completed")]
    FileCompleted {
        completed: usize,
        total: usize,
        path: PathBuf,
        status: OperationStatus,
        error_kind: Option<ErrorKind>,
    },
    #[serde(rename = "batch_completed")]
    BatchCompleted { summary: BatchSummary },
}

/// Receiver of progress events. Called from worker tasks, so it must not block.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Forwards events into a channel. A dropped receiver is ignored.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// Writes per-file completions to the log.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, event: ProgressEvent) {
        if let ProgressEvent::FileCompleted {
            completed,
            total,
            path,
            status,
            error_kind,
        } = event
        {
            info!(
                completed,
                total,
                path = %path.display(),
                %status,
                error_kind = error_kind.map(ErrorKind::as_str),
                "file done"
            );
        }
    }
}
