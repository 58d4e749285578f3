// Events flowing from the supervisor/installer toward the UI boundary.
//
// The boundary layer consumes these from an ordered channel; delivery order
// and non-loss are the contract, not any particular UI mechanism.

use serde::{Serialize, Serializer};
use std::fmt;
use tokio::sync::mpsc;

/// Terminal status of a single download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed(i32),
    Cancelled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed(code) => write!(f, "failed:{}", code),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// The UI receives the outcome as its wire string ("success" / "failed:<code>"
// / "cancelled"), same as the original event payload.
impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One notification toward the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum Event {
    /// Raw output line from the extraction tool
    DownloadLog(String),

    /// Percentage 0-100, non-decreasing within one job
    DownloadProgress(f64),

    /// Terminal status; strictly the last event of a job
    DownloadComplete(Outcome),

    /// Status line from an update check or install
    UpdateLog(String),
}

/// Sending half of the event channel. Cheap to clone; every producer task
/// holds its own copy. A closed receiver is not an error — the boundary may
/// have gone away, the job keeps running.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn download_log(&self, line: impl Into<String>) {
        self.emit(Event::DownloadLog(line.into()));
    }

    pub fn download_progress(&self, percent: f64) {
        self.emit(Event::DownloadProgress(percent));
    }

    pub fn download_complete(&self, outcome: Outcome) {
        self.emit(Event::DownloadComplete(outcome));
    }

    pub fn update_log(&self, line: impl Into<String>) {
        self.emit(Event::UpdateLog(line.into()));
    }

    fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}
