//! Side-channel notifications of a run.
//!
//! Notifications never decide the outcome of a run; they report progress and
//! non-fatal events next to the job status.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Reading,
    Transcoding,
    Finalizing,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Reading => "reading",
            RunState::Transcoding => "transcoding",
            RunState::Finalizing => "finalizing",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    StateChanged { state: RunState },
    /// The preview decoder failed; the run continues without preview.
    PreviewDisabled { reason: String },
    UploadSucceeded { filename: String },
    UploadFailed { filename: String, error: String },
}

/// Sending half of a notification channel. Sends never block and never fail
/// the sender: a closed or absent receiver just drops the notification.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<mpsc::UnboundedSender<Notification>>,
}

impl Notifier {
    pub fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, notification: Notification) {
        if let Some(tx) = &self.tx
            && tx.send(notification).is_err()
        {
            trace!("Notification receiver dropped");
        }
    }
}
