//! Progress notification service abstraction.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::job::RenderOutcome;

/// A job-progress notification service.
///
/// Implementations must not block for long: calls are made from the
/// supervision task between stderr lines.
pub trait ProgressReporter: Send {
    /// Replace the human-readable job description.
    fn set_description(&mut self, text: &str);

    /// Report a percentage in `[0, 100]`.
    fn set_percent(&mut self, percent: u8);

    /// Dismiss the job entry.
    fn close(&mut self);

    /// Called once with the terminal outcome.
    fn finished(&mut self, outcome: &RenderOutcome) {
        self.set_description(&outcome.summary());
        self.close();
    }
}

impl<R: ProgressReporter + ?Sized> ProgressReporter for Box<R> {
    fn set_description(&mut self, text: &str) {
        (**self).set_description(text)
    }

    fn set_percent(&mut self, percent: u8) {
        (**self).set_percent(percent)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn finished(&mut self, outcome: &RenderOutcome) {
        (**self).finished(outcome)
    }
}

/// Reports progress as structured tracing events.
#[derive(Debug, Default)]
pub struct TracingReporter {
    job: String,
}

impl TracingReporter {
    pub fn new(job: impl Into<String>) -> Self {
        Self { job: job.into() }
    }
}

impl ProgressReporter for TracingReporter {
    fn set_description(&mut self, text: &str) {
        tracing::info!(job = %self.job, description = text, "Render status");
    }

    fn set_percent(&mut self, percent: u8) {
        tracing::info!(job = %self.job, percent, "Render progress");
    }

    fn close(&mut self) {
        tracing::debug!(job = %self.job, "Render progress closed");
    }
}

/// A progress update delivered to an in-process host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Description { text: String },
    Percent { value: u8 },
    Finished { status: String, message: String },
    Close,
}

/// Forwards progress updates over a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    /// Create a reporter and the receiving end for the host.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Progress receiver dropped; update discarded");
        }
    }
}

impl ProgressReporter for ChannelReporter {
    fn set_description(&mut self, text: &str) {
        self.send(ProgressEvent::Description {
            text: text.to_string(),
        });
    }

    fn set_percent(&mut self, percent: u8) {
        self.send(ProgressEvent::Percent { value: percent });
    }

    fn close(&mut self) {
        self.send(ProgressEvent::Close);
    }

    fn finished(&mut self, outcome: &RenderOutcome) {
        self.send(ProgressEvent::Finished {
            status: outcome.status.as_str().to_string(),
            message: outcome.message.clone(),
        });
        self.close();
    }
}
