//! Queue command interface
//!
//! Presentation gestures (shutter, drag, remove, tick / cross, upload all)
//! arrive here as `QueueCommand`s; nothing outside the session mutates the
//! queue directly.

use super::CaptureSession;
use crate::error::{Error, Result};
use crate::image_queue::ImagePayload;
use serde_json::Value;

/// User gesture translated into a queue operation
#[derive(Debug, Clone)]
pub enum QueueCommand {
    /// Shutter: capture a frame and append it
    Capture,
    /// Append an externally produced image
    Append(ImagePayload),
    Remove(String),
    Reorder { from: usize, to: usize },
    /// Upload every pending / errored record and commit the successes
    Commit,
    /// Single mode: keep this image
    Accept,
    /// Single mode: discard and re-capture
    Reject,
}

/// Result of a dispatched command
#[derive(Debug)]
pub enum CommandOutcome {
    Appended(String),
    Removed(bool),
    Reordered,
    Committed(BatchReport),
}

/// Record that reached the upload endpoint
#[derive(Debug, Clone)]
pub struct UploadedRecord {
    pub capture_id: String,
    pub file_name: String,
    pub response: Value,
}

/// Record whose upload failed; it stays queued as `error`
#[derive(Debug)]
pub struct FailedRecord {
    pub capture_id: String,
    pub error: Error,
}

/// Per-record outcome of one batch submission
#[derive(Debug, Default)]
pub struct BatchReport {
    pub uploaded: Vec<UploadedRecord>,
    pub failed: Vec<FailedRecord>,
}

impl BatchReport {
    pub fn attempted(&self) -> usize {
        self.uploaded.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempted() == 0
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

impl CaptureSession {
    /// Execute one presentation command
    pub async fn dispatch(&self, command: QueueCommand) -> Result<CommandOutcome> {
        tracing::debug!(session_id = %self.session_id(), command = ?CommandName(&command), "Dispatching queue command");

        match command {
            QueueCommand::Capture => self.capture_and_enqueue().await.map(CommandOutcome::Appended),
            QueueCommand::Append(payload) => self.enqueue(payload).map(CommandOutcome::Appended),
            QueueCommand::Remove(id) => self.remove(&id).map(CommandOutcome::Removed),
            QueueCommand::Reorder { from, to } => {
                self.reorder(from, to).map(|_| CommandOutcome::Reordered)
            }
            QueueCommand::Commit => self.submit().await.map(CommandOutcome::Committed),
            QueueCommand::Accept => self.accept_single().await.map(CommandOutcome::Committed),
            QueueCommand::Reject => self.reject_single().map(CommandOutcome::Removed),
        }
    }
}

/// Debug form without payload bytes
struct CommandName<'a>(&'a QueueCommand);

impl std::fmt::Debug for CommandName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            QueueCommand::Capture => f.write_str("capture"),
            QueueCommand::Append(p) => write!(f, "append({})", p.file_name),
            QueueCommand::Remove(id) => write!(f, "remove({})", id),
            QueueCommand::Reorder { from, to } => write!(f, "reorder({} -> {})", from, to),
            QueueCommand::Commit => f.write_str("commit"),
            QueueCommand::Accept => f.write_str("accept"),
            QueueCommand::Reject => f.write_str("reject"),
        }
    }
}
