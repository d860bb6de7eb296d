//! Presentation surface seen by the session
//!
//! The session never depends on a rendering technology. It hands the host a
//! read-only `QueueView` and short notices; the host turns user gestures back
//! into `QueueCommand`s.

use crate::image_queue::{DisplayHandle, QueueStats, RecordView};
use serde::Serialize;

/// Notice severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Success,
    Error,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::Success => "success",
            NoticeKind::Error => "error",
        }
    }
}

/// Queue presentation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// One image, accept / reject decision
    Single,
    /// Reorderable strip with "upload all"
    Multi,
}

/// Read-only snapshot of what the capture interface shows
#[derive(Debug, Clone, Serialize)]
pub struct QueueView {
    pub session_id: String,
    pub mode: ViewMode,
    pub records: Vec<RecordView>,
    pub stats: QueueStats,
    pub capacity: usize,
    /// Live camera preview and shutter shown
    pub camera_visible: bool,
    /// "Upload all" control shown (multi mode)
    pub upload_all_visible: bool,
    /// Accept / reject controls shown (single mode)
    pub decision_visible: bool,
    /// Header logo
    pub logo_url: Option<String>,
}

impl QueueView {
    pub(crate) fn build(
        session_id: &str,
        multi_photo: bool,
        capacity: usize,
        records: Vec<RecordView>,
        stats: QueueStats,
    ) -> Self {
        let empty = records.is_empty();
        let mode = if multi_photo {
            ViewMode::Multi
        } else {
            ViewMode::Single
        };

        let (camera_visible, upload_all_visible, decision_visible) = match mode {
            _ if empty => (true, false, false),
            ViewMode::Single => (false, false, true),
            ViewMode::Multi => (true, true, false),
        };

        Self {
            session_id: session_id.to_string(),
            mode,
            records,
            stats,
            capacity,
            camera_visible,
            upload_all_visible,
            decision_visible,
            logo_url: None,
        }
    }

    pub(crate) fn with_logo(mut self, logo_url: Option<String>) -> Self {
        self.logo_url = logo_url;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Host-provided rendering surface
pub trait HostSurface: Send + Sync {
    /// Redraw the capture interface
    fn render(&self, view: &QueueView);

    /// Short-lived notice (toast)
    fn notify(&self, message: &str, kind: NoticeKind);

    /// Bind the live camera preview
    fn attach_preview(&self) {}

    /// Unbind the live camera preview
    fn detach_preview(&self) {}

    /// A record left the queue; free its preview
    fn release_preview(&self, _handle: &DisplayHandle) {}

    /// Tear down everything the host drew
    fn clear(&self) {}
}

/// Default container used when `mount` gets no host; logs through tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHost;

impl HostSurface for LogHost {
    fn render(&self, view: &QueueView) {
        tracing::debug!(
            session_id = %view.session_id,
            mode = ?view.mode,
            records = view.records.len(),
            camera_visible = view.camera_visible,
            upload_all_visible = view.upload_all_visible,
            "Capture interface rendered"
        );
    }

    fn notify(&self, message: &str, kind: NoticeKind) {
        match kind {
            NoticeKind::Success => tracing::info!(kind = kind.as_str(), "{}", message),
            NoticeKind::Error => tracing::warn!(kind = kind.as_str(), "{}", message),
        }
    }
}
