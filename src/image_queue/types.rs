//! Image queue data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capture record lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    Pending,
    Uploading,
    Uploaded,
    Error,
}

impl CaptureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Uploaded => "uploaded",
            Self::Error => "error",
        }
    }

    /// pending -> uploading -> {uploaded | error}, error -> uploading (retry)
    pub fn can_transition_to(&self, next: CaptureStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Uploading)
                | (Self::Error, Self::Uploading)
                | (Self::Uploading, Self::Uploaded)
                | (Self::Uploading, Self::Error)
        )
    }

    /// Eligible for a batch upload attempt
    pub fn is_uploadable(&self) -> bool {
        matches!(self, Self::Pending | Self::Error)
    }
}

impl std::fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Captured image bytes plus the metadata sent with them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
            file_name: file_name.into(),
        }
    }

    /// JPEG still from the camera, named `capture-<unix-ms>.jpg`
    pub fn jpeg_capture(bytes: Vec<u8>, captured_at: DateTime<Utc>) -> Self {
        Self::new(
            bytes,
            "image/jpeg",
            format!("capture-{}.jpg", captured_at.timestamp_millis()),
        )
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Local preview reference handed to the presentation layer.
///
/// Never transmitted; released when its record leaves the queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DisplayHandle(String);

impl DisplayHandle {
    pub fn for_record(id: &str) -> Self {
        Self(format!("preview://{}", id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DisplayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Queue entry
#[derive(Debug, Clone)]
pub struct CaptureRecord {
    pub id: String,
    pub payload: ImagePayload,
    pub display_handle: DisplayHandle,
    pub status: CaptureStatus,
    pub error: Option<String>,
    pub progress: Option<u8>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl CaptureRecord {
    /// New pending record with a fresh v4 id
    pub fn new(payload: ImagePayload) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), payload)
    }

    pub fn with_id(id: impl Into<String>, payload: ImagePayload) -> Self {
        let id = id.into();
        Self {
            display_handle: DisplayHandle::for_record(&id),
            id,
            payload,
            status: CaptureStatus::Pending,
            error: None,
            progress: None,
            timestamp: Some(Utc::now()),
        }
    }
}

/// Read-only view of a record for presentation
#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    pub id: String,
    pub display_handle: String,
    pub status: CaptureStatus,
    pub error: Option<String>,
    pub progress: Option<u8>,
    pub timestamp: Option<DateTime<Utc>>,
    pub file_name: String,
    pub size_bytes: usize,
}

impl From<&CaptureRecord> for RecordView {
    fn from(record: &CaptureRecord) -> Self {
        Self {
            id: record.id.clone(),
            display_handle: record.display_handle.to_string(),
            status: record.status,
            error: record.error.clone(),
            progress: record.progress,
            timestamp: record.timestamp,
            file_name: record.payload.file_name.clone(),
            size_bytes: record.payload.len(),
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub uploading: usize,
    pub uploaded: usize,
    pub error: usize,
}
