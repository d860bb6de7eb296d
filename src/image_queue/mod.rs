//! ImageQueue - Ordered Capture Records
//!
//! ## Responsibilities
//!
//! - Insertion-ordered, user-reorderable list of capture records
//! - Capacity enforcement (rejects, never drops)
//! - Central status transitions (pending -> uploading -> uploaded | error)
//! - Eviction of uploaded records after a committed batch

mod types;

pub use types::{
    CaptureRecord, CaptureStatus, DisplayHandle, ImagePayload, QueueStats, RecordView,
};

use crate::error::{Error, Result};

/// Ordered collection of capture records
#[derive(Debug)]
pub struct ImageQueue {
    records: Vec<CaptureRecord>,
    capacity: usize,
    allowed_mime_types: Vec<String>,
}

impl ImageQueue {
    /// Create queue with an effective capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity.min(16)),
            capacity,
            allowed_mime_types: Vec::new(),
        }
    }

    /// Restrict appended payloads to these content types (empty = any)
    pub fn with_allowed_mime_types(mut self, types: Vec<String>) -> Self {
        self.allowed_mime_types = types;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change capacity; existing records are kept even if above the new limit
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn set_allowed_mime_types(&mut self, types: Vec<String>) {
        self.allowed_mime_types = types;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    pub fn records(&self) -> &[CaptureRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&CaptureRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }

    /// Ids in queue order
    pub fn ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }

    /// Append a record as pending
    ///
    /// Rejects without mutating when the queue is full, the id is already
    /// present or the content type is not allowed.
    pub fn append(&mut self, mut record: CaptureRecord) -> Result<&CaptureRecord> {
        if self.is_full() {
            tracing::debug!(
                capture_id = %record.id,
                capacity = self.capacity,
                "Append rejected - queue full"
            );
            return Err(Error::CapacityExceeded { max: self.capacity });
        }

        if self.get(&record.id).is_some() {
            return Err(Error::Config(format!(
                "Duplicate capture id: {}",
                record.id
            )));
        }

        if !self.allowed_mime_types.is_empty()
            && !self
                .allowed_mime_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&record.payload.content_type))
        {
            return Err(Error::UnsupportedMimeType(record.payload.content_type));
        }

        record.status = CaptureStatus::Pending;
        record.error = None;
        record.progress = None;

        tracing::debug!(
            capture_id = %record.id,
            size = record.payload.len(),
            position = self.records.len(),
            "Capture record appended"
        );

        self.records.push(record);
        Ok(&self.records[self.records.len() - 1])
    }

    /// Remove a record; absent ids are a no-op
    ///
    /// The removed record is returned so its display handle can be released.
    pub fn remove(&mut self, id: &str) -> Option<CaptureRecord> {
        let index = self.position(id)?;
        let record = self.records.remove(index);
        tracing::debug!(capture_id = %id, "Capture record removed");
        Some(record)
    }

    /// Move one record to a new position, keeping the others in order
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.records.len();
        if from >= len {
            return Err(Error::IndexOutOfBounds { index: from, len });
        }
        if to >= len {
            return Err(Error::IndexOutOfBounds { index: to, len });
        }
        if from == to {
            return Ok(());
        }

        let moved = self.records.remove(from);
        tracing::debug!(capture_id = %moved.id, from = from, to = to, "Capture record moved");
        self.records.insert(to, moved);
        Ok(())
    }

    pub fn mark_uploading(&mut self, id: &str) -> Result<()> {
        let record = self.transition(id, CaptureStatus::Uploading)?;
        record.error = None;
        record.progress = Some(0);
        Ok(())
    }

    pub fn mark_uploaded(&mut self, id: &str) -> Result<()> {
        let record = self.transition(id, CaptureStatus::Uploaded)?;
        record.error = None;
        record.progress = Some(100);
        Ok(())
    }

    pub fn mark_error(&mut self, id: &str, detail: impl Into<String>) -> Result<()> {
        let detail = detail.into();
        let record = self.transition(id, CaptureStatus::Error)?;
        record.error = Some(detail);
        record.progress = None;
        Ok(())
    }

    /// Remove every uploaded record and return them in queue order
    pub fn commit_uploaded(&mut self) -> Vec<CaptureRecord> {
        let (committed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|r| r.status == CaptureStatus::Uploaded);
        self.records = kept;

        if !committed.is_empty() {
            tracing::info!(
                committed = committed.len(),
                remaining = self.records.len(),
                "Uploaded records committed"
            );
        }

        committed
    }

    /// Ids of records eligible for upload (pending or error), in queue order
    pub fn uploadable_ids(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.status.is_uploadable())
            .map(|r| r.id.clone())
            .collect()
    }

    /// Drop everything (unmount)
    pub fn clear(&mut self) -> Vec<CaptureRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn stats(&self) -> QueueStats {
        self.records.iter().fold(QueueStats::default(), |mut s, r| {
            match r.status {
                CaptureStatus::Pending => s.pending += 1,
                CaptureStatus::Uploading => s.uploading += 1,
                CaptureStatus::Uploaded => s.uploaded += 1,
                CaptureStatus::Error => s.error += 1,
            }
            s
        })
    }

    pub fn views(&self) -> Vec<RecordView> {
        self.records.iter().map(RecordView::from).collect()
    }

    fn transition(&mut self, id: &str, next: CaptureStatus) -> Result<&mut CaptureRecord> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if !record.status.can_transition_to(next) {
            tracing::warn!(
                capture_id = %id,
                from = %record.status,
                to = %next,
                "Rejected status transition"
            );
            return Err(Error::InvalidTransition {
                id: id.to_string(),
                from: record.status.as_str(),
                to: next.as_str(),
            });
        }

        tracing::debug!(capture_id = %id, from = %record.status, to = %next, "Status transition");
        record.status = next;
        Ok(record)
    }
}
