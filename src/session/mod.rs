//! CaptureSession - Session Lifecycle Controller
//!
//! ## Responsibilities
//!
//! - Own the session token, merged configuration, queue and camera handle
//! - Lifecycle: init / mount / unmount
//! - Capture -> Queue -> Upload flow, single-image accept / reject
//! - Poll Engine control (independent of the camera)
//! - QR link generation for the session
//! - Error fan-out to the caller's `on_error`
//!
//! All queue mutation goes through this type. The queue lock is never held
//! across an await, so commands are safe from poll callbacks, upload
//! completion and user actions alike.

mod commands;
mod host;

pub use commands::{BatchReport, CommandOutcome, FailedRecord, QueueCommand, UploadedRecord};
pub use host::{HostSurface, LogHost, NoticeKind, QueueView, ViewMode};

use crate::capture_controller::{encode_still, CameraBackend, CaptureController, NoCamera};
use crate::config::{
    ConfigOverrides, FetchEndpoint, FetchEndpointPatch, SessionConfig, UploadEndpointPatch,
    UploadedFile,
};
use crate::error::{Error, Result};
use crate::image_queue::{CaptureRecord, ImagePayload, ImageQueue};
use crate::poll_engine::{HttpPollSource, PollEngine, PollTarget};
use crate::qr_link::{build_link_url, render_qr_image, QrImage, QrRenderOptions};
use crate::session_id::new_session_id;
use crate::upload_engine::UploadEngine;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Capture / upload / poll session
pub struct CaptureSession {
    session_id: String,
    config: RwLock<Arc<SessionConfig>>,
    initialized: AtomicBool,
    queue: Mutex<ImageQueue>,
    camera: tokio::sync::Mutex<CaptureController>,
    poller: PollEngine,
    client: reqwest::Client,
    host: RwLock<Option<Arc<dyn HostSurface>>>,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSession {
    /// Session without a camera (receiving side)
    pub fn new() -> Self {
        Self::with_camera(Box::new(NoCamera))
    }

    /// Session capturing from `backend`
    pub fn with_camera(backend: Box<dyn CameraBackend>) -> Self {
        let config = SessionConfig::default();
        let session_id = new_session_id();
        tracing::debug!(session_id = %session_id, "Session created");

        Self {
            session_id,
            queue: Mutex::new(
                ImageQueue::new(config.image.effective_capacity())
                    .with_allowed_mime_types(config.image.allowed_mime_types.clone()),
            ),
            poller: PollEngine::new(config.polling_interval_ms),
            config: RwLock::new(Arc::new(config)),
            initialized: AtomicBool::new(false),
            camera: tokio::sync::Mutex::new(CaptureController::new(backend)),
            client: reqwest::Client::new(),
            host: RwLock::new(None),
        }
    }

    /// Use a preconfigured HTTP client for uploads and polling
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Arc<SessionConfig> {
        self.config.read().clone()
    }

    // ============================================================
    // Lifecycle
    // ============================================================

    /// Replace the configuration wholesale (defaults + overrides)
    pub fn init(&self, overrides: ConfigOverrides) {
        let config = SessionConfig::merged(overrides);

        {
            let mut queue = self.queue.lock();
            queue.set_capacity(config.image.effective_capacity());
            queue.set_allowed_mime_types(config.image.allowed_mime_types.clone());
        }
        self.poller.set_interval(config.polling_interval_ms);

        tracing::info!(
            session_id = %self.session_id,
            multi_photo = config.image.multi_photo,
            capacity = config.image.effective_capacity(),
            upload_configured = config.upload.is_some(),
            fetch_configured = config.fetch.is_some(),
            "Session initialized"
        );

        *self.config.write() = Arc::new(config);
        self.initialized.store(true, Ordering::SeqCst);

        if self.poller.is_active() {
            self.poller.retarget(self.poll_target());
        }
    }

    /// Attach a host surface (or the default container) for `current_path`.
    ///
    /// On the capture route the camera is started (when `auto_start_camera`)
    /// and the capture interface rendered. Polling starts when enabled.
    pub async fn mount(&self, host: Option<Arc<dyn HostSurface>>, current_path: &str) -> Result<()> {
        self.ensure_initialized()?;

        let host = host.unwrap_or_else(|| Arc::new(LogHost) as Arc<dyn HostSurface>);
        *self.host.write() = Some(host);

        let config = self.config();
        let capture_route = config.is_capture_route(current_path);
        tracing::info!(
            session_id = %self.session_id,
            path = %current_path,
            capture_route = capture_route,
            "Session mounted"
        );

        if capture_route {
            if config.auto_start_camera {
                // Failure already reported through on_error; the interface still renders
                let _ = self.start_camera().await;
            }
            self.render();
        }

        if config.enable_polling {
            self.start_polling()?;
        }

        Ok(())
    }

    /// Stop camera and polling, drop the queue and detach the host.
    /// Safe to call repeatedly.
    pub async fn unmount(&self) {
        {
            let mut camera = self.camera.lock().await;
            camera.stop();
        }
        self.poller.stop();

        let dropped = self.queue.lock().clear();
        let host = self.host.write().take();
        if let Some(host) = host {
            for record in &dropped {
                host.release_preview(&record.display_handle);
            }
            host.detach_preview();
            host.clear();
        }
        tracing::info!(session_id = %self.session_id, dropped = dropped.len(), "Session unmounted");
    }

    /// Patch the upload endpoint; it must already be configured
    pub fn update_upload_endpoint(&self, patch: UploadEndpointPatch) -> Result<()> {
        self.ensure_initialized()?;
        let next = self.config().with_upload_patch(patch)?;
        *self.config.write() = Arc::new(next);
        tracing::debug!(session_id = %self.session_id, "Upload endpoint updated");
        Ok(())
    }

    /// Patch the fetch endpoint; it must already be configured.
    /// An active poll picks up the new endpoint.
    pub fn update_fetch_endpoint(&self, patch: FetchEndpointPatch) -> Result<()> {
        self.ensure_initialized()?;
        let next = self.config().with_fetch_patch(patch)?;
        *self.config.write() = Arc::new(next);
        tracing::debug!(session_id = %self.session_id, "Fetch endpoint updated");

        if self.poller.is_active() {
            self.poller.retarget(self.poll_target());
        }
        Ok(())
    }

    // ============================================================
    // Camera
    // ============================================================

    pub async fn start_camera(&self) -> Result<()> {
        self.ensure_initialized()?;

        let result = self.camera.lock().await.start().await;
        match result {
            Ok(()) => {
                if let Some(host) = self.host() {
                    host.attach_preview();
                }
                Ok(())
            }
            Err(e) => {
                self.report_error(&e);
                Err(e)
            }
        }
    }

    pub async fn stop_camera(&self) -> Result<()> {
        self.ensure_initialized()?;
        self.camera.lock().await.stop();
        if let Some(host) = self.host() {
            host.detach_preview();
        }
        Ok(())
    }

    pub async fn is_camera_active(&self) -> bool {
        self.camera.lock().await.is_active()
    }

    /// Still from the live preview; does not touch the queue
    pub async fn capture_image(&self) -> Result<ImagePayload> {
        self.ensure_initialized()?;
        let frame = self.camera.lock().await.frame()?;
        encode_still(frame).await
    }

    /// Shutter: capture and append, unless the queue is already full
    pub async fn capture_and_enqueue(&self) -> Result<String> {
        self.ensure_initialized()?;

        let capacity = {
            let queue = self.queue.lock();
            queue.is_full().then(|| queue.capacity())
        };
        if let Some(max) = capacity {
            let err = Error::CapacityExceeded { max };
            if let Some(host) = self.host() {
                host.notify(&err.to_string(), NoticeKind::Error);
            }
            return Err(err);
        }

        let payload = match self.capture_image().await {
            Ok(payload) => payload,
            Err(e) => {
                self.report_error(&e);
                return Err(e);
            }
        };

        self.enqueue(payload)
    }

    // ============================================================
    // Queue
    // ============================================================

    /// Wrap a payload in a fresh record and append it
    pub fn enqueue(&self, payload: ImagePayload) -> Result<String> {
        self.append(CaptureRecord::new(payload))
    }

    /// Append a record as pending
    pub fn append(&self, record: CaptureRecord) -> Result<String> {
        self.ensure_initialized()?;
        let id = self.queue.lock().append(record)?.id.clone();
        self.render();
        Ok(id)
    }

    /// Remove a record; `false` if it was not queued
    pub fn remove(&self, id: &str) -> Result<bool> {
        self.ensure_initialized()?;
        let removed = self.queue.lock().remove(id);
        match removed {
            Some(record) => {
                if let Some(host) = self.host() {
                    host.release_preview(&record.display_handle);
                }
                self.render();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn reorder(&self, from: usize, to: usize) -> Result<()> {
        self.ensure_initialized()?;
        self.queue.lock().reorder(from, to)?;
        self.render();
        Ok(())
    }

    /// Upload every pending / errored record, then commit the successes.
    ///
    /// Failures leave their record as `error` and never stop the others.
    /// The upload-success callback runs once with the successful files.
    pub async fn submit(&self) -> Result<BatchReport> {
        self.ensure_initialized()?;

        let config = self.config();
        let endpoint = config
            .upload
            .clone()
            .ok_or_else(|| Error::Config("Upload API not configured".to_string()))?;

        let items: Vec<(String, ImagePayload)> = {
            let mut queue = self.queue.lock();
            let mut items = Vec::new();
            for id in queue.uploadable_ids() {
                queue.mark_uploading(&id)?;
                if let Some(record) = queue.get(&id) {
                    items.push((id, record.payload.clone()));
                }
            }
            items
        };

        if items.is_empty() {
            return Ok(BatchReport::default());
        }

        tracing::info!(session_id = %self.session_id, count = items.len(), "Submitting batch");
        self.render();

        let engine = UploadEngine::new(self.client.clone(), endpoint);
        let outcomes = engine.upload_batch(&items).await;
        let payloads: HashMap<&str, &ImagePayload> =
            items.iter().map(|(id, p)| (id.as_str(), p)).collect();

        let mut report = BatchReport::default();
        {
            let mut queue = self.queue.lock();
            for outcome in outcomes {
                let file_name = payloads
                    .get(outcome.capture_id.as_str())
                    .map(|p| p.file_name.clone())
                    .unwrap_or_default();
                match outcome.result {
                    Ok(response) => {
                        if let Err(e) = queue.mark_uploaded(&outcome.capture_id) {
                            // Removed while in flight
                            tracing::debug!(capture_id = %outcome.capture_id, error = %e, "Uploaded record no longer queued");
                        }
                        report.uploaded.push(UploadedRecord {
                            capture_id: outcome.capture_id,
                            file_name,
                            response,
                        });
                    }
                    Err(error) => {
                        if let Err(e) = queue.mark_error(&outcome.capture_id, error.to_string()) {
                            tracing::debug!(capture_id = %outcome.capture_id, error = %e, "Failed record no longer queued");
                        }
                        report.failed.push(FailedRecord {
                            capture_id: outcome.capture_id,
                            error,
                        });
                    }
                }
            }
        }

        for failed in &report.failed {
            self.report_error(&failed.error);
        }

        if !report.uploaded.is_empty() {
            if let Some(ref callback) = config.upload.as_ref().and_then(|u| u.on_upload_success.clone()) {
                let files: Vec<UploadedFile> = report
                    .uploaded
                    .iter()
                    .filter_map(|u| {
                        payloads.get(u.capture_id.as_str()).map(|p| UploadedFile {
                            capture_id: u.capture_id.clone(),
                            file_name: p.file_name.clone(),
                            content_type: p.content_type.clone(),
                            bytes: p.bytes.clone(),
                        })
                    })
                    .collect();
                callback(files);
            }

            let committed = self.queue.lock().commit_uploaded();
            if let Some(host) = self.host() {
                for record in &committed {
                    host.release_preview(&record.display_handle);
                }
            }
        }

        tracing::info!(
            session_id = %self.session_id,
            uploaded = report.uploaded.len(),
            failed = report.failed.len(),
            "Batch finished"
        );

        self.render();
        Ok(report)
    }

    /// Single mode "accept": commit through the batch path
    pub async fn accept_single(&self) -> Result<BatchReport> {
        self.submit().await
    }

    /// Single mode "reject": discard the image so a new one can be taken
    pub fn reject_single(&self) -> Result<bool> {
        self.ensure_initialized()?;
        let first = self.queue.lock().records().first().map(|r| r.id.clone());
        match first {
            Some(id) => self.remove(&id),
            None => Ok(false),
        }
    }

    /// Presentation snapshot
    pub fn queue_view(&self) -> QueueView {
        let config = self.config();
        let queue = self.queue.lock();
        QueueView::build(
            &self.session_id,
            config.image.multi_photo,
            queue.capacity(),
            queue.views(),
            queue.stats(),
        )
        .with_logo(config.logo_url.clone())
    }

    // ============================================================
    // QR link
    // ============================================================

    /// Link to the capture route for this session
    pub fn link_url(&self, params: &[(String, String)]) -> Result<String> {
        self.ensure_initialized()?;
        let config = self.config();
        build_link_url(
            &config.qr_link.frontend_url,
            config.qr_link.sdk_route.as_deref(),
            Some(&self.session_id),
            params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        )
    }

    /// Render the session link as a QR image
    pub async fn generate_qr_code(&self, options: &QrRenderOptions) -> Result<QrImage> {
        let url = self.link_url(&options.params)?;
        tracing::debug!(session_id = %self.session_id, url = %url, "Generating QR code");
        render_qr_image(&url, options).await
    }

    // ============================================================
    // Polling
    // ============================================================

    /// Idle -> Active; `false` if already polling
    pub fn start_polling(&self) -> Result<bool> {
        self.ensure_initialized()?;
        Ok(self.poller.start(self.poll_target()))
    }

    /// Active -> Idle; `false` if not polling
    pub fn stop_polling(&self) -> Result<bool> {
        self.ensure_initialized()?;
        Ok(self.poller.stop())
    }

    pub fn is_polling_active(&self) -> bool {
        self.poller.is_active()
    }

    /// Toggle polling; setting the current value is a no-op
    pub fn set_polling_enabled(&self, enabled: bool) -> Result<()> {
        self.ensure_initialized()?;
        self.update_config(|c| c.enable_polling = enabled);
        self.poller.set_enabled(enabled, || Ok(self.poll_target()))?;
        Ok(())
    }

    /// Set the poll interval (floor 1000 ms); returns the effective value
    pub fn set_polling_interval(&self, ms: u64) -> Result<u64> {
        self.ensure_initialized()?;
        let effective = self.poller.set_interval(ms);
        self.update_config(|c| c.polling_interval_ms = effective);
        Ok(effective)
    }

    // ============================================================
    // Internals
    // ============================================================

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            tracing::error!(session_id = %self.session_id, "Session not initialized. Call init() first.");
            Err(Error::NotInitialized)
        }
    }

    fn host(&self) -> Option<Arc<dyn HostSurface>> {
        self.host.read().clone()
    }

    fn render(&self) {
        if let Some(host) = self.host() {
            host.render(&self.queue_view());
        }
    }

    fn update_config(&self, apply: impl FnOnce(&mut SessionConfig)) {
        let mut guard = self.config.write();
        let mut next = SessionConfig::clone(&guard);
        apply(&mut next);
        *guard = Arc::new(next);
    }

    fn poll_target(&self) -> PollTarget {
        let config = self.config();
        let fetch = config.fetch.clone().unwrap_or_else(|| {
            tracing::warn!(session_id = %self.session_id, "Fetch API not configured, poll ticks will be empty");
            FetchEndpoint::default()
        });

        PollTarget {
            response_key: fetch.response_key.clone(),
            source: Arc::new(HttpPollSource::new(self.client.clone(), fetch)),
            callbacks: config.polling.clone(),
            on_error: config.on_error.clone(),
        }
    }

    fn report_error(&self, error: &Error) {
        if error.is_recoverable() {
            tracing::warn!(session_id = %self.session_id, error = %error, code = error.code(), "Recoverable session error");
        } else {
            tracing::error!(session_id = %self.session_id, error = %error, code = error.code(), "Session error");
        }
        if let Some(ref callback) = self.config().on_error {
            callback(error);
        }
    }
}
