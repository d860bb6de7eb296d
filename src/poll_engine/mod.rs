//! PollEngine - Fetch Endpoint Polling
//!
//! ## Responsibilities
//!
//! - Idle / Active polling state machine over a `RecurringTask`
//! - Per tick: fetch, decode JSON, extract the list at a dotted key path
//! - Forward non-empty lists to the new-items callback
//! - Report tick failures without stopping the timer
//! - Interval clamping and atomic reschedule

use crate::config::{
    clamp_interval_ms, ErrorCallback, FetchEndpoint, PollingCallbacks, DEFAULT_POLLING_INTERVAL_MS,
    DEFAULT_RESPONSE_KEY,
};
use crate::error::{Error, Result};
use crate::scheduler::{RecurringTask, TaskJob};
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Source of polled JSON documents
#[async_trait]
pub trait PollSource: Send + Sync {
    async fn fetch(&self) -> Result<Value>;
}

/// GET against the configured fetch endpoint
pub struct HttpPollSource {
    client: reqwest::Client,
    endpoint: FetchEndpoint,
}

impl HttpPollSource {
    pub fn new(client: reqwest::Client, endpoint: FetchEndpoint) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl PollSource for HttpPollSource {
    async fn fetch(&self) -> Result<Value> {
        if self.endpoint.url.trim().is_empty() {
            return Ok(Value::Null);
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &self.endpoint.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Config(format!("invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("invalid header value for {}: {}", name, e)))?;
            headers.insert(name, value);
        }

        let resp = self
            .client
            .get(&self.endpoint.url)
            .headers(headers)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::FetchFailed {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        Ok(resp.json::<Value>().await?)
    }
}

/// Navigate `key_path` (dot separated; numeric segments index arrays) and
/// return the list found there. Missing or non-list values yield `None`.
/// A blank key path means `data`.
pub fn extract_items(body: &Value, key_path: &str) -> Option<Vec<Value>> {
    let key_path = match key_path.trim() {
        "" => DEFAULT_RESPONSE_KEY,
        _ => key_path,
    };

    let mut current = body;
    for segment in key_path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    current.as_array().cloned()
}

/// Everything one polling run needs
#[derive(Clone)]
pub struct PollTarget {
    pub source: Arc<dyn PollSource>,
    pub response_key: String,
    pub callbacks: PollingCallbacks,
    pub on_error: Option<ErrorCallback>,
}

impl PollTarget {
    /// One fetch-and-extract cycle
    async fn tick(&self) {
        match self.source.fetch().await {
            Ok(body) => match extract_items(&body, &self.response_key) {
                Some(items) if !items.is_empty() => {
                    tracing::debug!(count = items.len(), key = %self.response_key, "New items polled");
                    if let Some(ref cb) = self.callbacks.on_new_items {
                        cb(items);
                    }
                }
                _ => {
                    tracing::trace!(key = %self.response_key, "No new items");
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Polling tick failed");
                if let Some(ref cb) = self.callbacks.on_polling_error {
                    cb(&e);
                }
                if let Some(ref cb) = self.on_error {
                    cb(&e);
                }
            }
        }
    }
}

/// Polling state machine
pub struct PollEngine {
    task: RecurringTask,
    interval_ms: AtomicU64,
    /// Callbacks of the active run, for the stop notification
    active: Mutex<Option<PollingCallbacks>>,
}

impl Default for PollEngine {
    fn default() -> Self {
        Self::new(DEFAULT_POLLING_INTERVAL_MS)
    }
}

impl PollEngine {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            task: RecurringTask::new("poll"),
            interval_ms: AtomicU64::new(clamp_interval_ms(interval_ms)),
            active: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.is_running()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::SeqCst))
    }

    /// Idle -> Active. Returns `false` if already active.
    pub fn start(&self, target: PollTarget) -> bool {
        let callbacks = target.callbacks.clone();
        if !self.task.start(self.interval(), tick_job(target)) {
            return false;
        }

        tracing::info!(interval_ms = self.interval().as_millis() as u64, "Polling started");
        if let Some(ref cb) = callbacks.on_polling_start {
            cb();
        }
        *self.active.lock() = Some(callbacks);
        true
    }

    /// Active -> Idle. Returns `false` if already idle.
    pub fn stop(&self) -> bool {
        if !self.task.stop() {
            return false;
        }

        tracing::info!("Polling stopped");
        if let Some(callbacks) = self.active.lock().take() {
            if let Some(ref cb) = callbacks.on_polling_stop {
                cb();
            }
        }
        true
    }

    /// Point an active run at a new target without start / stop callbacks.
    /// Returns `false` if idle.
    pub fn retarget(&self, target: PollTarget) -> bool {
        let callbacks = target.callbacks.clone();
        if !self.task.replace_job(tick_job(target)) {
            return false;
        }
        tracing::debug!("Polling target replaced");
        *self.active.lock() = Some(callbacks);
        true
    }

    /// Set the interval (clamped to the floor); restarts the timer if active.
    /// Returns the effective interval in ms.
    pub fn set_interval(&self, ms: u64) -> u64 {
        let ms = clamp_interval_ms(ms);
        self.interval_ms.store(ms, Ordering::SeqCst);
        if self.task.reschedule(Duration::from_millis(ms)) {
            tracing::info!(interval_ms = ms, "Polling interval updated");
        }
        ms
    }

    /// Start or stop to match `enabled`; no-op when already there.
    /// `target` is only built when polling has to start.
    pub fn set_enabled<F>(&self, enabled: bool, target: F) -> Result<bool>
    where
        F: FnOnce() -> Result<PollTarget>,
    {
        match (enabled, self.is_active()) {
            (true, false) => Ok(self.start(target()?)),
            (false, true) => Ok(self.stop()),
            _ => Ok(false),
        }
    }
}

fn tick_job(target: PollTarget) -> TaskJob {
    let target = Arc::new(target);
    Arc::new(move || {
        let target = target.clone();
        async move { target.tick().await }.boxed()
    })
}
