//! Session configuration
//!
//! ## Responsibilities
//!
//! - Immutable `SessionConfig` built by overlaying caller overrides on defaults
//! - Validated partial updates of the upload / fetch endpoints
//! - Loading overrides from JSON or the environment

mod types;

pub use types::{
    BinaryField, BodyValue, ErrorCallback, FetchEndpoint, FetchEndpointPatch, ImageConstraints,
    ImageConstraintsOverrides, ItemsCallback, NotifyCallback, PollingCallbacks, QrLinkConfig,
    QrLinkOverrides, UploadEndpoint, UploadEndpointPatch, UploadSuccessCallback, UploadedFile,
    DEFAULT_FILE_KEY, DEFAULT_POLLING_INTERVAL_MS, DEFAULT_RESPONSE_KEY, DEFAULT_SDK_ROUTE,
    MIN_POLLING_INTERVAL_MS,
};

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Complete, merged configuration
#[derive(Clone)]
pub struct SessionConfig {
    pub qr_link: QrLinkConfig,
    pub upload: Option<UploadEndpoint>,
    pub fetch: Option<FetchEndpoint>,
    pub auto_start_camera: bool,
    pub enable_polling: bool,
    pub polling_interval_ms: u64,
    pub image: ImageConstraints,
    pub polling: PollingCallbacks,
    pub on_error: Option<ErrorCallback>,
    pub logo_url: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            qr_link: QrLinkConfig::default(),
            upload: None,
            fetch: None,
            auto_start_camera: true,
            enable_polling: false,
            polling_interval_ms: DEFAULT_POLLING_INTERVAL_MS,
            image: ImageConstraints::default(),
            polling: PollingCallbacks::default(),
            on_error: None,
            logo_url: None,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("qr_link", &self.qr_link)
            .field("upload", &self.upload)
            .field("fetch", &self.fetch)
            .field("auto_start_camera", &self.auto_start_camera)
            .field("enable_polling", &self.enable_polling)
            .field("polling_interval_ms", &self.polling_interval_ms)
            .field("image", &self.image)
            .field("polling", &self.polling)
            .field("on_error", &self.on_error.is_some())
            .field("logo_url", &self.logo_url)
            .finish()
    }
}

impl SessionConfig {
    /// Overlay overrides on the defaults
    pub fn merged(overrides: ConfigOverrides) -> Self {
        let mut config = Self::default();

        if let Some(qr) = overrides.qr_url {
            config.qr_link = QrLinkConfig {
                frontend_url: qr.frontend_url,
                sdk_route: qr.sdk_route.or(config.qr_link.sdk_route),
            };
        }

        if let Some(patch) = overrides.upload_api {
            config.upload = Some(apply_upload_patch(UploadEndpoint::default(), patch));
        }

        if let Some(patch) = overrides.fetch_api {
            config.fetch = Some(apply_fetch_patch(FetchEndpoint::default(), patch));
        }

        if let Some(v) = overrides.auto_start_camera {
            config.auto_start_camera = v;
        }
        if let Some(v) = overrides.enable_polling {
            config.enable_polling = v;
        }
        if let Some(v) = overrides.polling_interval {
            config.polling_interval_ms = clamp_interval_ms(v);
        }

        if let Some(image) = overrides.image_config {
            if let Some(v) = image.multi_photo {
                config.image.multi_photo = v;
            }
            if let Some(v) = image.max_images {
                config.image.max_images = v;
            }
            if let Some(v) = image.allowed_mime_types {
                config.image.allowed_mime_types = v;
            }
        }

        if let Some(callbacks) = overrides.polling {
            config.polling = callbacks;
        }
        if overrides.on_error.is_some() {
            config.on_error = overrides.on_error;
        }
        if overrides.logo_url.is_some() {
            config.logo_url = overrides.logo_url;
        }

        config
    }

    /// Patch the upload endpoint; fails if it was never configured
    pub fn with_upload_patch(&self, patch: UploadEndpointPatch) -> Result<Self> {
        let current = self
            .upload
            .clone()
            .ok_or_else(|| Error::Config("Upload API not configured".to_string()))?;
        let mut next = self.clone();
        next.upload = Some(apply_upload_patch(current, patch));
        Ok(next)
    }

    /// Patch the fetch endpoint; fails if it was never configured
    pub fn with_fetch_patch(&self, patch: FetchEndpointPatch) -> Result<Self> {
        let current = self
            .fetch
            .clone()
            .ok_or_else(|| Error::Config("Fetch API not configured".to_string()))?;
        let mut next = self.clone();
        next.fetch = Some(apply_fetch_patch(current, patch));
        Ok(next)
    }

    /// Whether `path` is the capture-device route
    pub fn is_capture_route(&self, path: &str) -> bool {
        let route = self
            .qr_link
            .sdk_route
            .as_deref()
            .unwrap_or(DEFAULT_SDK_ROUTE);
        path == route || path.ends_with(route)
    }
}

/// Raise intervals below the floor to the floor
pub fn clamp_interval_ms(ms: u64) -> u64 {
    if ms < MIN_POLLING_INTERVAL_MS {
        tracing::warn!(
            requested_ms = ms,
            min_ms = MIN_POLLING_INTERVAL_MS,
            "Polling interval too low, using minimum"
        );
        MIN_POLLING_INTERVAL_MS
    } else {
        ms
    }
}

fn apply_upload_patch(mut endpoint: UploadEndpoint, patch: UploadEndpointPatch) -> UploadEndpoint {
    if let Some(url) = patch.url {
        endpoint.url = url;
    }
    if let Some(method) = patch.method {
        endpoint.method = method;
    }
    if let Some(headers) = patch.headers {
        endpoint.headers = headers;
    }
    if let Some(body) = patch.body {
        endpoint.body = body;
    }
    if let Some(file_key) = patch.file_key {
        endpoint.file_key = file_key;
    }
    if patch.on_upload_success.is_some() {
        endpoint.on_upload_success = patch.on_upload_success;
    }
    endpoint
}

fn apply_fetch_patch(mut endpoint: FetchEndpoint, patch: FetchEndpointPatch) -> FetchEndpoint {
    if let Some(url) = patch.url {
        endpoint.url = url;
    }
    if let Some(headers) = patch.headers {
        endpoint.headers = headers;
    }
    if let Some(key) = patch.response_key {
        endpoint.response_key = key;
    }
    endpoint
}

// ============================================================
// Overrides
// ============================================================

/// Caller-supplied overrides; every field is optional
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOverrides {
    pub qr_url: Option<QrLinkOverrides>,
    pub upload_api: Option<UploadEndpointPatch>,
    pub fetch_api: Option<FetchEndpointPatch>,
    pub auto_start_camera: Option<bool>,
    pub enable_polling: Option<bool>,
    pub polling_interval: Option<u64>,
    pub image_config: Option<ImageConstraintsOverrides>,
    #[serde(skip)]
    pub polling: Option<PollingCallbacks>,
    #[serde(skip)]
    pub on_error: Option<ErrorCallback>,
    pub logo_url: Option<String>,
}

impl fmt::Debug for ConfigOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigOverrides")
            .field("qr_url", &self.qr_url)
            .field("upload_api", &self.upload_api)
            .field("fetch_api", &self.fetch_api)
            .field("polling_interval", &self.polling_interval)
            .field("image_config", &self.image_config)
            .finish_non_exhaustive()
    }
}

impl ConfigOverrides {
    /// Parse JSON overrides (camelCase keys)
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load JSON overrides from a file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Read overrides from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through a key lookup (env-shaped)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_bool = |key: &str| {
            lookup(key).map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        };

        let qr_url = lookup("QR_FRONTEND_URL").map(|frontend_url| QrLinkOverrides {
            frontend_url,
            sdk_route: lookup("QR_SDK_ROUTE"),
        });

        let upload_api = lookup("UPLOAD_URL").map(|url| UploadEndpointPatch {
            url: Some(url),
            method: lookup("UPLOAD_METHOD"),
            file_key: lookup("UPLOAD_FILE_KEY"),
            ..Default::default()
        });

        let fetch_api = lookup("FETCH_URL").map(|url| FetchEndpointPatch {
            url: Some(url),
            response_key: lookup("FETCH_RESPONSE_KEY"),
            ..Default::default()
        });

        let multi_photo = parse_bool("MULTI_PHOTO");
        let max_images = lookup("MAX_IMAGES").and_then(|v| v.parse().ok());
        let image_config = if multi_photo.is_some() || max_images.is_some() {
            Some(ImageConstraintsOverrides {
                multi_photo,
                max_images,
                allowed_mime_types: None,
            })
        } else {
            None
        };

        Self {
            qr_url,
            upload_api,
            fetch_api,
            auto_start_camera: parse_bool("AUTO_START_CAMERA"),
            enable_polling: parse_bool("ENABLE_POLLING"),
            polling_interval: lookup("POLLING_INTERVAL_MS").and_then(|v| v.parse().ok()),
            image_config,
            logo_url: lookup("QR_LOGO_URL"),
            ..Default::default()
        }
    }

    /// Fill every field still unset from `fallback`
    pub fn or(self, fallback: ConfigOverrides) -> Self {
        Self {
            qr_url: self.qr_url.or(fallback.qr_url),
            upload_api: self.upload_api.or(fallback.upload_api),
            fetch_api: self.fetch_api.or(fallback.fetch_api),
            auto_start_camera: self.auto_start_camera.or(fallback.auto_start_camera),
            enable_polling: self.enable_polling.or(fallback.enable_polling),
            polling_interval: self.polling_interval.or(fallback.polling_interval),
            image_config: self.image_config.or(fallback.image_config),
            polling: self.polling.or(fallback.polling),
            on_error: self.on_error.or(fallback.on_error),
            logo_url: self.logo_url.or(fallback.logo_url),
        }
    }
}
