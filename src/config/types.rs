//! Configuration data types
//!
//! Endpoint descriptors, image constraints and caller callbacks

use crate::error::Error;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Default link route appended to the frontend URL
pub const DEFAULT_SDK_ROUTE: &str = "/qr-upload";
/// Default multipart field for the image
pub const DEFAULT_FILE_KEY: &str = "files";
/// Default key path for polled items
pub const DEFAULT_RESPONSE_KEY: &str = "data";
/// Default poll interval (ms)
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 3000;
/// Poll interval floor (ms)
pub const MIN_POLLING_INTERVAL_MS: u64 = 1000;

// ============================================================
// Callbacks
// ============================================================

pub type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;
pub type NotifyCallback = Arc<dyn Fn() + Send + Sync>;
pub type ItemsCallback = Arc<dyn Fn(Vec<serde_json::Value>) + Send + Sync>;
pub type UploadSuccessCallback = Arc<dyn Fn(Vec<UploadedFile>) + Send + Sync>;

/// File handed to the upload-success callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub capture_id: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Polling lifecycle callbacks
#[derive(Clone, Default)]
pub struct PollingCallbacks {
    pub on_polling_start: Option<NotifyCallback>,
    pub on_polling_stop: Option<NotifyCallback>,
    pub on_polling_error: Option<ErrorCallback>,
    pub on_new_items: Option<ItemsCallback>,
}

impl fmt::Debug for PollingCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingCallbacks")
            .field("on_polling_start", &self.on_polling_start.is_some())
            .field("on_polling_stop", &self.on_polling_stop.is_some())
            .field("on_polling_error", &self.on_polling_error.is_some())
            .field("on_new_items", &self.on_new_items.is_some())
            .finish()
    }
}

// ============================================================
// Body fields
// ============================================================

/// Binary multipart field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryField {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

impl BinaryField {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: None,
            content_type: None,
        }
    }
}

/// Static body field attached to every upload
///
/// Binary values go out as file parts, lists as one part per element,
/// everything else as text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BodyValue {
    #[serde(skip)]
    Binary(BinaryField),
    List(Vec<BodyValue>),
    Scalar(serde_json::Value),
}

impl BodyValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Scalar(serde_json::Value::String(value.into()))
    }

    /// Text form of a non-binary value
    pub fn stringify(&self) -> String {
        match self {
            Self::Scalar(serde_json::Value::String(s)) => s.clone(),
            Self::Scalar(other) => other.to_string(),
            Self::List(items) => items
                .iter()
                .map(|i| i.stringify())
                .collect::<Vec<_>>()
                .join(","),
            Self::Binary(b) => b.file_name.clone().unwrap_or_else(|| "blob".to_string()),
        }
    }
}

impl From<&str> for BodyValue {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<String> for BodyValue {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

impl From<BinaryField> for BodyValue {
    fn from(b: BinaryField) -> Self {
        Self::Binary(b)
    }
}

// ============================================================
// Endpoints
// ============================================================

/// Upload endpoint descriptor
#[derive(Clone)]
pub struct UploadEndpoint {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: BTreeMap<String, BodyValue>,
    pub file_key: String,
    pub on_upload_success: Option<UploadSuccessCallback>,
}

impl UploadEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for UploadEndpoint {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "POST".to_string(),
            headers: BTreeMap::new(),
            body: BTreeMap::new(),
            file_key: DEFAULT_FILE_KEY.to_string(),
            on_upload_success: None,
        }
    }
}

impl fmt::Debug for UploadEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadEndpoint")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("body", &self.body.keys().collect::<Vec<_>>())
            .field("file_key", &self.file_key)
            .field("on_upload_success", &self.on_upload_success.is_some())
            .finish()
    }
}

/// Fetch endpoint descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchEndpoint {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub response_key: String,
}

impl FetchEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for FetchEndpoint {
    fn default() -> Self {
        Self {
            url: String::new(),
            headers: BTreeMap::new(),
            response_key: DEFAULT_RESPONSE_KEY.to_string(),
        }
    }
}

/// QR link target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrLinkConfig {
    pub frontend_url: String,
    pub sdk_route: Option<String>,
}

impl Default for QrLinkConfig {
    fn default() -> Self {
        Self {
            frontend_url: String::new(),
            sdk_route: Some(DEFAULT_SDK_ROUTE.to_string()),
        }
    }
}

/// Image constraints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageConstraints {
    pub multi_photo: bool,
    pub max_images: usize,
    pub allowed_mime_types: Vec<String>,
}

impl ImageConstraints {
    /// 1 in single-photo mode regardless of `max_images`
    pub fn effective_capacity(&self) -> usize {
        if self.multi_photo {
            self.max_images
        } else {
            1
        }
    }
}

impl Default for ImageConstraints {
    fn default() -> Self {
        Self {
            multi_photo: false,
            max_images: 1,
            allowed_mime_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
            ],
        }
    }
}

// ============================================================
// Overrides / patches (deserializable)
// ============================================================

/// QR link override
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrLinkOverrides {
    pub frontend_url: String,
    #[serde(default)]
    pub sdk_route: Option<String>,
}

/// Partial image constraints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConstraintsOverrides {
    pub multi_photo: Option<bool>,
    pub max_images: Option<usize>,
    pub allowed_mime_types: Option<Vec<String>>,
}

/// Partial upload endpoint; also used as a patch
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEndpointPatch {
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub body: Option<BTreeMap<String, BodyValue>>,
    pub file_key: Option<String>,
    #[serde(skip)]
    pub on_upload_success: Option<UploadSuccessCallback>,
}

impl fmt::Debug for UploadEndpointPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadEndpointPatch")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("file_key", &self.file_key)
            .finish_non_exhaustive()
    }
}

/// Partial fetch endpoint; also used as a patch
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchEndpointPatch {
    pub url: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub response_key: Option<String>,
}
