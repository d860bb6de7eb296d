//! UploadEngine - Multipart Image Upload
//!
//! ## Responsibilities
//!
//! - Send one image as multipart form data to the configured endpoint
//! - Attach static body fields (binary as-is, lists one part per element)
//! - Drop caller `Content-Type` so reqwest sets the multipart boundary
//! - Classify outcomes (2xx JSON / `Upload { status }` / transport)
//! - Attempt a batch with per-record independence

use crate::config::{BodyValue, UploadEndpoint};
use crate::error::{Error, Result};
use crate::image_queue::ImagePayload;
use futures::future::join_all;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::Value;

/// File name used for binary body fields without one
const DEFAULT_BLOB_NAME: &str = "blob";

/// Outcome of one record in a batch
#[derive(Debug)]
pub struct UploadOutcome {
    pub capture_id: String,
    pub result: Result<Value>,
}

/// Uploads payloads to one endpoint
pub struct UploadEngine {
    client: reqwest::Client,
    endpoint: UploadEndpoint,
}

impl UploadEngine {
    pub fn new(client: reqwest::Client, endpoint: UploadEndpoint) -> Self {
        Self { client, endpoint }
    }

    /// Upload one image and decode the JSON response
    pub async fn upload_one(&self, payload: &ImagePayload) -> Result<Value> {
        if self.endpoint.url.trim().is_empty() {
            return Err(Error::Config("Upload URL not configured".to_string()));
        }

        let method = Method::from_bytes(self.endpoint.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| Error::Config(format!("invalid HTTP method: {}", self.endpoint.method)))?;

        let form = self.build_form(payload)?;
        let headers = build_headers(&self.endpoint)?;

        tracing::debug!(
            url = %self.endpoint.url,
            method = %method,
            file_name = %payload.file_name,
            bytes = payload.len(),
            "Uploading image"
        );

        let resp = self
            .client
            .request(method, &self.endpoint.url)
            .headers(headers)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Upload {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        Ok(resp.json::<Value>().await?)
    }

    /// Attempt every payload; one failure never skips the others
    pub async fn upload_batch(&self, items: &[(String, ImagePayload)]) -> Vec<UploadOutcome> {
        let uploads = items.iter().map(|(capture_id, payload)| async move {
            let capture_id = capture_id.clone();
            let result = self.upload_one(payload).await;
            match &result {
                Ok(_) => tracing::info!(capture_id = %capture_id, "Upload succeeded"),
                Err(e) => tracing::warn!(capture_id = %capture_id, error = %e, "Upload failed"),
            }
            UploadOutcome { capture_id, result }
        });
        join_all(uploads).await
    }

    fn build_form(&self, payload: &ImagePayload) -> Result<Form> {
        let file_part = Part::bytes(payload.bytes.clone())
            .file_name(payload.file_name.clone())
            .mime_str(&payload.content_type)?;

        let mut form = Form::new().part(self.endpoint.file_key.clone(), file_part);

        for (key, value) in &self.endpoint.body {
            form = match value {
                BodyValue::List(items) => {
                    let mut form = form;
                    for item in items {
                        form = append_field(form, key, item)?;
                    }
                    form
                }
                other => append_field(form, key, other)?,
            };
        }

        Ok(form)
    }
}

/// Binary values as file parts, everything else as text
fn append_field(form: Form, key: &str, value: &BodyValue) -> Result<Form> {
    match value {
        BodyValue::Binary(binary) => {
            let mut part = Part::bytes(binary.bytes.clone()).file_name(
                binary
                    .file_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_BLOB_NAME.to_string()),
            );
            if let Some(ref content_type) = binary.content_type {
                part = part.mime_str(content_type)?;
            }
            Ok(form.part(key.to_string(), part))
        }
        other => Ok(form.text(key.to_string(), other.stringify())),
    }
}

/// Configured headers minus any `Content-Type`
fn build_headers(endpoint: &UploadEndpoint) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &endpoint.headers {
        if name.eq_ignore_ascii_case("content-type") {
            continue;
        }
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Config(format!("invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::Config(format!("invalid header value for {}: {}", name, e)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn endpoint_with_headers(headers: &[(&str, &str)]) -> UploadEndpoint {
        let mut endpoint = UploadEndpoint::new("http://127.0.0.1:1/upload");
        endpoint.headers = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>();
        endpoint
    }

    #[test]
    fn test_content_type_stripped() {
        let endpoint = endpoint_with_headers(&[
            ("Content-Type", "application/json"),
            ("content-type", "text/plain"),
            ("Authorization", "Bearer t"),
        ]);
        let headers = build_headers(&endpoint).unwrap();
        assert!(headers.get("content-type").is_none());
        assert_eq!(headers.get("authorization").unwrap(), "Bearer t");
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_invalid_header_rejected() {
        let endpoint = endpoint_with_headers(&[("bad header", "x")]);
        assert!(matches!(build_headers(&endpoint), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_empty_url_is_config_error() {
        let engine = UploadEngine::new(reqwest::Client::new(), UploadEndpoint::default());
        let payload = ImagePayload::new(vec![1, 2, 3], "image/jpeg", "a.jpg");
        assert!(matches!(
            engine.upload_one(&payload).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_method_is_config_error() {
        let mut endpoint = UploadEndpoint::new("http://127.0.0.1:1/upload");
        endpoint.method = "NOT A METHOD".to_string();
        let engine = UploadEngine::new(reqwest::Client::new(), endpoint);
        let payload = ImagePayload::new(vec![1], "image/jpeg", "a.jpg");
        assert!(matches!(
            engine.upload_one(&payload).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_attempts_every_record() {
        // Nothing listens on port 1, so every attempt is a transport failure
        let engine = UploadEngine::new(
            reqwest::Client::new(),
            UploadEndpoint::new("http://127.0.0.1:1/upload"),
        );
        let items = vec![
            ("a".to_string(), ImagePayload::new(vec![1], "image/jpeg", "a.jpg")),
            ("b".to_string(), ImagePayload::new(vec![2], "image/jpeg", "b.jpg")),
        ];
        let outcomes = engine.upload_batch(&items).await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].capture_id, "a");
        assert_eq!(outcomes[1].capture_id, "b");
        assert!(outcomes
            .iter()
            .all(|o| matches!(o.result, Err(Error::Transport(_)))));
    }
}
