//! End-to-end session flows against a throwaway HTTP server
//!
//! The server plays both the upload endpoint (multipart, scripted failures)
//! and the fetch endpoint (scripted JSON / status).

use axum::{
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use qr_handoff::config::{
    BinaryField, BodyValue, FetchEndpointPatch, ImageConstraintsOverrides, PollingCallbacks,
    UploadEndpointPatch, UploadedFile,
};
use qr_handoff::image_queue::{CaptureStatus, ImagePayload};
use qr_handoff::session::{CommandOutcome, QueueCommand};
use qr_handoff::{CaptureSession, ConfigOverrides, Error};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================
// Test server
// ============================================================

#[derive(Debug, Clone)]
struct ReceivedPart {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

#[derive(Debug, Clone)]
struct ReceivedUpload {
    headers: HeaderMap,
    parts: Vec<ReceivedPart>,
}

impl ReceivedUpload {
    fn parts_named(&self, name: &str) -> Vec<&ReceivedPart> {
        self.parts.iter().filter(|p| p.name == name).collect()
    }
}

#[derive(Default)]
struct ServerState {
    /// Fail this many upcoming uploads with 500
    fail_next: AtomicUsize,
    /// Always fail uploads whose file part has one of these names
    fail_file_names: Mutex<HashSet<String>>,
    uploads: Mutex<Vec<ReceivedUpload>>,
    fetch_body: Mutex<Value>,
    /// 0 means 200
    fetch_status: AtomicU16,
    fetch_headers: Mutex<Vec<HeaderMap>>,
}

async fn handle_upload(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    let mut parts = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.unwrap_or_default().to_vec();
        parts.push(ReceivedPart {
            name,
            file_name,
            content_type,
            data,
        });
    }

    let uploaded_name = parts
        .iter()
        .find(|p| p.data.starts_with(&[0xff, 0xd8]))
        .and_then(|p| p.file_name.clone())
        .unwrap_or_default();

    state.uploads.lock().push(ReceivedUpload { headers, parts });

    let scripted_failure = state
        .fail_next
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    let named_failure = state.fail_file_names.lock().contains(&uploaded_name);

    if scripted_failure || named_failure {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "boom" })),
        )
    } else {
        (
            StatusCode::OK,
            Json(json!({ "ok": true, "file": uploaded_name })),
        )
    }
}

async fn handle_items(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.fetch_headers.lock().push(headers);
    let status = match state.fetch_status.load(Ordering::SeqCst) {
        0 => StatusCode::OK,
        code => StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    };
    (status, Json(state.fetch_body.lock().clone()))
}

async fn spawn_server(state: Arc<ServerState>) -> SocketAddr {
    let app = Router::new()
        .route("/upload", post(handle_upload))
        .route("/items", get(handle_items))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ============================================================
// Helpers
// ============================================================

fn jpeg(name: &str) -> ImagePayload {
    ImagePayload::new(vec![0xff, 0xd8, 0xff, 0xe0, 0x01], "image/jpeg", name)
}

type SuccessLog = Arc<Mutex<Vec<Vec<UploadedFile>>>>;

fn upload_overrides(
    addr: SocketAddr,
    multi_photo: bool,
    max_images: usize,
    successes: &SuccessLog,
) -> ConfigOverrides {
    let log = successes.clone();
    ConfigOverrides {
        upload_api: Some(UploadEndpointPatch {
            url: Some(format!("http://{}/upload", addr)),
            on_upload_success: Some(Arc::new(move |files: Vec<UploadedFile>| {
                log.lock().push(files);
            })),
            ..Default::default()
        }),
        image_config: Some(ImageConstraintsOverrides {
            multi_photo: Some(multi_photo),
            max_images: Some(max_images),
            allowed_mime_types: None,
        }),
        ..Default::default()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not met within 5s");
}

// ============================================================
// Upload
// ============================================================

#[tokio::test]
async fn test_upload_500_then_retry_succeeds() {
    let state = Arc::new(ServerState::default());
    state.fail_next.store(1, Ordering::SeqCst);
    let addr = spawn_server(state.clone()).await;

    let successes = SuccessLog::default();
    let session = CaptureSession::new();
    session.init(upload_overrides(addr, false, 1, &successes));
    let id = session.enqueue(jpeg("a.jpg")).unwrap();

    let report = session.submit().await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        report.failed[0].error,
        Error::Upload { status: 500, .. }
    ));

    let view = session.queue_view();
    assert_eq!(view.records[0].id, id);
    assert_eq!(view.records[0].status, CaptureStatus::Error);
    assert!(view.records[0].error.as_deref().unwrap().contains("500"));
    assert!(successes.lock().is_empty());

    // Retry of the errored record
    let report = session.submit().await.unwrap();
    assert_eq!(report.uploaded.len(), 1);
    assert_eq!(report.uploaded[0].capture_id, id);
    assert_eq!(report.uploaded[0].response["file"], "a.jpg");

    assert!(session.queue_view().is_empty());
    let calls = successes.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 1);
    assert_eq!(calls[0][0].file_name, "a.jpg");
    assert_eq!(state.uploads.lock().len(), 2);
}

#[tokio::test]
async fn test_partial_batch_failure() {
    let state = Arc::new(ServerState::default());
    state.fail_file_names.lock().insert("b.jpg".to_string());
    let addr = spawn_server(state.clone()).await;

    let successes = SuccessLog::default();
    let errors = Arc::new(AtomicUsize::new(0));
    let seen = errors.clone();

    let mut overrides = upload_overrides(addr, true, 3, &successes);
    overrides.on_error = Some(Arc::new(move |_: &Error| {
        seen.fetch_add(1, Ordering::SeqCst);
    }));

    let session = CaptureSession::new();
    session.init(overrides);
    session.enqueue(jpeg("a.jpg")).unwrap();
    let b = session.enqueue(jpeg("b.jpg")).unwrap();
    session.enqueue(jpeg("c.jpg")).unwrap();

    let outcome = session.dispatch(QueueCommand::Commit).await.unwrap();
    let report = match outcome {
        CommandOutcome::Committed(report) => report,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(report.attempted(), 3);
    assert_eq!(report.uploaded.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].capture_id, b);

    // Callback ran once with exactly the successes
    let calls = successes.lock();
    assert_eq!(calls.len(), 1);
    let names: Vec<_> = calls[0].iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(names, vec!["a.jpg", "c.jpg"]);
    assert_eq!(calls[0][0].bytes, jpeg("a.jpg").bytes);

    // Only the failed record remains, as error
    let view = session.queue_view();
    assert_eq!(view.records.len(), 1);
    assert_eq!(view.records[0].id, b);
    assert_eq!(view.records[0].status, CaptureStatus::Error);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_all_failures_skip_success_callback() {
    let state = Arc::new(ServerState::default());
    state.fail_next.store(2, Ordering::SeqCst);
    let addr = spawn_server(state.clone()).await;

    let successes = SuccessLog::default();
    let session = CaptureSession::new();
    session.init(upload_overrides(addr, true, 2, &successes));
    session.enqueue(jpeg("a.jpg")).unwrap();
    session.enqueue(jpeg("b.jpg")).unwrap();

    let report = session.submit().await.unwrap();
    assert_eq!(report.failed.len(), 2);
    assert!(successes.lock().is_empty());
    assert_eq!(session.queue_view().stats.error, 2);
}

#[tokio::test]
async fn test_multipart_body_and_headers() {
    let state = Arc::new(ServerState::default());
    let addr = spawn_server(state.clone()).await;

    let mut body = BTreeMap::new();
    body.insert("order_id".to_string(), BodyValue::text("42"));
    body.insert(
        "tags".to_string(),
        BodyValue::List(vec![BodyValue::text("x"), BodyValue::Scalar(json!(7))]),
    );
    body.insert("meta".to_string(), BodyValue::Scalar(json!({ "a": 1 })));
    body.insert(
        "attachment".to_string(),
        BodyValue::Binary(BinaryField::new(vec![1, 2, 3])),
    );

    let mut headers = BTreeMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    headers.insert("X-Api-Key".to_string(), "secret".to_string());

    let session = CaptureSession::new();
    session.init(ConfigOverrides {
        upload_api: Some(UploadEndpointPatch {
            url: Some(format!("http://{}/upload", addr)),
            headers: Some(headers),
            body: Some(body),
            file_key: Some("image".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    });
    session.enqueue(jpeg("a.jpg")).unwrap();

    let report = session.submit().await.unwrap();
    assert!(report.all_succeeded());

    let uploads = state.uploads.lock();
    let upload = &uploads[0];

    let content_type = upload.headers["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data; boundary="));
    assert_eq!(upload.headers["x-api-key"], "secret");

    let image = upload.parts_named("image");
    assert_eq!(image.len(), 1);
    assert_eq!(image[0].file_name.as_deref(), Some("a.jpg"));
    assert_eq!(image[0].content_type.as_deref(), Some("image/jpeg"));
    assert!(upload.parts_named("files").is_empty());

    assert_eq!(upload.parts_named("order_id")[0].data, b"42");

    let tags: Vec<_> = upload
        .parts_named("tags")
        .iter()
        .map(|p| String::from_utf8(p.data.clone()).unwrap())
        .collect();
    assert_eq!(tags, vec!["x", "7"]);

    assert_eq!(upload.parts_named("meta")[0].data, br#"{"a":1}"#);

    let attachment = upload.parts_named("attachment");
    assert_eq!(attachment[0].file_name.as_deref(), Some("blob"));
    assert_eq!(attachment[0].data, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_single_image_accept_and_capacity() {
    let state = Arc::new(ServerState::default());
    let addr = spawn_server(state.clone()).await;

    let successes = SuccessLog::default();
    let session = CaptureSession::new();
    session.init(upload_overrides(addr, false, 1, &successes));

    session.enqueue(jpeg("first.jpg")).unwrap();
    assert!(matches!(
        session.enqueue(jpeg("second.jpg")),
        Err(Error::CapacityExceeded { max: 1 })
    ));

    let report = session.accept_single().await.unwrap();
    assert_eq!(report.uploaded.len(), 1);
    assert!(session.queue_view().is_empty());
    assert_eq!(successes.lock().len(), 1);

    // Slot freed for the next capture
    session.enqueue(jpeg("second.jpg")).unwrap();
}

// ============================================================
// Polling
// ============================================================

fn polling_overrides(
    addr: SocketAddr,
    key: &str,
    items: &Arc<Mutex<Vec<Vec<Value>>>>,
    errors: &Arc<AtomicUsize>,
) -> ConfigOverrides {
    let items = items.clone();
    let errors = errors.clone();
    let mut headers = BTreeMap::new();
    headers.insert("Authorization".to_string(), "Bearer t".to_string());

    ConfigOverrides {
        fetch_api: Some(FetchEndpointPatch {
            url: Some(format!("http://{}/items", addr)),
            headers: Some(headers),
            response_key: Some(key.to_string()),
        }),
        polling_interval: Some(1000),
        polling: Some(PollingCallbacks {
            on_new_items: Some(Arc::new(move |batch: Vec<Value>| {
                items.lock().push(batch);
            })),
            on_polling_error: Some(Arc::new(move |_: &Error| {
                errors.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_polling_delivers_items_at_key_path() {
    let state = Arc::new(ServerState::default());
    *state.fetch_body.lock() = json!({ "result": { "items": [1, 2] } });
    let addr = spawn_server(state.clone()).await;

    let items = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(AtomicUsize::new(0));
    let session = CaptureSession::new();
    session.init(polling_overrides(addr, "result.items", &items, &errors));

    assert!(session.start_polling().unwrap());
    wait_until(|| !items.lock().is_empty()).await;
    session.stop_polling().unwrap();

    assert_eq!(items.lock()[0], vec![json!(1), json!(2)]);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
    assert_eq!(state.fetch_headers.lock()[0]["authorization"], "Bearer t");
}

#[tokio::test]
async fn test_polling_survives_fetch_errors() {
    let state = Arc::new(ServerState::default());
    *state.fetch_body.lock() = json!({ "data": ["new"] });
    state.fetch_status.store(503, Ordering::SeqCst);
    let addr = spawn_server(state.clone()).await;

    let items = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(AtomicUsize::new(0));
    let session = CaptureSession::new();
    session.init(polling_overrides(addr, "data", &items, &errors));
    session.set_polling_enabled(true).unwrap();

    wait_until(|| errors.load(Ordering::SeqCst) >= 1).await;
    assert!(session.is_polling_active());
    assert!(items.lock().is_empty());

    state.fetch_status.store(0, Ordering::SeqCst);
    wait_until(|| !items.lock().is_empty()).await;
    assert_eq!(items.lock()[0], vec![json!("new")]);

    session.unmount().await;
    assert!(!session.is_polling_active());
}

#[tokio::test]
async fn test_fetch_patch_applies_to_active_poll() {
    let state = Arc::new(ServerState::default());
    *state.fetch_body.lock() = json!({ "data": [], "other": ["x"] });
    let addr = spawn_server(state.clone()).await;

    let items = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(AtomicUsize::new(0));
    let session = CaptureSession::new();
    session.init(polling_overrides(addr, "data", &items, &errors));
    session.start_polling().unwrap();

    session
        .update_fetch_endpoint(FetchEndpointPatch {
            response_key: Some("other".to_string()),
            ..Default::default()
        })
        .unwrap();

    wait_until(|| !items.lock().is_empty()).await;
    assert_eq!(items.lock()[0], vec![json!("x")]);
    session.unmount().await;
}
