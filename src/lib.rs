//! QR Hand-off Library
//!
//! Session-scoped hand-off between a receiving frontend and a capture device
//!
//! ## Architecture (7 Components)
//!
//! 1. SessionId - Opaque per-session token
//! 2. QrLink - Link building and QR rendering
//! 3. ImageQueue - Ordered capture records with lifecycle status
//! 4. CaptureController - Camera stream and JPEG stills
//! 5. UploadEngine - Multipart upload to the configured endpoint
//! 6. PollEngine - Interval polling of the fetch endpoint
//! 7. CaptureSession - Lifecycle controller tying the above together
//!
//! ## Design Principles
//!
//! - Single owner: only `CaptureSession` mutates the queue
//! - Presentation is a collaborator: hosts get views, send commands
//! - Recoverable failures never stop the queue or the poll timer

pub mod capture_controller;
pub mod config;
pub mod error;
pub mod image_queue;
pub mod poll_engine;
pub mod qr_link;
pub mod scheduler;
pub mod session;
pub mod session_id;
pub mod upload_engine;

pub use config::{ConfigOverrides, SessionConfig};
pub use error::{Error, Result};
pub use session::CaptureSession;
