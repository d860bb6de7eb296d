//! Session identity
//!
//! Opaque per-instance token linking the QR-displaying frontend to a
//! capture session.

use uuid::Uuid;

/// Namespace prefix for every session token
pub const SESSION_PREFIX: &str = "sess_";

/// Generate a new session id (`sess_` + 32 hex chars of a v4 UUID)
pub fn new_session_id() -> String {
    format!("{}{}", SESSION_PREFIX, Uuid::new_v4().simple())
}
