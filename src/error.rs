//! Error handling for the QR hand-off core

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed fault reported by camera backends
pub type CameraFault = Box<dyn std::error::Error + Send + Sync>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation invoked before `init`
    #[error("Session not initialized. Call init() first.")]
    NotInitialized,

    /// Queue is full
    #[error("Maximum {max} image{} allowed", plural(.max))]
    CapacityExceeded { max: usize },

    /// Base URL could not be parsed as an absolute URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Camera permission denied or no device
    #[error("Failed to start camera: {0}")]
    CameraUnavailable(#[source] CameraFault),

    /// No preview frame or rasterization failed
    #[error("Capture error: {0}")]
    Capture(String),

    /// Upload endpoint answered with a non-success status
    #[error("Upload failed: {status} {status_text}")]
    Upload { status: u16, status_text: String },

    /// Fetch endpoint answered with a non-success status
    #[error("Failed to fetch images: {status} {status_text}")]
    FetchFailed { status: u16, status_text: String },

    /// QR encoding or raster output failed
    #[error("Render error: {0}")]
    Render(String),

    /// Network-level failure
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// No capture record with this id
    #[error("Capture record not found: {0}")]
    NotFound(String),

    /// Status change not allowed by the record lifecycle
    #[error("Invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },

    /// Reorder index outside the queue
    #[error("Index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Payload content type not in the allow-list
    #[error("Unsupported MIME type: {0}")]
    UnsupportedMimeType(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn plural(n: &usize) -> &'static str {
    if *n == 1 {
        ""
    } else {
        "s"
    }
}

impl Error {
    /// Whether the queue / poll timer stay usable after this error.
    ///
    /// Record-level capture and upload failures and polling failures are
    /// recovered locally; URL, QR and configuration failures only fail the
    /// operation that raised them.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::CameraUnavailable(_)
                | Error::Capture(_)
                | Error::Upload { .. }
                | Error::FetchFailed { .. }
                | Error::Transport(_)
                | Error::CapacityExceeded { .. }
                | Error::UnsupportedMimeType(_)
        )
    }

    /// Short machine-readable code, used as a tracing field
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotInitialized => "NOT_INITIALIZED",
            Error::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::CameraUnavailable(_) => "CAMERA_UNAVAILABLE",
            Error::Capture(_) => "CAPTURE_ERROR",
            Error::Upload { .. } => "UPLOAD_ERROR",
            Error::FetchFailed { .. } => "FETCH_ERROR",
            Error::Render(_) => "RENDER_ERROR",
            Error::Transport(_) => "TRANSPORT_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::InvalidTransition { .. } => "INVALID_TRANSITION",
            Error::IndexOutOfBounds { .. } => "OUT_OF_BOUNDS",
            Error::UnsupportedMimeType(_) => "UNSUPPORTED_MIME_TYPE",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_message_pluralization() {
        assert_eq!(
            Error::CapacityExceeded { max: 1 }.to_string(),
            "Maximum 1 image allowed"
        );
        assert_eq!(
            Error::CapacityExceeded { max: 4 }.to_string(),
            "Maximum 4 images allowed"
        );
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::Upload {
            status: 500,
            status_text: "Internal Server Error".to_string()
        }
        .is_recoverable());
        assert!(!Error::InvalidUrl("nope".to_string()).is_recoverable());
        assert!(!Error::Render("empty".to_string()).is_recoverable());
        assert!(Error::CapacityExceeded { max: 1 }.is_recoverable());
        assert!(!Error::Config("missing".to_string()).is_recoverable());
    }
}
