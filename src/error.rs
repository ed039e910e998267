//! Error types for the playground.
//!
//! Every failure inside the sandbox degrades to "the preview did not
//! update". These types exist so callers can log what happened; none of them
//! is ever allowed to escape the controller as a panic.

use thiserror::Error;

/// Failure while turning the source buffers into a document.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("composition failed: {0}")]
    Failed(String),
}

/// Failure while publishing a document or reclaiming its handle.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unknown or already released content handle: {0}")]
    UnknownHandle(String),

    #[error("preview host is not running")]
    HostUnavailable,

    #[error("blob store lock poisoned")]
    StorePoisoned,
}

/// Failure while reformatting a buffer. The buffer is left untouched.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unbalanced '{0}' at byte {1}")]
    Unbalanced(char, usize),

    #[error("unterminated {0} starting at byte {1}")]
    Unterminated(&'static str, usize),
}

/// Failure while looking up library content.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("no example named '{name}'. Available: {available}")]
    UnknownExample { name: String, available: String },
}

/// Failure in the stdin session protocol.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid request: {0}")]
    InvalidRequest(serde_json::Error),

    #[error("failed to encode response: {0}")]
    Encode(serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Top-level error for library consumers.
#[derive(Debug, Error)]
pub enum PlaygroundError {
    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("invalid settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("the playground must be mounted from inside a tokio runtime")]
    NoRuntime,
}
