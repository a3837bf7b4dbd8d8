use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowlineError {
    // Local precondition failures — surfaced synchronously, never retried
    #[error("precondition failed: {0}")]
    Precondition(String),

    // Non-success response before streaming began
    #[error("runner request failed: HTTP {status}: {body}")]
    Transport { status: u16, body: String },

    // Byte source ended without the success sentinel
    #[error("event stream lost: {0}")]
    StreamLost(String),

    #[error("run cancelled")]
    Cancelled,

    // An `error` event explicitly sent by the engine
    #[error("runner error: {0}")]
    Remote(String),

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlowlineError {
    /// Whether this error represents a deliberate cancellation rather than
    /// a failure. Callers should not present cancellations as errors.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, FlowlineError>;
