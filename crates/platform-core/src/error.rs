use thiserror::Error;

/// A convenience `Result` alias using [`PlatformError`].
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Unified error taxonomy for the coordination platform.
///
/// Each variant corresponds to one of the error kinds in the core's error
/// handling design: validation failures are recovered locally, lock and
/// rate-limit errors cause the current item to be skipped, integrity and
/// authorization errors are refused outright, and internal errors are
/// caught at the cycle boundary.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// A record failed schema or semantic validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// A lock could not be acquired within its retry budget.
    #[error("lock error: {0}")]
    Lock(String),

    /// A rate limiter's quota was exhausted past its max wait.
    #[error("rate limit error: {0}")]
    RateLimit(String),

    /// A checksum did not match its companion hash file.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A state update request arrived from an origin other than "controller".
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A queue backend (broker) failed after exhausting its reconnect budget.
    #[error("queue error: {0}")]
    Queue(String),

    /// A schema-level violation (missing field, wrong type, bad enum value).
    #[error("schema error: {0}")]
    Schema(String),

    /// A standard I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
